use core::cmp::Ordering;
use core::time::Duration;
use parking_lot::Mutex;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    error::{Error, Result},
    generator::IdGenerator,
    identity::{IdentitySource, InstanceIdentity},
    status::IdGenStatus,
    time::{DEFAULT_EPOCH, TimeSource, WallClock},
};

/// Usable width of a generated ID. The sign bit stays clear so IDs survive
/// a trip through signed 64-bit columns.
pub const ID_BITS: u8 = 63;

/// Upper bound on `instance_bits + sequence_bits`. Leaves 39 bits of
/// milliseconds, roughly 17 years past the epoch.
pub const MAX_PAYLOAD_BITS: u8 = 24;

/// Bit layout of a [`SequenceIdGenerator`] ID.
///
/// ```text
///  63 bits, most significant first
/// +--------------------------+------------------+-----------------+
/// | ms since epoch           | instance         | sequence        |
/// | 63 - inst - seq bits     | instance_bits    | sequence_bits   |
/// +--------------------------+------------------+-----------------+
/// ```
///
/// The default (4 instance bits, 14 sequence bits) supports 16 instances and
/// 16384 IDs per millisecond per instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SequenceLayout {
    /// Width reserved for the instance identity.
    pub instance_bits: u8,
    /// Width reserved for the per-millisecond counter.
    pub sequence_bits: u8,
    /// Origin of the timestamp field, as a duration since the Unix epoch.
    pub epoch: Duration,
}

impl Default for SequenceLayout {
    fn default() -> Self {
        Self::new(4, 14)
    }
}

/// The fields of a [`SequenceIdGenerator`] ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SequenceParts {
    /// Milliseconds since the layout's epoch.
    pub timestamp: u64,
    /// Masked instance identity.
    pub instance: u64,
    /// Counter within the millisecond.
    pub sequence: u64,
}

impl SequenceLayout {
    /// A layout with the given widths and the [`DEFAULT_EPOCH`].
    pub const fn new(instance_bits: u8, sequence_bits: u8) -> Self {
        Self {
            instance_bits,
            sequence_bits,
            epoch: DEFAULT_EPOCH,
        }
    }

    /// Returns this layout anchored at `epoch` instead.
    #[must_use]
    pub const fn with_epoch(mut self, epoch: Duration) -> Self {
        self.epoch = epoch;
        self
    }

    /// Checks that the fields fit into [`ID_BITS`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLayout`] if the sequence field is empty or the
    /// instance and sequence fields together exceed [`MAX_PAYLOAD_BITS`].
    pub fn validate(&self) -> Result<()> {
        if self.sequence_bits == 0 {
            return Err(Error::invalid_layout("sequence_bits must be at least 1"));
        }
        let payload = u16::from(self.instance_bits) + u16::from(self.sequence_bits);
        if payload > u16::from(MAX_PAYLOAD_BITS) {
            return Err(Error::invalid_layout(format!(
                "instance_bits ({}) + sequence_bits ({}) exceeds {MAX_PAYLOAD_BITS}",
                self.instance_bits, self.sequence_bits
            )));
        }
        Ok(())
    }

    /// Width of the timestamp field.
    pub const fn timestamp_bits(&self) -> u8 {
        ID_BITS - self.instance_bits - self.sequence_bits
    }

    /// Largest sequence value within one millisecond.
    pub const fn max_sequence(&self) -> u64 {
        (1 << self.sequence_bits) - 1
    }

    /// Largest encodable instance identity.
    pub const fn max_instance(&self) -> u64 {
        (1 << self.instance_bits) - 1
    }

    /// Largest encodable timestamp.
    pub const fn max_timestamp(&self) -> u64 {
        (1 << self.timestamp_bits()) - 1
    }

    /// Packs the three fields. Each value must already fit its field.
    pub const fn compose(&self, timestamp: u64, instance: u64, sequence: u64) -> u64 {
        debug_assert!(timestamp <= self.max_timestamp(), "timestamp overflow");
        debug_assert!(instance <= self.max_instance(), "instance overflow");
        debug_assert!(sequence <= self.max_sequence(), "sequence overflow");
        (timestamp << (self.instance_bits + self.sequence_bits))
            | (instance << self.sequence_bits)
            | sequence
    }

    /// Splits an ID produced with this layout back into its fields.
    pub const fn decompose(&self, id: u64) -> SequenceParts {
        SequenceParts {
            timestamp: id >> (self.instance_bits + self.sequence_bits),
            instance: (id >> self.sequence_bits) & self.max_instance(),
            sequence: id & self.max_sequence(),
        }
    }

    /// Milliseconds since the Unix epoch at which `id` was generated.
    pub fn unix_millis(&self, id: u64) -> u64 {
        let epoch = u64::try_from(self.epoch.as_millis()).unwrap_or(u64::MAX);
        epoch.saturating_add(self.decompose(id).timestamp)
    }
}

#[derive(Clone, Copy, Debug)]
struct Tick {
    timestamp: u64,
    sequence: u64,
}

/// A lock-based, bit-packed ID generator suitable for multi-threaded
/// environments.
///
/// Produces 63-bit IDs from (milliseconds since epoch, instance, sequence).
/// IDs from one generator are strictly increasing in the order they are
/// handed out, across all threads. The `(timestamp, sequence)` state sits
/// behind a [`parking_lot::Mutex`] that is held only for the
/// read-modify-write; waiting for the next millisecond happens outside it.
///
/// Generators built from different instance identities never collide. Two
/// generators with the *same* identity may, so give each independent
/// generator in a process its own identity or share one generator.
///
/// ## Clock behaviour
///
/// If the clock steps backwards (e.g. an NTP correction), the generator
/// reports [`IdGenStatus::Pending`] until the clock is back at the last
/// millisecond it handed out. Throughput stalls for the duration of the
/// step instead of risking duplicates.
///
/// # Example
///
/// ```
/// use concord::{Fixed, IdGenerator, InstanceIdentity, SequenceIdGenerator, SequenceLayout};
///
/// let identity = InstanceIdentity::new(Fixed(2));
/// let generator = SequenceIdGenerator::with_wall_clock(&identity, SequenceLayout::default()).unwrap();
///
/// let id = generator.next_id().unwrap();
/// assert_eq!(generator.layout().decompose(id).instance, 2);
/// ```
pub struct SequenceIdGenerator<T = WallClock>
where
    T: TimeSource<u64>,
{
    layout: SequenceLayout,
    instance: u64,
    #[cfg(feature = "cache-padded")]
    state: crossbeam_utils::CachePadded<Mutex<Option<Tick>>>,
    #[cfg(not(feature = "cache-padded"))]
    state: Mutex<Option<Tick>>,
    time: T,
}

impl SequenceIdGenerator<WallClock> {
    /// Creates a generator reading the system clock relative to the layout's
    /// epoch.
    ///
    /// # Errors
    ///
    /// See [`SequenceIdGenerator::new`].
    pub fn with_wall_clock<S>(identity: &InstanceIdentity<S>, layout: SequenceLayout) -> Result<Self>
    where
        S: IdentitySource,
    {
        Self::new(identity, layout, WallClock::new(layout.epoch))
    }
}

impl<T> SequenceIdGenerator<T>
where
    T: TimeSource<u64>,
{
    /// Creates a new generator for the resolved instance identity.
    ///
    /// The identity is masked to `layout.instance_bits`. The `time` source
    /// must count milliseconds from `layout.epoch`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidLayout`] if the layout does not fit 63 bits.
    /// - [`Error::IdentityUnavailable`] if the identity cannot be resolved.
    ///   This is fatal; the generator must not be used without one.
    pub fn new<S>(identity: &InstanceIdentity<S>, layout: SequenceLayout, time: T) -> Result<Self>
    where
        S: IdentitySource,
    {
        layout.validate()?;
        let raw = identity.get()?;
        Self::from_instance(u64::from(raw), layout, time)
    }

    /// Creates a generator from an already known instance value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLayout`] if the layout does not fit 63 bits.
    pub fn from_instance(instance: u64, layout: SequenceLayout, time: T) -> Result<Self> {
        layout.validate()?;
        let instance = instance & layout.max_instance();
        Ok(Self {
            layout,
            instance,
            #[cfg(feature = "cache-padded")]
            state: crossbeam_utils::CachePadded::new(Mutex::new(None)),
            #[cfg(not(feature = "cache-padded"))]
            state: Mutex::new(None),
            time,
        })
    }

    /// The layout IDs are packed with.
    pub const fn layout(&self) -> &SequenceLayout {
        &self.layout
    }

    /// The masked instance value embedded in every ID.
    pub const fn instance(&self) -> u64 {
        self.instance
    }

    /// Attempts to generate the next ID.
    ///
    /// Returns a new, time-ordered, unique ID if generation succeeds. If the
    /// sequence for the current millisecond is used up, or the clock is
    /// behind the last millisecond handed out, returns
    /// [`IdGenStatus::Pending`] with the number of milliseconds to wait.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimestampOverflow`] once the clock has outgrown the
    /// timestamp field.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn try_poll_id(&self) -> Result<IdGenStatus> {
        let now = self.time.current_millis();
        if now > self.layout.max_timestamp() {
            return Err(Error::TimestampOverflow {
                timestamp: now,
                bits: self.layout.timestamp_bits(),
            });
        }

        let mut state = self.state.lock();
        let Some(last) = *state else {
            *state = Some(Tick {
                timestamp: now,
                sequence: 0,
            });
            return Ok(self.ready(now, 0));
        };

        match now.cmp(&last.timestamp) {
            Ordering::Equal => {
                if last.sequence < self.layout.max_sequence() {
                    let sequence = last.sequence + 1;
                    *state = Some(Tick {
                        timestamp: now,
                        sequence,
                    });
                    Ok(self.ready(now, sequence))
                } else {
                    Ok(IdGenStatus::Pending { yield_for: 1 })
                }
            }
            Ordering::Greater => {
                *state = Some(Tick {
                    timestamp: now,
                    sequence: 0,
                });
                Ok(self.ready(now, 0))
            }
            Ordering::Less => Ok(Self::cold_clock_behind(now, last.timestamp)),
        }
    }

    const fn ready(&self, timestamp: u64, sequence: u64) -> IdGenStatus {
        IdGenStatus::Ready {
            id: self.layout.compose(timestamp, self.instance, sequence),
        }
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(now: u64, last: u64) -> IdGenStatus {
        #[cfg(feature = "tracing")]
        tracing::debug!(now, last, "clock behind last issued millisecond");
        IdGenStatus::Pending {
            yield_for: last - now,
        }
    }
}

impl<T> IdGenerator for SequenceIdGenerator<T>
where
    T: TimeSource<u64>,
{
    const TIME_UNIT: Duration = Duration::from_millis(1);

    fn try_poll_id(&self) -> Result<IdGenStatus> {
        self.try_poll_id()
    }
}
