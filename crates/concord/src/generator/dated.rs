use chrono::{NaiveDate, Timelike};
use core::cmp::Ordering;
use core::fmt::Write as _;
use core::time::Duration;
use parking_lot::Mutex;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    error::{Error, Result},
    generator::IdGenerator,
    identity::{IdentitySource, InstanceIdentity},
    status::IdGenStatus,
    time::{CalendarSource, LocalCalendar},
};

/// Decimal slots reserved for the second of the day (`0..=86_399`).
pub const SECOND_SLOTS: u64 = 100_000;

/// Upper bound on `instance_modulus * sequence_modulus`. With the six date
/// digits and five second digits this keeps every ID, through year 2099,
/// below `i64::MAX`.
pub const MAX_DATED_PAYLOAD: u64 = 10_000_000;

/// How many fresh calendar readings a date rollover may take before giving
/// up with [`Error::DatePrefixUnavailable`].
pub const ROLLOVER_ATTEMPTS: u32 = 16;

/// Decimal layout of a [`DatedSequenceIdGenerator`] ID.
///
/// ```text
///  YYMMDD | SSSSS (second of day) | instance | sequence
///  260517 | 43200                 | 042      | 0007
/// ```
///
/// `instance_modulus` and `sequence_modulus` are powers of ten giving the
/// number of decimal slots for each field. The default (1000 instances, 10000
/// IDs per second) produces 18-digit IDs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DatedLayout {
    /// Number of distinct instance values (a power of ten, may be 1).
    pub instance_modulus: u64,
    /// Number of IDs per second per instance (a power of ten, at least 10).
    pub sequence_modulus: u64,
}

impl Default for DatedLayout {
    fn default() -> Self {
        Self::new(1_000, 10_000)
    }
}

/// The fields of a [`DatedSequenceIdGenerator`] ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DatedParts {
    /// `YYMMDD` as a number.
    pub date: u64,
    /// Seconds since local midnight.
    pub second: u64,
    /// Instance identity modulo the instance modulus.
    pub instance: u64,
    /// Counter within the second.
    pub sequence: u64,
}

const fn is_power_of_ten(mut n: u64) -> bool {
    if n == 0 {
        return false;
    }
    while n % 10 == 0 {
        n /= 10;
    }
    n == 1
}

impl DatedLayout {
    /// A layout with the given moduli.
    pub const fn new(instance_modulus: u64, sequence_modulus: u64) -> Self {
        Self {
            instance_modulus,
            sequence_modulus,
        }
    }

    /// Checks that both moduli are powers of ten and fit the ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLayout`] otherwise.
    pub fn validate(&self) -> Result<()> {
        if !is_power_of_ten(self.instance_modulus) {
            return Err(Error::invalid_layout(format!(
                "instance_modulus ({}) must be a power of ten",
                self.instance_modulus
            )));
        }
        if self.sequence_modulus < 10 || !is_power_of_ten(self.sequence_modulus) {
            return Err(Error::invalid_layout(format!(
                "sequence_modulus ({}) must be a power of ten of at least 10",
                self.sequence_modulus
            )));
        }
        match self.instance_modulus.checked_mul(self.sequence_modulus) {
            Some(payload) if payload <= MAX_DATED_PAYLOAD => Ok(()),
            _ => Err(Error::invalid_layout(format!(
                "instance_modulus * sequence_modulus exceeds {MAX_DATED_PAYLOAD}"
            ))),
        }
    }

    /// Largest sequence value within one second.
    pub const fn max_sequence(&self) -> u64 {
        self.sequence_modulus - 1
    }

    /// Packs the four fields.
    pub const fn compose(&self, date: u64, second: u64, instance: u64, sequence: u64) -> u64 {
        debug_assert!(second < SECOND_SLOTS, "second overflow");
        debug_assert!(instance < self.instance_modulus, "instance overflow");
        debug_assert!(sequence < self.sequence_modulus, "sequence overflow");
        ((date * SECOND_SLOTS + second) * self.instance_modulus + instance) * self.sequence_modulus
            + sequence
    }

    /// Splits an ID produced with this layout back into its fields.
    pub const fn decompose(&self, id: u64) -> DatedParts {
        let sequence = id % self.sequence_modulus;
        let rest = id / self.sequence_modulus;
        let instance = rest % self.instance_modulus;
        let rest = rest / self.instance_modulus;
        DatedParts {
            date: rest / SECOND_SLOTS,
            second: rest % SECOND_SLOTS,
            instance,
            sequence,
        }
    }
}

/// Formats `date` as the number `YYMMDD`.
///
/// Returns `None` if the calendar cannot render the date.
pub fn date_prefix(date: NaiveDate) -> Option<u64> {
    let mut digits = String::with_capacity(6);
    write!(digits, "{}", date.format("%y%m%d")).ok()?;
    digits.parse().ok()
}

#[derive(Clone, Copy, Debug)]
struct DatedState {
    date: NaiveDate,
    prefix: u64,
    /// Last (second, sequence) handed out on `date`.
    last: Option<(u32, u64)>,
}

/// A decimal-packed ID generator whose IDs read as a local date and time.
///
/// IDs have the shape `YYMMDD SSSSS III QQQQ` (see [`DatedLayout`]) and are
/// strictly increasing per generator, across threads, within the same
/// century. The time unit is one second: once `sequence_modulus` IDs have
/// been handed out within a second, the generator is pending until the next
/// one.
///
/// ## Day rollover
///
/// Every call compares the calendar's current (date, second) with the last
/// one handed out. A newer date recomputes the `YYMMDD` prefix and restarts
/// the sequence; an older reading means the clock stepped back, and the
/// generator stays pending until it catches up. Computing the prefix is
/// retried against fresh calendar readings at most [`ROLLOVER_ATTEMPTS`]
/// times.
///
/// A generator that may sit idle for hours should also run a
/// [`RolloverTicker`] (see [`Self::spawn_rollover_ticker`]) so the prefix is
/// refreshed off the request path.
///
/// [`RolloverTicker`]: crate::RolloverTicker
pub struct DatedSequenceIdGenerator<C = LocalCalendar>
where
    C: CalendarSource,
{
    layout: DatedLayout,
    instance: u64,
    state: Mutex<DatedState>,
    calendar: C,
}

impl DatedSequenceIdGenerator<LocalCalendar> {
    /// Creates a generator on the host's local calendar.
    ///
    /// # Errors
    ///
    /// See [`DatedSequenceIdGenerator::new`].
    pub fn with_local_calendar<S>(identity: &InstanceIdentity<S>, layout: DatedLayout) -> Result<Self>
    where
        S: IdentitySource,
    {
        Self::new(identity, layout, LocalCalendar)
    }
}

impl<C> DatedSequenceIdGenerator<C>
where
    C: CalendarSource,
{
    /// Creates a new generator for the resolved instance identity.
    ///
    /// The identity is reduced modulo `layout.instance_modulus`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidLayout`] for a bad layout.
    /// - [`Error::IdentityUnavailable`] if the identity cannot be resolved.
    /// - [`Error::DatePrefixUnavailable`] if today's prefix cannot be
    ///   computed.
    pub fn new<S>(identity: &InstanceIdentity<S>, layout: DatedLayout, calendar: C) -> Result<Self>
    where
        S: IdentitySource,
    {
        layout.validate()?;
        let raw = identity.get()?;
        Self::from_instance(u64::from(raw), layout, calendar)
    }

    /// Creates a generator from an already known instance value.
    ///
    /// # Errors
    ///
    /// See [`DatedSequenceIdGenerator::new`].
    pub fn from_instance(instance: u64, layout: DatedLayout, calendar: C) -> Result<Self> {
        layout.validate()?;
        let (date, prefix) = Self::resolve_prefix(&calendar, None)?;
        Ok(Self {
            layout,
            instance: instance % layout.instance_modulus,
            state: Mutex::new(DatedState {
                date,
                prefix,
                last: None,
            }),
            calendar,
        })
    }

    /// The layout IDs are packed with.
    pub const fn layout(&self) -> &DatedLayout {
        &self.layout
    }

    /// The reduced instance value embedded in every ID.
    pub const fn instance(&self) -> u64 {
        self.instance
    }

    /// The `YYMMDD` prefix currently applied to new IDs.
    pub fn current_prefix(&self) -> u64 {
        self.state.lock().prefix
    }

    /// Attempts to generate the next ID.
    ///
    /// Returns [`IdGenStatus::Pending`] with the number of seconds to wait if
    /// the current second is exhausted or the calendar reads earlier than
    /// the last ID handed out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatePrefixUnavailable`] if a new day started and its
    /// prefix could not be computed.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn try_poll_id(&self) -> Result<IdGenStatus> {
        let now = self.calendar.now();
        let (date, second) = (now.date(), now.num_seconds_from_midnight());

        let mut state = self.state.lock();
        match date.cmp(&state.date) {
            Ordering::Equal => {}
            Ordering::Greater => self.roll_over(&mut state, date)?,
            Ordering::Less => return Ok(Self::cold_clock_behind(&state, date, second)),
        }

        let Some((last_second, last_sequence)) = state.last else {
            state.last = Some((second, 0));
            return Ok(self.ready(&state, second, 0));
        };

        match second.cmp(&last_second) {
            Ordering::Equal => {
                if last_sequence < self.layout.max_sequence() {
                    let sequence = last_sequence + 1;
                    state.last = Some((second, sequence));
                    Ok(self.ready(&state, second, sequence))
                } else {
                    Ok(IdGenStatus::Pending { yield_for: 1 })
                }
            }
            Ordering::Greater => {
                state.last = Some((second, 0));
                Ok(self.ready(&state, second, 0))
            }
            Ordering::Less => Ok(Self::cold_clock_behind(&state, date, second)),
        }
    }

    /// Adopts a new date prefix if the calendar has moved to a later day.
    ///
    /// This is the check the [`RolloverTicker`] runs periodically; it takes
    /// the same lock as [`Self::try_poll_id`]. Returns whether the prefix
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatePrefixUnavailable`] if the new prefix could not
    /// be computed.
    ///
    /// [`RolloverTicker`]: crate::RolloverTicker
    pub fn check_rollover(&self) -> Result<bool> {
        let date = self.calendar.now().date();
        let mut state = self.state.lock();
        if date > state.date {
            self.roll_over(&mut state, date)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn roll_over(&self, state: &mut DatedState, date: NaiveDate) -> Result<()> {
        let (date, prefix) = Self::resolve_prefix(&self.calendar, Some((date, state.date)))?;
        #[cfg(feature = "tracing")]
        tracing::info!(from = state.prefix, to = prefix, "date prefix rolled over");
        state.date = date;
        state.prefix = prefix;
        state.last = None;
        Ok(())
    }

    /// Computes a prefix, starting from `hint.0` if given and otherwise from
    /// fresh calendar readings. With a hint, only dates after `hint.1` are
    /// accepted.
    fn resolve_prefix(
        calendar: &C,
        hint: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<(NaiveDate, u64)> {
        let mut candidate = hint.map(|(date, _)| date);
        for _ in 0..ROLLOVER_ATTEMPTS {
            let date = candidate.take().unwrap_or_else(|| calendar.now().date());
            let newer = hint.is_none_or(|(_, current)| date > current);
            if newer {
                if let Some(prefix) = date_prefix(date) {
                    return Ok((date, prefix));
                }
            }
            core::hint::spin_loop();
        }
        Err(Error::DatePrefixUnavailable {
            attempts: ROLLOVER_ATTEMPTS,
        })
    }

    const fn ready(&self, state: &DatedState, second: u32, sequence: u64) -> IdGenStatus {
        IdGenStatus::Ready {
            id: self
                .layout
                .compose(state.prefix, second as u64, self.instance, sequence),
        }
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(state: &DatedState, date: NaiveDate, second: u32) -> IdGenStatus {
        let last_second = state.last.map_or(0, |(s, _)| i64::from(s));
        let days = state.date.signed_duration_since(date).num_days();
        let behind = days * 86_400 + last_second - i64::from(second);
        #[cfg(feature = "tracing")]
        tracing::debug!(behind, "calendar behind last issued second");
        IdGenStatus::Pending {
            yield_for: u64::try_from(behind).unwrap_or(0).max(1),
        }
    }
}

impl<C> IdGenerator for DatedSequenceIdGenerator<C>
where
    C: CalendarSource,
{
    const TIME_UNIT: Duration = Duration::from_secs(1);

    fn try_poll_id(&self) -> Result<IdGenStatus> {
        self.try_poll_id()
    }
}
