use chrono::{Local, NaiveDateTime};
use core::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default epoch: Monday, January 1, 2018 00:00:00 UTC+08:00
pub const DEFAULT_EPOCH: Duration = Duration::from_millis(1_514_736_000_000);

/// A trait for time sources that return a millisecond timestamp.
///
/// This abstraction allows you to plug in the system clock or a mocked time
/// source in tests. The unit is **milliseconds** relative to an origin chosen
/// by the implementation.
///
/// # Example
///
/// ```
/// use concord::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource<u64> for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// let time = FixedTime;
/// assert_eq!(time.current_millis(), 1234);
/// ```
pub trait TimeSource<T> {
    /// Returns the current time in milliseconds since the configured epoch.
    fn current_millis(&self) -> T;
}

/// A wall-clock time source measuring milliseconds since a custom epoch.
///
/// Reads `SystemTime::now()` on every call, so it follows NTP adjustments in
/// both directions. Generators treat a clock that moved backwards as
/// "pending" until it catches up with the last timestamp they handed out,
/// which means throughput stalls for the length of the backward step.
///
/// Times before the epoch read as `0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WallClock {
    epoch: Duration,
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new(DEFAULT_EPOCH)
    }
}

impl WallClock {
    /// Constructs a clock whose zero point is `epoch`, given as a duration
    /// since 1970-01-01 UTC.
    pub const fn new(epoch: Duration) -> Self {
        Self { epoch }
    }

    /// The configured origin.
    pub const fn epoch(&self) -> Duration {
        self.epoch
    }
}

impl TimeSource<u64> for WallClock {
    fn current_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|now| now.checked_sub(self.epoch))
            .map_or(0, |elapsed| {
                u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
            })
    }
}

/// A source of local calendar time, used by the dated generator.
///
/// The dated generator needs the calendar date and the second of the day
/// from a single reading, so this returns a full [`NaiveDateTime`] rather
/// than a millisecond count.
pub trait CalendarSource {
    /// Returns the current local date and time.
    fn now(&self) -> NaiveDateTime;
}

/// The host's local calendar, as reported by [`chrono::Local`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LocalCalendar;

impl CalendarSource for LocalCalendar {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

impl<T: CalendarSource + ?Sized> CalendarSource for std::sync::Arc<T> {
    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }
}

impl<U, T: TimeSource<U> + ?Sized> TimeSource<U> for std::sync::Arc<T> {
    fn current_millis(&self) -> U {
        (**self).current_millis()
    }
}
