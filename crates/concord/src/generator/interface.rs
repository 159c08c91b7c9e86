use crate::{error::Result, status::IdGenStatus};
use core::time::Duration;
use std::sync::Arc;

/// A minimal interface for generating time-ordered IDs.
pub trait IdGenerator {
    /// Wall-clock length of one time unit. [`IdGenStatus::Pending`] reports
    /// its wait in multiples of this.
    const TIME_UNIT: Duration;

    /// Attempts to generate the next ID without waiting.
    ///
    /// The returned [`IdGenStatus`] contains either:
    /// - the newly generated ID, or
    /// - the number of time units to wait if the current unit is exhausted or
    ///   the clock is behind the last unit handed out.
    ///
    /// # Errors
    ///
    /// Returns an error if the clock reading cannot be encoded.
    fn try_poll_id(&self) -> Result<IdGenStatus>;

    /// Generates the next ID, busy-waiting with [`Backoff::Yield`] while the
    /// generator is pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the clock reading cannot be encoded.
    fn next_id(&self) -> Result<u64> {
        self.next_id_with(Backoff::Yield)
    }

    /// Generates the next ID, waiting with the given [`Backoff`] strategy
    /// while the generator is pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the clock reading cannot be encoded.
    fn next_id_with(&self, backoff: Backoff) -> Result<u64> {
        loop {
            match self.try_poll_id()? {
                IdGenStatus::Ready { id } => break Ok(id),
                IdGenStatus::Pending { yield_for } => backoff.wait(Self::TIME_UNIT, yield_for),
            }
        }
    }
}

impl<G> IdGenerator for Arc<G>
where
    G: IdGenerator + ?Sized,
{
    const TIME_UNIT: Duration = G::TIME_UNIT;

    fn try_poll_id(&self) -> Result<IdGenStatus> {
        (**self).try_poll_id()
    }
}

/// Backoff strategies for waiting out a pending generator.
///
/// Sequence exhaustion resolves within one time unit, so the default is a
/// cheap busy-wait that re-reads the clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backoff {
    /// Busy-waits in a tight loop.
    ///
    /// Offers maximum throughput at the cost of high CPU usage.
    Spin,

    /// Yields to the OS scheduler to allow other threads to run.
    ///
    /// More CPU-friendly than spinning, but may still busy-wait if no other
    /// threads are ready.
    #[default]
    Yield,

    /// Sleeps for the requested number of time units.
    ///
    /// Lowest CPU usage, but may oversleep depending on platform-specific
    /// scheduler resolution.
    Sleep,
}

impl Backoff {
    /// Waits once according to the strategy.
    pub fn wait(self, unit: Duration, yield_for: u64) {
        match self {
            Self::Spin => core::hint::spin_loop(),
            Self::Yield => std::thread::yield_now(),
            Self::Sleep => {
                let units = u32::try_from(yield_for).unwrap_or(u32::MAX);
                std::thread::sleep(unit.saturating_mul(units));
            }
        }
    }
}
