use core::time::Duration;
use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crate::{generator::DatedSequenceIdGenerator, time::CalendarSource};

/// Default period of the background date check.
pub const DEFAULT_ROLLOVER_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    fn raise(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }

    /// Waits up to `every`; returns `true` once stopped.
    fn wait(&self, every: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            let _ = self.wake.wait_for(&mut stopped, every);
        }
        *stopped
    }
}

/// Handle to a background thread that keeps a [`DatedSequenceIdGenerator`]'s
/// date prefix current.
///
/// The thread holds only a weak reference to the generator and exits on its
/// own once the generator is dropped. [`stop`](Self::stop) (or dropping the
/// handle) wakes it and joins it.
pub struct RolloverTicker {
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl RolloverTicker {
    /// Signals the thread to exit and waits for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Whether the thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    fn shutdown(&mut self) {
        self.signal.raise();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!("rollover ticker panicked");
            }
        }
    }
}

impl Drop for RolloverTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl core::fmt::Debug for RolloverTicker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RolloverTicker")
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl<C> DatedSequenceIdGenerator<C>
where
    C: CalendarSource + Send + Sync + 'static,
{
    /// Starts a thread named `concord-rollover` that calls
    /// [`check_rollover`](Self::check_rollover) every `every`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    ///
    /// # Example
    ///
    /// ```
    /// use concord::{DatedLayout, DatedSequenceIdGenerator, DEFAULT_ROLLOVER_INTERVAL, Fixed, InstanceIdentity};
    /// use std::sync::Arc;
    ///
    /// let identity = InstanceIdentity::new(Fixed(1));
    /// let generator = Arc::new(
    ///     DatedSequenceIdGenerator::with_local_calendar(&identity, DatedLayout::default()).unwrap(),
    /// );
    /// let ticker = generator.spawn_rollover_ticker(DEFAULT_ROLLOVER_INTERVAL).unwrap();
    /// ticker.stop();
    /// ```
    pub fn spawn_rollover_ticker(self: &Arc<Self>, every: Duration) -> io::Result<RolloverTicker> {
        let signal = Arc::new(StopSignal::default());
        let generator = Arc::downgrade(self);
        let handle = thread::Builder::new()
            .name("concord-rollover".into())
            .spawn({
                let signal = Arc::clone(&signal);
                move || tick(&generator, &signal, every)
            })?;
        #[cfg(feature = "tracing")]
        tracing::debug!(?every, "rollover ticker started");
        Ok(RolloverTicker {
            signal,
            handle: Some(handle),
        })
    }
}

fn tick<C>(generator: &Weak<DatedSequenceIdGenerator<C>>, signal: &StopSignal, every: Duration)
where
    C: CalendarSource,
{
    while !signal.wait(every) {
        let Some(generator) = generator.upgrade() else {
            break;
        };
        match generator.check_rollover() {
            Ok(_rolled) => {}
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "rollover check failed");
            }
        }
    }
    #[cfg(feature = "tracing")]
    tracing::debug!("rollover ticker stopped");
}
