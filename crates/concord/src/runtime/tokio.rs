use core::time::Duration;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{generator::DatedSequenceIdGenerator, time::CalendarSource};

/// Runs [`DatedSequenceIdGenerator::check_rollover`] every `every` on the
/// current Tokio runtime until `cancel` fires or the generator is dropped.
///
/// The task holds only a weak reference to the generator. Await the returned
/// handle after cancelling to wait for the task to finish.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
///
/// # Example
///
/// ```
/// use concord::{DatedLayout, DatedSequenceIdGenerator, Fixed, InstanceIdentity, spawn_rollover_task};
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let identity = InstanceIdentity::new(Fixed(9));
/// let generator = Arc::new(
///     DatedSequenceIdGenerator::with_local_calendar(&identity, DatedLayout::default()).unwrap(),
/// );
/// let shutdown = CancellationToken::new();
/// let task = spawn_rollover_task(&generator, Duration::from_secs(3600), shutdown.clone());
///
/// shutdown.cancel();
/// task.await.unwrap();
/// # }
/// ```
pub fn spawn_rollover_task<C>(
    generator: &Arc<DatedSequenceIdGenerator<C>>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    C: CalendarSource + Send + Sync + 'static,
{
    let generator = Arc::downgrade(generator);
    tokio::spawn(async move {
        #[cfg(feature = "tracing")]
        tracing::debug!(?every, "rollover task started");
        loop {
            if tokio::time::timeout(every, cancel.cancelled()).await.is_ok() {
                break;
            }
            let Some(generator) = generator.upgrade() else {
                break;
            };
            if let Err(_e) = generator.check_rollover() {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "rollover check failed");
            }
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("rollover task stopped");
    })
}
