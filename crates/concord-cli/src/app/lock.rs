use anyhow::Context;
use concord::{
    DistributedLock, Fixed, IdGenerator, InstanceIdentity, LockGuard, LockStore, RedisStore,
    SequenceIdGenerator, SequenceLayout,
};
use std::process::{Command, ExitCode};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use super::config::LockJob;

/// `EX_TEMPFAIL` from `sysexits.h`: the lock was not obtained, try again
/// later.
pub const EXIT_NOT_ACQUIRED: u8 = 75;

/// Runs the job's command while holding the lock on its resource.
///
/// Exits with the command's status, or [`EXIT_NOT_ACQUIRED`] if the lock
/// could not be taken within the wait policy.
pub fn run_locked(identity: &InstanceIdentity<Fixed>, job: &LockJob) -> anyhow::Result<ExitCode> {
    let store = RedisStore::open(&job.redis_url).context("invalid REDIS_URL")?;
    let ids = SequenceIdGenerator::with_wall_clock(identity, SequenceLayout::default())
        .context("cannot build the owner token generator")?;
    let lock = DistributedLock::new(store, ids, job.lock.clone());

    tracing::info!(resource = %job.resource, key = %job.lock.key(&job.resource), "waiting for lock");
    let Some(guard) = lock.lock(&job.resource) else {
        tracing::warn!(resource = %job.resource, "lock not acquired");
        return Ok(ExitCode::from(EXIT_NOT_ACQUIRED));
    };
    tracing::info!(resource = %job.resource, owner = %guard.owner(), "lock acquired");

    let status = thread::scope(|s| {
        let (stop, stopped) = mpsc::channel::<()>();
        let guard = &guard;
        s.spawn(move || keep_renewed(guard, job.renew_every(), &stopped));

        let status = Command::new(&job.program).args(&job.args).status();
        drop(stop);
        status
    })
    .with_context(|| format!("failed to run `{}`", job.program))?;

    if guard.release() {
        tracing::info!(resource = %job.resource, "lock released");
    } else {
        tracing::warn!(resource = %job.resource, "lock expired before the command finished");
    }

    tracing::info!(%status, "command finished");
    Ok(status
        .code()
        .and_then(|code| u8::try_from(code).ok())
        .map_or(ExitCode::FAILURE, ExitCode::from))
}

/// Renews the lease every `every` until the sender side of `stopped` is
/// dropped.
fn keep_renewed<S, G>(guard: &LockGuard<'_, S, G>, every: Duration, stopped: &mpsc::Receiver<()>)
where
    S: LockStore,
    G: IdGenerator,
{
    loop {
        match stopped.recv_timeout(every) {
            Err(RecvTimeoutError::Timeout) => {
                if guard.renew() {
                    tracing::debug!(resource = guard.resource(), "lease renewed");
                } else {
                    tracing::warn!(resource = guard.resource(), "lease renewal failed");
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
