use core::fmt;
use core::time::Duration;

use super::{distributed::DistributedLock, distributed::Owner, store::LockStore};
use crate::generator::IdGenerator;

/// A held lock that is released when dropped.
///
/// Returned by [`DistributedLock::lock`]. The release runs on every exit from
/// the scope, including early returns and panics.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a, S, G>
where
    S: LockStore,
    G: IdGenerator,
{
    lock: &'a DistributedLock<S, G>,
    owner: Owner,
    resource: String,
    lease: Duration,
    released: bool,
}

impl<'a, S, G> LockGuard<'a, S, G>
where
    S: LockStore,
    G: IdGenerator,
{
    pub(crate) fn new(
        lock: &'a DistributedLock<S, G>,
        owner: Owner,
        resource: String,
        lease: Duration,
    ) -> Self {
        Self {
            lock,
            owner,
            resource,
            lease,
            released: false,
        }
    }

    pub const fn owner(&self) -> Owner {
        self.owner
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Resets the lease to the one the lock was taken with.
    pub fn renew(&self) -> bool {
        self.lock.renew_with(&self.resource, self.lease)
    }

    /// Releases now, reporting whether the record was still ours.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.lock.release(&self.owner, &self.resource)
    }
}

impl<S, G> Drop for LockGuard<'_, S, G>
where
    S: LockStore,
    G: IdGenerator,
{
    fn drop(&mut self) {
        if !self.released {
            self.lock.release(&self.owner, &self.resource);
        }
    }
}

impl<S, G> fmt::Debug for LockGuard<'_, S, G>
where
    S: LockStore,
    G: IdGenerator,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("owner", &self.owner)
            .field("resource", &self.resource)
            .field("lease", &self.lease)
            .finish()
    }
}
