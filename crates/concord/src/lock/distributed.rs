use core::fmt;
use core::time::Duration;
use std::thread;
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::instrument;

use super::{
    config::{LockConfig, LockMode, WaitPolicy},
    gate::Gates,
    guard::LockGuard,
    store::{Expiry, LockStore},
};
use crate::{error::Result, generator::IdGenerator};

/// The identity a lock is held under.
///
/// Minted by [`DistributedLock::owner`] from the lock's ID generator and
/// stored as the value of the lock record. Keep the same owner for the
/// acquire and the matching release; reusing it across cycles keeps the
/// logical holder identifiable in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Owner(u64);

impl Owner {
    /// Wraps a token minted elsewhere, e.g. one read back from the store.
    pub const fn from_token(token: u64) -> Self {
        Self(token)
    }

    /// The value written to the store.
    pub const fn token(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A leased mutual-exclusion lock arbitrated by a [`LockStore`].
///
/// A lock record is the key `key_prefix + resource`, holding the owner's
/// token, with a time-to-live of the lease. Whoever creates the record holds
/// the lock until they delete it or it expires. The lease bounds how long a
/// crashed holder can block everyone else; a holder whose critical section
/// may outlast the lease must [`renew`](Self::renew) it.
///
/// Store failures never propagate: they are logged (feature `tracing`) and
/// the operation reports `false`. The lock is best-effort; it does not fence
/// a holder that stalls past its lease.
///
/// Locks are not re-entrant. An owner that already holds a resource waits
/// for it like any other contender.
///
/// # Example
///
/// ```
/// use concord::{
///     DistributedLock, Fixed, InstanceIdentity, LockConfig, MemoryStore, SequenceIdGenerator,
///     SequenceLayout, WaitPolicy,
/// };
/// use std::time::Duration;
///
/// let identity = InstanceIdentity::new(Fixed(1));
/// let ids = SequenceIdGenerator::with_wall_clock(&identity, SequenceLayout::default()).unwrap();
/// let lock = DistributedLock::new(MemoryStore::new(), ids, LockConfig::default());
///
/// let owner = lock.owner().unwrap();
/// assert!(lock.acquire(&owner, "report"));
///
/// let rival = lock.owner().unwrap();
/// let wait = WaitPolicy::Timeout(Duration::ZERO);
/// assert!(!lock.acquire_with(&rival, "report", Duration::from_secs(5), wait));
///
/// assert!(lock.release(&owner, "report"));
/// ```
pub struct DistributedLock<S, G>
where
    S: LockStore,
    G: IdGenerator,
{
    store: S,
    ids: G,
    config: LockConfig,
    gates: Gates,
}

impl<S, G> DistributedLock<S, G>
where
    S: LockStore,
    G: IdGenerator,
{
    /// Creates a lock over `store`, minting owner tokens from `ids`.
    pub fn new(store: S, ids: G, config: LockConfig) -> Self {
        Self {
            store,
            ids,
            config,
            gates: Gates::new(),
        }
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The settings in effect.
    pub const fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Mints a fresh owner token.
    ///
    /// # Errors
    ///
    /// Returns the generator's error if it cannot produce an ID.
    pub fn owner(&self) -> Result<Owner> {
        self.ids.next_id().map(Owner)
    }

    /// Acquires `resource` for `owner` with the configured lease and wait
    /// policy. Returns whether the lock was obtained.
    pub fn acquire(&self, owner: &Owner, resource: &str) -> bool {
        self.acquire_with(owner, resource, self.config.lease, self.config.wait)
    }

    /// Acquires `resource` for `owner` with an explicit lease and wait
    /// policy.
    ///
    /// Each attempt is a conditional create of the lock record. A failed
    /// attempt also checks whether the existing record has lost its
    /// expiry and, if so, gives it `lease`, so an abandoned record cannot
    /// block the resource forever. Attempts are spaced by the configured
    /// poll interval. With [`WaitPolicy::Timeout`] the time spent queueing
    /// on the in-process gate counts against the same deadline.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn acquire_with(
        &self,
        owner: &Owner,
        resource: &str,
        lease: Duration,
        wait: WaitPolicy,
    ) -> bool {
        let key = self.config.key(resource);
        let deadline = match wait {
            WaitPolicy::Forever => None,
            // A deadline past the representable range is as good as none.
            WaitPolicy::Timeout(timeout) => Instant::now().checked_add(timeout),
        };

        let _gate = match self.config.mode {
            LockMode::Optimistic => None,
            LockMode::Pessimistic => match self.gates.enter(&key, deadline) {
                Some(gate) => Some(gate),
                None => return false,
            },
        };

        loop {
            if self.attempt(&key, owner, lease) {
                #[cfg(feature = "tracing")]
                tracing::debug!(key = %key, "lock acquired");
                return true;
            }

            let pause = match deadline {
                None => self.config.poll_interval,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(key = %key, "gave up waiting for lock");
                        return false;
                    }
                    self.config.poll_interval.min(deadline - now)
                }
            };
            thread::sleep(pause);
        }
    }

    /// Releases `resource` if `owner` still holds it.
    ///
    /// Returns `false` without touching the store's record if the lock has
    /// expired or is held by someone else, and on store failure.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn release(&self, owner: &Owner, resource: &str) -> bool {
        let key = self.config.key(resource);
        match self.store.delete_if_equals(&key, owner.token()) {
            Ok(released) => released,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(key = %key, error = %_e, "failed to release lock");
                false
            }
        }
    }

    /// Resets the lease of `resource` to the configured lease.
    pub fn renew(&self, resource: &str) -> bool {
        self.renew_with(resource, self.config.lease)
    }

    /// Resets the lease of `resource` to `lease`. Returns `false` if there is
    /// no record to renew or the store failed.
    ///
    /// The record is renewed whoever holds it; call this only while holding
    /// the lock.
    pub fn renew_with(&self, resource: &str, lease: Duration) -> bool {
        let key = self.config.key(resource);
        match self.store.expire(&key, lease) {
            Ok(renewed) => renewed,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(key = %key, error = %_e, "failed to renew lock");
                false
            }
        }
    }

    /// Acquires `resource` under a fresh owner with the configured lease and
    /// wait policy, returning a guard that releases it when dropped.
    ///
    /// Returns `None` if the lock was not obtained or no owner could be
    /// minted.
    pub fn lock(&self, resource: &str) -> Option<LockGuard<'_, S, G>> {
        self.lock_with(resource, self.config.lease, self.config.wait)
    }

    /// Like [`lock`](Self::lock) with an explicit lease and wait policy.
    pub fn lock_with(
        &self,
        resource: &str,
        lease: Duration,
        wait: WaitPolicy,
    ) -> Option<LockGuard<'_, S, G>> {
        let owner = match self.owner() {
            Ok(owner) => owner,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %_e, "cannot mint lock owner");
                return None;
            }
        };
        self.acquire_with(&owner, resource, lease, wait)
            .then(|| LockGuard::new(self, owner, resource.to_owned(), lease))
    }

    fn attempt(&self, key: &str, owner: &Owner, lease: Duration) -> bool {
        match self.store.set_if_absent(key, owner.token(), lease) {
            Ok(true) => return true,
            Ok(false) => {}
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(key, error = %_e, "lock attempt failed");
                return false;
            }
        }

        match self.store.expiry(key) {
            Ok(Expiry::Persistent) => self.repair_expiry(key, lease),
            Ok(Expiry::Missing | Expiry::Remaining(_)) => {}
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(key, error = %_e, "cannot read lock expiry");
            }
        }
        false
    }

    #[cold]
    fn repair_expiry(&self, key: &str, lease: Duration) {
        match self.store.expire(key, lease) {
            Ok(_repaired) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(key, ?lease, repaired = _repaired, "lock record had no expiry");
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(key, error = %_e, "cannot repair lock expiry");
            }
        }
    }
}

impl<S, G> fmt::Debug for DistributedLock<S, G>
where
    S: LockStore,
    G: IdGenerator,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedLock")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
