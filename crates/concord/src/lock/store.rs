use core::time::Duration;
use std::sync::Arc;

/// Failures talking to a remote store.
///
/// [`DistributedLock`](crate::DistributedLock) never surfaces these: it logs
/// them and reports the operation as not performed.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// No connection to the store could be established.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    /// The store rejected or failed a command.
    #[cfg(feature = "redis")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
    #[error("store command failed: {0}")]
    Command(#[from] redis::RedisError),

    /// A lock key held something other than an owner token.
    #[error("corrupt value at `{key}`: {value:?}")]
    Corrupt { key: String, value: String },
}

impl StoreError {
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Remaining lifetime of a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expiry {
    /// The key does not exist.
    Missing,
    /// The key exists and never expires.
    Persistent,
    /// The key expires after this long.
    Remaining(Duration),
}

/// The remote operations a [`DistributedLock`](crate::DistributedLock)
/// needs.
///
/// Every operation must be atomic on the store side; in particular
/// [`delete_if_equals`](Self::delete_if_equals) must not delete a key that
/// was replaced between the comparison and the deletion.
pub trait LockStore {
    /// Stores `token` under `key` with a time-to-live of `lease`, only if the
    /// key does not exist. Returns whether the value was stored.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be reached.
    fn set_if_absent(&self, key: &str, token: u64, lease: Duration) -> Result<bool, StoreError>;

    /// Reads the token stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if the value is not a token.
    fn get(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Reports how long `key` has left to live.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be reached.
    fn expiry(&self, key: &str) -> Result<Expiry, StoreError>;

    /// Resets the time-to-live of an existing `key` to `lease`. Returns
    /// `false` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be reached.
    fn expire(&self, key: &str, lease: Duration) -> Result<bool, StoreError>;

    /// Deletes `key` only if it currently holds `token`. Returns whether the
    /// key was deleted.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be reached.
    fn delete_if_equals(&self, key: &str, token: u64) -> Result<bool, StoreError>;
}

impl<S> LockStore for Arc<S>
where
    S: LockStore + ?Sized,
{
    fn set_if_absent(&self, key: &str, token: u64, lease: Duration) -> Result<bool, StoreError> {
        (**self).set_if_absent(key, token, lease)
    }

    fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        (**self).get(key)
    }

    fn expiry(&self, key: &str) -> Result<Expiry, StoreError> {
        (**self).expiry(key)
    }

    fn expire(&self, key: &str, lease: Duration) -> Result<bool, StoreError> {
        (**self).expire(key, lease)
    }

    fn delete_if_equals(&self, key: &str, token: u64) -> Result<bool, StoreError> {
        (**self).delete_if_equals(key, token)
    }
}

/// Parses a stored owner token.
pub(crate) fn parse_token(key: &str, value: &str) -> Result<u64, StoreError> {
    value.parse().map_err(|_| StoreError::Corrupt {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

/// A lease in whole milliseconds, at least one.
pub(crate) fn lease_millis(lease: Duration) -> u64 {
    u64::try_from(lease.as_millis()).unwrap_or(u64::MAX).max(1)
}
