use core::time::Duration;

/// Default time-to-live of a lock record.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(60);

/// Default pause between acquisition attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A sensible bound for [`WaitPolicy::Timeout`] when callers do not want to
/// wait forever.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default namespace of lock keys in the store.
pub const DEFAULT_KEY_PREFIX: &str = "lock_key:";

/// How contenders inside one process reach the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LockMode {
    /// Local contenders for a key queue on an in-process gate first, so at
    /// most one of them polls the store at a time.
    #[default]
    Pessimistic,
    /// Every contender polls the store on its own.
    Optimistic,
}

/// How long `acquire` keeps trying.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum WaitPolicy {
    /// Retry until the lock is obtained.
    #[default]
    Forever,
    /// Give up once this much time has passed. A zero timeout makes a single
    /// attempt.
    Timeout(Duration),
}

/// Settings of a [`DistributedLock`](crate::DistributedLock).
///
/// ```
/// use concord::{LockConfig, LockMode, WaitPolicy};
/// use std::time::Duration;
///
/// let config = LockConfig::default()
///     .with_lease(Duration::from_secs(30))
///     .with_wait(WaitPolicy::Timeout(Duration::from_secs(5)))
///     .with_mode(LockMode::Optimistic);
/// assert_eq!(config.key("orders"), "lock_key:orders");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LockConfig {
    /// Time-to-live of the lock record.
    pub lease: Duration,
    /// How long acquisition keeps trying.
    pub wait: WaitPolicy,
    /// Pause between attempts.
    pub poll_interval: Duration,
    /// In-process contention strategy.
    pub mode: LockMode,
    /// Prepended to every resource name to form the store key.
    pub key_prefix: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease: DEFAULT_LEASE,
            wait: WaitPolicy::Forever,
            poll_interval: DEFAULT_POLL_INTERVAL,
            mode: LockMode::Pessimistic,
            key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
        }
    }
}

impl LockConfig {
    #[must_use]
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    #[must_use]
    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: LockMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    /// The store key guarding `resource`.
    pub fn key(&self, resource: &str) -> String {
        let mut key = String::with_capacity(self.key_prefix.len() + resource.len());
        key.push_str(&self.key_prefix);
        key.push_str(resource);
        key
    }
}
