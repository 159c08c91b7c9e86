//! A minimal string key-value cache.
//!
//! Nothing in the lock or the generators depends on this; it exists so that
//! services already holding a Redis connection for locking can use the same
//! store for simple caching. Invalidation policy is left to the caller.

use core::time::Duration;

#[cfg(feature = "redis")]
mod redis;

#[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;

/// Errors a [`Cache`] can report.
pub type CacheError = crate::lock::StoreError;

/// String values addressed by string keys, with optional expiry.
pub trait Cache {
    /// Reads `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] if the backing store cannot be reached.
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value` under `key` without expiry, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] if the backing store cannot be reached.
    fn put(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Stores `value` under `key`, expiring after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] if the backing store cannot be reached.
    fn put_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Whether `key` holds a value.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] if the backing store cannot be reached.
    fn contains(&self, key: &str) -> Result<bool, CacheError>;

    /// Deletes `key`, reporting whether it existed.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] if the backing store cannot be reached.
    fn remove(&self, key: &str) -> Result<bool, CacheError>;

    /// Deletes every key in `keys`, returning how many existed.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] if the backing store cannot be reached.
    fn remove_many(&self, keys: &[&str]) -> Result<usize, CacheError> {
        let mut removed = 0;
        for key in keys {
            removed += usize::from(self.remove(key)?);
        }
        Ok(removed)
    }

    /// Deletes every key starting with `prefix`, returning how many existed.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] if the backing store cannot be reached.
    fn remove_by_prefix(&self, prefix: &str) -> Result<usize, CacheError>;

    /// Deletes every key.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] if the backing store cannot be reached.
    fn clear(&self) -> Result<usize, CacheError> {
        self.remove_by_prefix("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use std::thread::sleep;

    #[test]
    fn put_get_and_remove() {
        let cache = MemoryStore::new();
        assert_eq!(Cache::get(&cache, "a").unwrap(), None);

        cache.put("a", "1").unwrap();
        cache.put("a", "2").unwrap();
        assert_eq!(Cache::get(&cache, "a").unwrap().as_deref(), Some("2"));
        assert!(cache.contains("a").unwrap());

        assert!(cache.remove("a").unwrap());
        assert!(!cache.remove("a").unwrap());
        assert!(!cache.contains("a").unwrap());
    }

    #[test]
    fn entries_expire() {
        let cache = MemoryStore::new();
        cache
            .put_with_expiry("session", "x", Duration::from_millis(20))
            .unwrap();
        assert!(cache.contains("session").unwrap());

        sleep(Duration::from_millis(40));
        assert!(!cache.contains("session").unwrap());
        assert_eq!(Cache::get(&cache, "session").unwrap(), None);
        assert!(!cache.remove("session").unwrap());
    }

    #[test]
    fn remove_many_counts_existing_keys() {
        let cache = MemoryStore::new();
        cache.put("a", "1").unwrap();
        cache.put("b", "2").unwrap();
        assert_eq!(cache.remove_many(&["a", "b", "c"]).unwrap(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn remove_by_prefix_leaves_other_keys() {
        let cache = MemoryStore::new();
        for key in ["user:1", "user:2", "user:3", "order:1", "username"] {
            cache.put(key, "v").unwrap();
        }

        assert_eq!(cache.remove_by_prefix("user:").unwrap(), 3);
        assert!(cache.contains("order:1").unwrap());
        assert!(cache.contains("username").unwrap());

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.is_empty());
    }
}
