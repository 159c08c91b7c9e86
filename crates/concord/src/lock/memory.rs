use core::time::Duration;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

use super::store::{Expiry, LockStore, StoreError, parse_token};
use crate::cache::{Cache, CacheError};

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    deadline: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.deadline.is_none_or(|deadline| now < deadline)
    }
}

/// An in-process store with per-key expiry.
///
/// Implements both [`LockStore`] and [`Cache`]. Expired entries are purged
/// lazily when touched. Suitable for tests and single-process deployments;
/// it provides no coordination between processes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `token` under `key` without an expiry, replacing any value.
    ///
    /// A lock key left like this is what a crash between creating the key
    /// and setting its expiry looks like on a store without atomic
    /// `SET NX PX`.
    pub fn insert_persistent(&self, key: &str, token: u64) {
        self.entries.lock().insert(
            key.to_owned(),
            Entry {
                value: token.to_string(),
                deadline: None,
            },
        );
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.is_live(now));
        entries.len()
    }

    /// Whether the store has no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) -> Option<Entry> {
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn insert(&self, key: &str, value: String, ttl: Option<Duration>) {
        let deadline = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.entries
            .lock()
            .insert(key.to_owned(), Entry { value, deadline });
    }
}

impl LockStore for MemoryStore {
    fn set_if_absent(&self, key: &str, token: u64, lease: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if Self::live(&mut entries, key, now).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_owned(),
            Entry {
                value: token.to_string(),
                deadline: now.checked_add(lease),
            },
        );
        Ok(true)
    }

    fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut entries = self.entries.lock();
        Self::live(&mut entries, key, Instant::now())
            .map(|entry| parse_token(key, &entry.value))
            .transpose()
    }

    fn expiry(&self, key: &str) -> Result<Expiry, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        Ok(match Self::live(&mut entries, key, now) {
            None => Expiry::Missing,
            Some(Entry { deadline: None, .. }) => Expiry::Persistent,
            Some(Entry {
                deadline: Some(deadline),
                ..
            }) => Expiry::Remaining(deadline.saturating_duration_since(now)),
        })
    }

    fn expire(&self, key: &str, lease: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if Self::live(&mut entries, key, now).is_none() {
            return Ok(false);
        }
        if let Some(entry) = entries.get_mut(key) {
            entry.deadline = now.checked_add(lease);
        }
        Ok(true)
    }

    fn delete_if_equals(&self, key: &str, token: u64) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock();
        let Some(entry) = Self::live(&mut entries, key, Instant::now()) else {
            return Ok(false);
        };
        if parse_token(key, &entry.value)? == token {
            entries.remove(key);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

impl Cache for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock();
        Ok(Self::live(&mut entries, key, Instant::now()).map(|entry| entry.value))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.insert(key, value.to_owned(), None);
        Ok(())
    }

    fn put_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.insert(key, value.to_owned(), Some(ttl));
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.lock();
        Ok(Self::live(&mut entries, key, Instant::now()).is_some())
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .remove(key)
            .is_some_and(|entry| entry.is_live(now)))
    }

    fn remove_by_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.lock().retain(|key, entry| {
            if !key.starts_with(prefix) {
                return true;
            }
            if entry.is_live(now) {
                removed += 1;
            }
            false
        });
        Ok(removed)
    }
}
