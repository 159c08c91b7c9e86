use core::time::Duration;

use super::{Cache, CacheError};
use crate::lock::{
    redis::{Connector, DEFAULT_REDIS_TIMEOUT},
    store::lease_millis,
};

/// Keys inspected per `SCAN` round trip.
const SCAN_BATCH: usize = 500;

/// A [`Cache`] over Redis with every key namespaced as `<namespace>:<key>`.
///
/// Prefix removal walks the namespace with `SCAN`, never `KEYS`, so it does
/// not block the server on large keyspaces. Keys written concurrently with a
/// removal may survive it.
#[derive(Debug)]
pub struct RedisCache {
    connector: Connector,
    prefix: String,
}

impl RedisCache {
    /// A cache in `namespace` on the server at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Command`] if `url` is not a valid Redis URL.
    pub fn open(url: &str, namespace: &str) -> Result<Self, CacheError> {
        Self::with_timeout(url, namespace, DEFAULT_REDIS_TIMEOUT)
    }

    /// Like [`open`](Self::open) with an explicit connect/read/write timeout.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Command`] if `url` is not a valid Redis URL.
    pub fn with_timeout(url: &str, namespace: &str, timeout: Duration) -> Result<Self, CacheError> {
        Ok(Self {
            connector: Connector::open(url, timeout)?,
            prefix: format!("{namespace}:"),
        })
    }

    /// The string every stored key starts with.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

impl Cache for RedisCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let key = self.key(key);
        self.connector
            .run(|con| redis::cmd("GET").arg(&key).query(con))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let key = self.key(key);
        self.connector
            .run(|con| redis::cmd("SET").arg(&key).arg(value).query(con))
    }

    fn put_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let key = self.key(key);
        self.connector.run(|con| {
            redis::cmd("SET")
                .arg(&key)
                .arg(value)
                .arg("PX")
                .arg(lease_millis(ttl))
                .query(con)
        })
    }

    fn contains(&self, key: &str) -> Result<bool, CacheError> {
        let key = self.key(key);
        self.connector
            .run(|con| redis::cmd("EXISTS").arg(&key).query(con))
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let key = self.key(key);
        self.connector
            .run(|con| redis::cmd("DEL").arg(&key).query(con))
    }

    fn remove_many(&self, keys: &[&str]) -> Result<usize, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let keys: Vec<String> = keys.iter().map(|key| self.key(key)).collect();
        self.connector
            .run(|con| redis::cmd("DEL").arg(&keys).query(con))
    }

    fn remove_by_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let pattern = format!("{}*", escape_glob(&self.key(prefix)));
        let mut cursor = 0_u64;
        let mut removed = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = self.connector.run(|con| {
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query(con)
            })?;
            if !keys.is_empty() {
                removed += self
                    .connector
                    .run(|con| redis::cmd("DEL").arg(&keys).query::<usize>(con))?;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(pattern = %pattern, removed, "removed keys by prefix");
        Ok(removed)
    }
}

/// Escapes the `MATCH` glob metacharacters in `literal`.
fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
