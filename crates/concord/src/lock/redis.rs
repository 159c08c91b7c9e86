use core::fmt;
use core::time::Duration;
use parking_lot::Mutex;
use redis::{Client, Connection, RedisError, RedisResult};

use super::store::{Expiry, LockStore, StoreError, lease_millis, parse_token};

/// Default bound on connecting to, reading from and writing to Redis.
pub const DEFAULT_REDIS_TIMEOUT: Duration = Duration::from_secs(2);

/// One lazily established, self-healing synchronous Redis connection.
///
/// Commands run with the connection lock held. A command failing with an I/O
/// error or timeout drops the connection so the next command reconnects.
pub(crate) struct Connector {
    client: Client,
    timeout: Duration,
    connection: Mutex<Option<Connection>>,
}

impl Connector {
    pub(crate) fn open(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(url)?,
            timeout,
            connection: Mutex::new(None),
        })
    }

    pub(crate) fn run<T>(
        &self,
        command: impl FnOnce(&mut Connection) -> RedisResult<T>,
    ) -> Result<T, StoreError> {
        let mut slot = self.connection.lock();
        if slot.is_none() {
            *slot = Some(self.connect()?);
        }
        let Some(connection) = slot.as_mut() else {
            return Err(StoreError::unavailable("connection slot empty"));
        };

        command(connection).map_err(|e| {
            if is_broken(&e) {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %e, "dropping redis connection");
                *slot = None;
            }
            StoreError::from(e)
        })
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let connection = self
            .client
            .get_connection_with_timeout(self.timeout)
            .map_err(|e| StoreError::unavailable(e.to_string()))?;
        connection.set_read_timeout(Some(self.timeout))?;
        connection.set_write_timeout(Some(self.timeout))?;
        #[cfg(feature = "tracing")]
        tracing::debug!(addr = ?self.client.get_connection_info().addr, "connected to redis");
        Ok(connection)
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("addr", &self.client.get_connection_info().addr)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn is_broken(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_timeout()
}

/// Maps a `PTTL` reply: `-2` for no key, `-1` for a key without expiry.
fn expiry_from_pttl(millis: i64) -> Expiry {
    match millis {
        -1 => Expiry::Persistent,
        ms if ms < 0 => Expiry::Missing,
        ms => Expiry::Remaining(Duration::from_millis(ms.unsigned_abs())),
    }
}

/// A [`LockStore`] backed by a single Redis server.
///
/// | operation            | commands                                  |
/// |----------------------|-------------------------------------------|
/// | `set_if_absent`      | `SET key token NX PX lease`               |
/// | `get`                | `GET key`                                 |
/// | `expiry`             | `PTTL key`                                |
/// | `expire`             | `PEXPIRE key lease`                       |
/// | `delete_if_equals`   | `WATCH key`, `GET key`, `MULTI DEL EXEC`  |
///
/// The compare-and-delete is optimistic: if the key changes between the
/// `WATCH` and the `EXEC`, the transaction is retried.
#[derive(Debug)]
pub struct RedisStore {
    connector: Connector,
}

impl RedisStore {
    /// Prepares a store for the server at `url` (e.g. `redis://127.0.0.1/`).
    /// No connection is made until the first command.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Command`] if `url` is not a valid Redis URL.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        Self::with_timeout(url, DEFAULT_REDIS_TIMEOUT)
    }

    /// Like [`open`](Self::open) with an explicit connect/read/write timeout.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Command`] if `url` is not a valid Redis URL.
    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        Ok(Self {
            connector: Connector::open(url, timeout)?,
        })
    }
}

impl LockStore for RedisStore {
    fn set_if_absent(&self, key: &str, token: u64, lease: Duration) -> Result<bool, StoreError> {
        let reply: Option<String> = self.connector.run(|con| {
            redis::cmd("SET")
                .arg(key)
                .arg(token)
                .arg("NX")
                .arg("PX")
                .arg(lease_millis(lease))
                .query(con)
        })?;
        Ok(reply.is_some())
    }

    fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let value: Option<String> = self
            .connector
            .run(|con| redis::cmd("GET").arg(key).query(con))?;
        value.map(|value| parse_token(key, &value)).transpose()
    }

    fn expiry(&self, key: &str) -> Result<Expiry, StoreError> {
        let millis: i64 = self
            .connector
            .run(|con| redis::cmd("PTTL").arg(key).query(con))?;
        Ok(expiry_from_pttl(millis))
    }

    fn expire(&self, key: &str, lease: Duration) -> Result<bool, StoreError> {
        self.connector.run(|con| {
            redis::cmd("PEXPIRE")
                .arg(key)
                .arg(lease_millis(lease))
                .query(con)
        })
    }

    fn delete_if_equals(&self, key: &str, token: u64) -> Result<bool, StoreError> {
        let expected = token.to_string();
        self.connector.run(|con| {
            redis::transaction(con, &[key], |con, pipe| {
                let current: Option<String> = redis::cmd("GET").arg(key).query(con)?;
                if current.as_deref() != Some(expected.as_str()) {
                    return Ok(Some(false));
                }
                pipe.del(key)
                    .query::<Option<(i64,)>>(con)
                    .map(|reply| reply.map(|(deleted,)| deleted == 1))
            })
        })
    }
}
