mod config;
mod distributed;
mod gate;
mod guard;
mod memory;
#[cfg(feature = "redis")]
pub(crate) mod redis;
pub(crate) mod store;

pub use config::*;
pub use distributed::*;
pub use guard::*;
pub use memory::*;
#[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
#[cfg(feature = "redis")]
pub use self::redis::{DEFAULT_REDIS_TIMEOUT, RedisStore};
pub use store::{Expiry, LockStore, StoreError};
