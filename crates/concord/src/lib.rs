//! Distributed coordination primitives for horizontally scaled services.
//!
//! - [`SequenceIdGenerator`]: bit-packed, time-ordered 63-bit IDs tagged with
//!   the instance identity.
//! - [`DatedSequenceIdGenerator`]: decimal-packed IDs that read as
//!   `YYMMDD` + second of day + instance + sequence.
//! - [`DistributedLock`]: a leased mutual-exclusion lock arbitrated by a
//!   remote store such as Redis, using generator output as ownership tokens.
//!
//! # Example
//!
//! ```
//! use concord::{
//!     DistributedLock, Fixed, IdGenerator, InstanceIdentity, LockConfig, MemoryStore,
//!     SequenceIdGenerator, SequenceLayout, WallClock,
//! };
//!
//! let identity = InstanceIdentity::new(Fixed(3));
//! let layout = SequenceLayout::default();
//! let ids = SequenceIdGenerator::new(&identity, layout, WallClock::new(layout.epoch)).unwrap();
//!
//! let first = ids.next_id().unwrap();
//! let second = ids.next_id().unwrap();
//! assert!(first < second);
//!
//! let lock = DistributedLock::new(MemoryStore::new(), ids, LockConfig::default());
//! if let Some(guard) = lock.lock("invoice:42") {
//!     // critical section
//!     drop(guard);
//! }
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]

mod cache;
mod error;
mod generator;
mod identity;
mod lock;
#[cfg(feature = "async-tokio")]
mod runtime;
mod status;
mod time;

pub use crate::cache::*;
pub use crate::error::*;
pub use crate::generator::*;
pub use crate::identity::*;
pub use crate::lock::*;
#[cfg_attr(docsrs, doc(cfg(feature = "async-tokio")))]
#[cfg(feature = "async-tokio")]
pub use crate::runtime::*;
pub use crate::status::*;
pub use crate::time::*;
