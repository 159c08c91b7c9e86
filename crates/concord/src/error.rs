//! Error types for identity resolution and ID generation.
//!
//! Generator construction is the only place where errors are fatal: a
//! generator that cannot resolve its instance identity or was given an
//! impossible layout must not be built. At runtime the generators only fail
//! when the clock has outgrown the timestamp field or the calendar cannot
//! produce a date prefix.
//!
//! Remote store failures have their own type, [`StoreError`], because the lock
//! absorbs them instead of propagating them.
//!
//! [`StoreError`]: crate::StoreError

/// A result type defaulting to the crate [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors that ID generation and identity resolution can produce.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested bit or digit layout cannot be packed into 63 bits.
    #[error("invalid layout: {reason}")]
    InvalidLayout { reason: String },

    /// The host identity could not be determined.
    ///
    /// This is unrecoverable: a generator without an identity cannot
    /// guarantee uniqueness across processes.
    #[error("instance identity unavailable: {reason}")]
    IdentityUnavailable { reason: String },

    /// The elapsed time since the epoch no longer fits the timestamp field.
    #[error("timestamp {timestamp} exceeds the {bits}-bit timestamp field")]
    TimestampOverflow { timestamp: u64, bits: u8 },

    /// The calendar did not yield a usable `YYMMDD` prefix after repeated
    /// attempts.
    #[error("date prefix unavailable after {attempts} attempts")]
    DatePrefixUnavailable { attempts: u32 },
}

impl Error {
    pub(crate) fn invalid_layout(reason: impl Into<String>) -> Self {
        Self::InvalidLayout {
            reason: reason.into(),
        }
    }
}
