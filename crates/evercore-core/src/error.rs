//! Error taxonomy shared by every layer of the synchronization core
//!
//! This module defines `CoreError`, the classification every public
//! operation in `evercore-auth`, `evercore-notestore` and `evercore-sync`
//! eventually returns, and `ProtocolError`, the subset of RPC failures the
//! core maps into per-item status failures or fatal cycle-stopping signals.

use thiserror::Error;

/// Errors surfaced by synchronization-core operations.
///
/// Mirrors the taxonomy in the specification's error handling design:
/// caller bugs are `InvalidArgument`, cancellation is its own variant, and
/// everything else that isn't a classified protocol error collapses into
/// `RuntimeError`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Caller bug: empty account, non-Evernote account, linked notebook
    /// without a guid, a null/misconfigured dependency.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The current sync or send cycle was cancelled, either by the caller's
    /// canceler or by the internal manual canceler reacting to a fatal
    /// server signal.
    #[error("operation canceled")]
    OperationCanceled,

    /// A protocol-level error from the RPC layer that the core classifies
    /// as fatal to the current cycle.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// All unclassified failures, including local-store failures and
    /// logic-impossible states (e.g. a locally-modified note whose
    /// notebook cannot be found).
    #[error("runtime error: {0}")]
    RuntimeError(String),
}

impl CoreError {
    /// True for the two fatal signals that must trigger the manual canceler
    /// and end the cycle with [`CoreError::OperationCanceled`].
    pub fn is_stop_synchronization(&self) -> bool {
        matches!(
            self,
            CoreError::Protocol(ProtocolError::RateLimitReached { .. })
                | CoreError::Protocol(ProtocolError::AuthExpired)
        )
    }
}

/// Typed protocol errors returned by the note store / user store RPC layer.
///
/// Everything except `RateLimitReached` and `AuthExpired` is a per-item
/// failure: it gets recorded in a status accumulator and the stage
/// continues. The other two are fatal to the whole cycle.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// The submitted data was malformed for the target field.
    #[error("bad data format: {0}")]
    BadDataFormat(String),

    /// The server detected a conflicting update (someone else modified the
    /// same entity since the local copy was last synced).
    #[error("data conflict: {0}")]
    DataConflict(String),

    /// A mandatory field was missing.
    #[error("data required: {0}")]
    DataRequired(String),

    /// A service-defined limit was exceeded (e.g. tag count per note).
    #[error("limit reached: {0}")]
    LimitReached(String),

    /// The authenticated user lacks permission for the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The account's storage quota has been exhausted.
    #[error("quota reached: {0}")]
    QuotaReached(String),

    /// ENML content failed validation.
    #[error("ENML validation failed: {0}")]
    EnmlValidation(String),

    /// The referenced entity does not exist server-side.
    #[error("not found: {0}")]
    NotFound(String),

    /// Fatal: the server is throttling this account. Carries the
    /// server-advised number of seconds to wait before retrying.
    #[error("rate limit reached, retry after {seconds}s")]
    RateLimitReached {
        /// Seconds the caller should wait before the next sync attempt.
        seconds: u32,
    },

    /// Fatal: the auth token expired mid-cycle. The next cycle must
    /// re-authenticate.
    #[error("authentication expired")]
    AuthExpired,

    /// Any server error the core does not recognize.
    #[error("unexpected protocol error: {0}")]
    Unknown(String),
}

impl ProtocolError {
    /// Returns `true` for errors that should be recorded as a per-item
    /// failure and allow the stage to continue, as opposed to the two
    /// fatal signals that abort the whole cycle.
    pub fn is_per_item(&self) -> bool {
        !matches!(
            self,
            ProtocolError::RateLimitReached { .. } | ProtocolError::AuthExpired
        )
    }
}

/// Convenience alias used throughout the core crates.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_auth_expired_stop_synchronization() {
        let rl = CoreError::Protocol(ProtocolError::RateLimitReached { seconds: 120 });
        assert!(rl.is_stop_synchronization());

        let ae = CoreError::Protocol(ProtocolError::AuthExpired);
        assert!(ae.is_stop_synchronization());

        let nf = CoreError::Protocol(ProtocolError::NotFound("note".into()));
        assert!(!nf.is_stop_synchronization());

        let rt = CoreError::RuntimeError("boom".into());
        assert!(!rt.is_stop_synchronization());
    }

    #[test]
    fn per_item_classification() {
        assert!(ProtocolError::NotFound("x".into()).is_per_item());
        assert!(ProtocolError::DataConflict("x".into()).is_per_item());
        assert!(!ProtocolError::RateLimitReached { seconds: 30 }.is_per_item());
        assert!(!ProtocolError::AuthExpired.is_per_item());
    }
}
