//! Cancellation port
//!
//! Checked at every suspension point in the downloader and sender (§5):
//! before each RPC call, between chunk-processing iterations, and between
//! entity-kind batches. A fatal [`ProtocolError`](crate::error::ProtocolError)
//! (`RateLimitReached`/`AuthExpired`) triggers the manual canceler
//! internally, so a caller-supplied canceler and the internal one are
//! indistinguishable from the orchestrator's point of view.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub trait Canceler: Send + Sync {
    fn is_canceled(&self) -> bool;
    fn cancel(&self);
}

/// Default [`Canceler`] backed by a [`CancellationToken`], cheaply clonable
/// and safe to share between the orchestrator and a caller-held handle.
#[derive(Debug, Clone, Default)]
pub struct TokenCanceler {
    token: CancellationToken,
}

impl TokenCanceler {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A canceler that is also canceled whenever `self` or `other` is.
    pub fn child_of(other: &CancellationToken) -> Self {
        Self {
            token: other.child_token(),
        }
    }
}

impl Canceler for TokenCanceler {
    fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn cancel(&self) {
        self.token.cancel();
    }
}

impl Canceler for Arc<TokenCanceler> {
    fn is_canceled(&self) -> bool {
        self.as_ref().is_canceled()
    }

    fn cancel(&self) {
        self.as_ref().cancel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled_and_latches() {
        let canceler = TokenCanceler::new();
        assert!(!canceler.is_canceled());
        canceler.cancel();
        assert!(canceler.is_canceled());
    }
}
