//! Concrete note store client construction
//!
//! [`NoteStoreClientBuilder`] is the "injected factory" §4.3 says
//! `NoteStoreProvider` uses to build a fresh client once cache validation
//! fails. [`ReqwestNoteStoreClientBuilder`] is its only implementation,
//! and also implements `evercore_core::ports::NoteStoreClientFactory` - the
//! narrow port `evercore-auth` depends on for the shared-notebook
//! authentication step (§4.2) - on top of the same rate limiter and HTTP
//! client, so the two call paths never diverge in behavior.

use std::sync::Arc;

use async_trait::async_trait;
use evercore_core::domain::RequestContext;
use evercore_core::error::CoreResult;
use evercore_core::ports::client_factory::NoteStoreClientFactory;
use evercore_core::ports::rpc_client::RpcClient;

use crate::client::ReqwestRpcClient;
use crate::rate_limit::AdaptiveRateLimiter;

#[async_trait]
pub trait NoteStoreClientBuilder: Send + Sync {
    async fn build(&self, note_store_url: &str, context: RequestContext) -> CoreResult<Arc<dyn RpcClient>>;
}

pub struct ReqwestNoteStoreClientBuilder {
    rate_limiter: Arc<AdaptiveRateLimiter>,
}

impl ReqwestNoteStoreClientBuilder {
    pub fn new(rate_limiter: Arc<AdaptiveRateLimiter>) -> Self {
        Self { rate_limiter }
    }

    pub fn with_defaults() -> Self {
        Self::new(Arc::new(AdaptiveRateLimiter::with_defaults()))
    }
}

#[async_trait]
impl NoteStoreClientBuilder for ReqwestNoteStoreClientBuilder {
    async fn build(&self, note_store_url: &str, context: RequestContext) -> CoreResult<Arc<dyn RpcClient>> {
        Ok(Arc::new(ReqwestRpcClient::new(
            note_store_url,
            context,
            self.rate_limiter.clone(),
        )))
    }
}

/// §4.2 item 3: `authenticate_to_shared_notebook` is issued with a request
/// context carrying the user's own, already-cached token.
#[async_trait]
impl NoteStoreClientFactory for ReqwestNoteStoreClientBuilder {
    async fn client_for_note_store_url(
        &self,
        note_store_url: &str,
        auth_token: &str,
    ) -> CoreResult<Arc<dyn RpcClient>> {
        self.build(note_store_url, RequestContext::new(auth_token)).await
    }
}
