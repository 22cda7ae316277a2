//! Note-store client factory port
//!
//! `AuthenticationProvider`'s shared-notebook authentication step (§4.2,
//! item 3) needs to build an ad hoc RPC client against an arbitrary
//! `note_store_url` before it has a full `LinkedNotebookAuthInfo` to hand
//! `NoteStoreProvider`. This narrow trait is the seam: `evercore-notestore`
//! implements it on top of the same client factory `NoteStoreProvider` uses
//! internally, so `evercore-auth` never needs to depend on it directly.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::ports::rpc_client::RpcClient;

#[async_trait]
pub trait NoteStoreClientFactory: Send + Sync {
    /// `auth_token` is the caller's own (already-cached) token: per §4.2
    /// item 3, `authenticate_to_shared_notebook` is issued with a request
    /// context carrying the user's own token, not an empty one.
    async fn client_for_note_store_url(
        &self,
        note_store_url: &str,
        auth_token: &str,
    ) -> CoreResult<Arc<dyn RpcClient>>;
}
