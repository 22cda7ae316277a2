//! HTTP-based `RpcClient` adapter
//!
//! The real wire protocol (Thrift/EDAM framing, transport-level retry,
//! cookie replay, TLS) is explicitly out of scope for this core; this
//! adapter models the RPC surface as plain JSON-over-HTTP calls against a
//! note-store base URL, which is enough to exercise the typed
//! request/response/error contract every caller above this crate depends
//! on.
//!
//! Every call goes through [`ReqwestRpcClient::execute`], which acquires a
//! rate-limit token for the call's endpoint class before sending and maps
//! the HTTP response onto [`ProtocolError`]. Unlike a transport-level
//! retry loop, a 429 here is not retried in place: it is surfaced as
//! `ProtocolError::RateLimitReached` so the sync cycle can stop per §4.4.4
//! rather than spin against a server that is already throttling this
//! account.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use evercore_core::domain::{Guid, LinkedNotebook, Note, Notebook, RequestContext, Resource, SavedSearch, SyncChunk, Tag, Usn};
use evercore_core::error::{CoreError, CoreResult, ProtocolError};
use evercore_core::ports::local_store::NoteFetchOptions;
use evercore_core::ports::rpc_client::{RpcClient, RpcSyncChunkFilter, RpcSyncState, SharedNotebookAuth};
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::debug;

use crate::rate_limit::{parse_retry_after, AdaptiveRateLimiter};

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// One note-store endpoint, bound to a request context (auth token,
/// cookies, transport parameters) for its whole lifetime. A fresh client
/// is built whenever the context changes (§4.3's cache-validity rule).
pub struct ReqwestRpcClient {
    http: reqwest::Client,
    note_store_url: String,
    context: RequestContext,
    rate_limiter: Arc<AdaptiveRateLimiter>,
}

impl ReqwestRpcClient {
    pub fn new(
        note_store_url: impl Into<String>,
        context: RequestContext,
        rate_limiter: Arc<AdaptiveRateLimiter>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(context.transport.connect_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            note_store_url: note_store_url.into(),
            context,
            rate_limiter,
        }
    }

    pub fn note_store_url(&self) -> &str {
        &self.note_store_url
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    async fn execute<B, R>(&self, endpoint_class: &str, method: &str, body: &B) -> CoreResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let _guard = self.rate_limiter.acquire(endpoint_class).await;

        let url = format!("{}/{}", self.note_store_url.trim_end_matches('/'), method);
        let mut request = self.http.request(Method::POST, &url).json(body);
        if !self.context.auth_token.is_empty() {
            request = request.bearer_auth(&self.context.auth_token);
        }
        for cookie in &self.context.cookies {
            request = request.header("Cookie", format!("{}={}", cookie.name, cookie.value));
        }

        let response = request
            .send()
            .await
            .map_err(|e| CoreError::RuntimeError(format!("request to {method} failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER))
                .unwrap_or(DEFAULT_RETRY_AFTER);
            self.rate_limiter.on_throttle(endpoint_class);
            return Err(CoreError::Protocol(ProtocolError::RateLimitReached {
                seconds: retry_after.as_secs() as u32,
            }));
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CoreError::Protocol(status_to_protocol_error(status, message)));
        }

        self.rate_limiter.on_success(endpoint_class);
        debug!(method, "note store call succeeded");
        response
            .json::<R>()
            .await
            .map_err(|e| CoreError::RuntimeError(format!("malformed response from {method}: {e}")))
    }
}

fn status_to_protocol_error(status: StatusCode, message: String) -> ProtocolError {
    match status {
        StatusCode::UNAUTHORIZED => ProtocolError::AuthExpired,
        StatusCode::FORBIDDEN => ProtocolError::PermissionDenied(message),
        StatusCode::NOT_FOUND => ProtocolError::NotFound(message),
        StatusCode::CONFLICT => ProtocolError::DataConflict(message),
        StatusCode::PAYMENT_REQUIRED => ProtocolError::QuotaReached(message),
        StatusCode::UNPROCESSABLE_ENTITY => ProtocolError::EnmlValidation(message),
        StatusCode::BAD_REQUEST => ProtocolError::BadDataFormat(message),
        StatusCode::INSUFFICIENT_STORAGE => ProtocolError::LimitReached(message),
        _ => ProtocolError::Unknown(format!("{status}: {message}")),
    }
}

#[async_trait]
impl RpcClient for ReqwestRpcClient {
    async fn get_sync_state(&self) -> CoreResult<RpcSyncState> {
        self.execute("sync_chunk", "getSyncState", &json!({})).await
    }

    async fn get_filtered_sync_chunk(
        &self,
        after_usn: Usn,
        max_entries: u32,
        filter: &RpcSyncChunkFilter,
    ) -> CoreResult<SyncChunk> {
        self.execute(
            "sync_chunk",
            "getFilteredSyncChunk",
            &json!({
                "afterUsn": after_usn.0,
                "maxEntries": max_entries,
                "includeNotebooks": filter.include_notebooks,
                "includeTags": filter.include_tags,
                "includeSavedSearches": filter.include_saved_searches,
                "includeLinkedNotebooks": filter.include_linked_notebooks,
                "includeNotes": filter.include_notes,
                "includeResources": filter.include_resources,
                "includeExpunged": filter.include_expunged,
            }),
        )
        .await
    }

    async fn get_linked_notebook_sync_state(&self, linked_notebook: &LinkedNotebook) -> CoreResult<RpcSyncState> {
        self.execute(
            "sync_chunk",
            "getLinkedNotebookSyncState",
            &json!({ "linkedNotebook": linked_notebook }),
        )
        .await
    }

    async fn get_linked_notebook_sync_chunk(
        &self,
        linked_notebook: &LinkedNotebook,
        after_usn: Usn,
        max_entries: u32,
        filter: &RpcSyncChunkFilter,
    ) -> CoreResult<SyncChunk> {
        self.execute(
            "sync_chunk",
            "getLinkedNotebookSyncChunk",
            &json!({
                "linkedNotebook": linked_notebook,
                "afterUsn": after_usn.0,
                "maxEntries": max_entries,
                "includeNotes": filter.include_notes,
                "includeResources": filter.include_resources,
            }),
        )
        .await
    }

    async fn authenticate_to_shared_notebook(&self, shared_notebook_global_id: &str) -> CoreResult<SharedNotebookAuth> {
        self.execute(
            "create_update",
            "authenticateToSharedNotebook",
            &json!({ "sharedNotebookGlobalId": shared_notebook_global_id }),
        )
        .await
    }

    async fn create_notebook(&self, notebook: &Notebook) -> CoreResult<Notebook> {
        self.execute("create_update", "createNotebook", notebook).await
    }

    async fn update_notebook(&self, notebook: &Notebook) -> CoreResult<Usn> {
        self.execute("create_update", "updateNotebook", notebook).await
    }

    async fn create_tag(&self, tag: &Tag) -> CoreResult<Tag> {
        self.execute("create_update", "createTag", tag).await
    }

    async fn update_tag(&self, tag: &Tag) -> CoreResult<Usn> {
        self.execute("create_update", "updateTag", tag).await
    }

    async fn create_saved_search(&self, search: &SavedSearch) -> CoreResult<SavedSearch> {
        self.execute("create_update", "createSearch", search).await
    }

    async fn update_saved_search(&self, search: &SavedSearch) -> CoreResult<Usn> {
        self.execute("create_update", "updateSearch", search).await
    }

    async fn create_note(&self, note: &Note) -> CoreResult<Note> {
        self.execute("create_update", "createNote", note).await
    }

    async fn update_note(&self, note: &Note) -> CoreResult<Usn> {
        self.execute("create_update", "updateNote", note).await
    }

    async fn get_note_with_result_spec(&self, guid: &Guid, options: NoteFetchOptions) -> CoreResult<Note> {
        self.execute(
            "notes",
            "getNoteWithResultSpec",
            &json!({
                "guid": guid.as_str(),
                "withResourceMetadata": options.with_resource_metadata,
                "withResourceBinaryData": options.with_resource_binary_data,
            }),
        )
        .await
    }

    async fn get_resource(&self, guid: &Guid, with_binary_data: bool) -> CoreResult<Resource> {
        self.execute(
            "resources",
            "getResource",
            &json!({ "guid": guid.as_str(), "withBinaryData": with_binary_data }),
        )
        .await
    }
}
