//! evercore-notestore - note store RPC client and client provider
//!
//! This crate holds:
//! - **`rate_limit`** - [`rate_limit::AdaptiveRateLimiter`], proactive
//!   per-endpoint-class rate limiting.
//! - **`client`** - [`client::ReqwestRpcClient`], the JSON-over-HTTP
//!   `evercore_core::ports::RpcClient` adapter.
//! - **`factory`** - [`factory::NoteStoreClientBuilder`] and its
//!   `ReqwestNoteStoreClientBuilder` implementation, the seam
//!   `evercore-auth` and [`provider::NoteStoreProvider`] both build
//!   clients through.
//! - **`provider`** - [`provider::NoteStoreProvider`], resolving and
//!   caching the right client for the user's own data or a given linked
//!   notebook.

pub mod client;
pub mod factory;
pub mod provider;
pub mod rate_limit;

pub use client::ReqwestRpcClient;
pub use factory::{NoteStoreClientBuilder, ReqwestNoteStoreClientBuilder};
pub use provider::NoteStoreProvider;
pub use rate_limit::{AdaptiveRateLimiter, RateLimitConfig};
