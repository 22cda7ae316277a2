//! Transport parameters carried alongside an authenticated RPC call.
//!
//! A [`RequestContext`] bundles the auth token, replayed cookies and
//! transport tunables a note store client needs to issue a call. It is
//! also the unit of comparison `NoteStoreProvider` uses to decide whether
//! a cached client can still serve a request (§4.3): the token must not
//! be about to expire and the transport parameters must match exactly.

use std::time::Duration;

use super::account::Cookie;

/// Transport parameters a note store client is built or validated against.
///
/// `connect_timeout`, `retry_count` and `exponential_backoff` mirror
/// [`crate::config::TransportConfig`] but travel with each request rather
/// than being read from global config, so a caller can override them
/// per-call (e.g. a longer timeout for a resource download).
#[derive(Debug, Clone, PartialEq)]
pub struct TransportParams {
    pub connect_timeout: Duration,
    pub retry_count: u32,
    pub exponential_backoff: bool,
}

impl Default for TransportParams {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(30_000),
            retry_count: 3,
            exponential_backoff: true,
        }
    }
}

/// Everything a note store client needs to authenticate and carry out a
/// single call: the bearer token, cookies to replay, and transport
/// tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub auth_token: String,
    pub cookies: Vec<Cookie>,
    pub transport: TransportParams,
}

impl RequestContext {
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            cookies: Vec::new(),
            transport: TransportParams::default(),
        }
    }

    pub fn with_cookies(mut self, cookies: Vec<Cookie>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_transport(mut self, transport: TransportParams) -> Self {
        self.transport = transport;
        self
    }

    /// Replaces the auth token while preserving cookies and transport
    /// parameters - used when a user-own context is adapted for a
    /// linked-notebook call (§4.4.2 step 5).
    pub fn with_auth_token(mut self, auth_token: impl Into<String>) -> Self {
        self.auth_token = auth_token.into();
        self
    }

    /// Whether `other`'s transport parameters match this context's -
    /// the cache-validity check `NoteStoreProvider` runs before reusing a
    /// client (§4.3).
    pub fn transport_matches(&self, other: &TransportParams) -> bool {
        self.transport == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_auth_token_preserves_transport_and_cookies() {
        let ctx = RequestContext::new("tok1")
            .with_cookies(vec![Cookie::new("webAPreUserGuid", "v")])
            .with_transport(TransportParams {
                connect_timeout: Duration::from_millis(5_000),
                retry_count: 1,
                exponential_backoff: false,
            });

        let replaced = ctx.clone().with_auth_token("tok2");
        assert_eq!(replaced.auth_token, "tok2");
        assert_eq!(replaced.cookies, ctx.cookies);
        assert_eq!(replaced.transport, ctx.transport);
    }

    #[test]
    fn transport_matches_requires_exact_equality() {
        let ctx = RequestContext::new("tok");
        assert!(ctx.transport_matches(&TransportParams::default()));
        assert!(!ctx.transport_matches(&TransportParams {
            retry_count: 9,
            ..TransportParams::default()
        }));
    }
}
