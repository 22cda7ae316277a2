//! Error taxonomy for the authentication crate

use evercore_core::error::CoreError;
use thiserror::Error;

/// Errors the interactive OAuth adapter can raise before a [`CoreError`] is
/// even in play (browser launch, local callback server, token exchange).
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("failed to bind local callback server: {0}")]
    CallbackServerBind(String),

    #[error("callback server closed without receiving a redirect")]
    CallbackServerClosed,

    #[error("failed to open system browser: {0}")]
    BrowserLaunch(String),

    #[error("authorization code exchange failed: {0}")]
    CodeExchange(String),

    #[error("token refresh failed: {0}")]
    TokenRefresh(String),
}

impl From<OAuthError> for CoreError {
    fn from(err: OAuthError) -> Self {
        CoreError::RuntimeError(err.to_string())
    }
}
