//! Interactive OAuth authentication adapter
//!
//! Drives the browser-based login: opens the system browser on the
//! authorization URL, listens on a local callback server for the redirect,
//! and exchanges the authorization code for an access token. Evernote's
//! authorization redirect additionally carries the account's `edam_userId`,
//! `edam_shard`, `edam_noteStoreUrl`, `edam_webApiUrlPrefix` and
//! `edam_expires` parameters alongside the OAuth code, so the callback can
//! assemble a complete `AuthenticationInfo` without a further RPC round
//! trip - the wire-level note-store/user-store protocol itself is out of
//! scope for this crate.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use evercore_core::domain::{Account, AuthenticationInfo};
use evercore_core::error::{CoreError, CoreResult};
use evercore_core::ports::Authenticator;
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, CsrfToken, EndpointNotSet,
    EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, Scope,
    TokenResponse, TokenUrl,
};
use tracing::{debug, info, warn};

use crate::error::OAuthError;

/// Configuration for the interactive OAuth flow.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub app_id: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub callback_bind_addr: String,
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    pub fn new(app_id: impl Into<String>, host: &str) -> Self {
        Self {
            app_id: app_id.into(),
            auth_url: format!("https://{host}/OAuth.action"),
            token_url: format!("https://{host}/oauth/token"),
            redirect_uri: "http://127.0.0.1:8743/callback".to_string(),
            callback_bind_addr: "127.0.0.1:8743".to_string(),
            scopes: vec!["basic".to_string()],
        }
    }
}

type EvernoteOAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

fn build_client(config: &OAuthConfig) -> Result<EvernoteOAuthClient, OAuthError> {
    let auth_url = AuthUrl::new(config.auth_url.clone())
        .map_err(|e| OAuthError::CodeExchange(format!("invalid authorization url: {e}")))?;
    let token_url = TokenUrl::new(config.token_url.clone())
        .map_err(|e| OAuthError::CodeExchange(format!("invalid token url: {e}")))?;
    let redirect_uri = RedirectUrl::new(config.redirect_uri.clone())
        .map_err(|e| OAuthError::CodeExchange(format!("invalid redirect uri: {e}")))?;

    Ok(BasicClient::new(ClientId::new(config.app_id.clone()))
        .set_auth_uri(auth_url)
        .set_token_uri(token_url)
        .set_redirect_uri(redirect_uri))
}

/// Parameters the local callback server extracts from the OAuth redirect.
#[derive(Debug, Clone)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
    pub user_id: i32,
    pub shard_id: String,
    pub note_store_url: String,
    pub web_api_url_prefix: String,
    pub expires_at: DateTime<Utc>,
}

fn parse_callback_params(uri: &str) -> Option<CallbackParams> {
    let url = url::Url::parse(&format!("http://localhost{uri}")).ok()?;
    let mut code = None;
    let mut state = None;
    let mut user_id = None;
    let mut shard_id = None;
    let mut note_store_url = None;
    let mut web_api_url_prefix = None;
    let mut expires_ms = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            "edam_userId" => user_id = value.parse::<i32>().ok(),
            "edam_shard" => shard_id = Some(value.to_string()),
            "edam_noteStoreUrl" => note_store_url = Some(value.to_string()),
            "edam_webApiUrlPrefix" => web_api_url_prefix = Some(value.to_string()),
            "edam_expires" => expires_ms = value.parse::<i64>().ok(),
            _ => {}
        }
    }

    let expires_at = expires_ms
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(|| Utc::now() + chrono::Duration::days(365));

    Some(CallbackParams {
        code: code?,
        state: state.unwrap_or_default(),
        user_id: user_id?,
        shard_id: shard_id?,
        note_store_url: note_store_url?,
        web_api_url_prefix: web_api_url_prefix.unwrap_or_default(),
        expires_at,
    })
}

/// Binds the local callback server, accepts exactly one connection, and
/// resolves once the redirect carrying the authorization code arrives.
async fn await_callback(bind_addr: &str) -> Result<CallbackParams, OAuthError> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    info!("starting local OAuth callback server on {}", bind_addr);

    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| OAuthError::CallbackServerBind(e.to_string()))?;

    let (tx, rx) = oneshot::channel::<CallbackParams>();
    let tx = Arc::new(tokio::sync::Mutex::new(Some(tx)));

    let (stream, _addr) = listener
        .accept()
        .await
        .map_err(|e| OAuthError::CallbackServerBind(e.to_string()))?;

    let io = TokioIo::new(stream);
    let tx_clone = tx.clone();

    let service = service_fn(move |req: Request<hyper::body::Incoming>| {
        let tx_inner = tx_clone.clone();
        async move {
            let uri = req.uri().to_string();
            debug!("callback server received request: {}", uri);

            match parse_callback_params(&uri) {
                Some(params) => {
                    if let Some(sender) = tx_inner.lock().await.take() {
                        let _ = sender.send(params);
                    }
                    Ok::<_, hyper::Error>(
                        Response::builder()
                            .status(StatusCode::OK)
                            .header("Content-Type", "text/html; charset=utf-8")
                            .body(Full::new(Bytes::from(success_html())))
                            .unwrap(),
                    )
                }
                None => Ok(Response::builder()
                    .status(StatusCode::BAD_REQUEST)
                    .header("Content-Type", "text/html; charset=utf-8")
                    .body(Full::new(Bytes::from(error_html(
                        "missing or incomplete authorization callback parameters",
                    ))))
                    .unwrap()),
            }
        }
    });

    tokio::spawn(async move {
        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
            warn!("callback server connection error: {}", e);
        }
    });

    rx.await.map_err(|_| OAuthError::CallbackServerClosed)
}

fn success_html() -> String {
    "<!DOCTYPE html><html><head><title>evercore - authenticated</title></head>\
     <body style=\"font-family: sans-serif; text-align: center; padding-top: 50px;\">\
     <h1>Authentication successful</h1><p>You can close this window.</p>\
     <script>setTimeout(function() { window.close(); }, 3000);</script>\
     </body></html>"
        .to_string()
}

fn error_html(message: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>evercore - authentication error</title></head>\
         <body style=\"font-family: sans-serif; text-align: center; padding-top: 50px;\">\
         <h1>Authentication error</h1><p>{message}</p></body></html>"
    )
}

/// Concrete [`Authenticator`] driving an interactive PKCE login through the
/// system browser and a one-shot local callback server.
pub struct InteractiveOAuthAuthenticator {
    config: OAuthConfig,
}

impl InteractiveOAuthAuthenticator {
    pub fn new(config: OAuthConfig) -> Self {
        Self { config }
    }

    async fn login(&self) -> Result<(CallbackParams, String), OAuthError> {
        let client = build_client(&self.config)?;
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut request = client.authorize_url(CsrfToken::new_random);
        for scope in &self.config.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        let (auth_url, _csrf) = request.set_pkce_challenge(pkce_challenge).url();

        info!("opening browser for interactive authentication");
        webbrowser::open(auth_url.as_str())
            .map_err(|e| OAuthError::BrowserLaunch(e.to_string()))?;

        let callback = await_callback(&self.config.callback_bind_addr).await?;

        let http_client = reqwest::Client::new();
        let token_result = client
            .exchange_code(AuthorizationCode::new(callback.code.clone()))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&http_client)
            .await
            .map_err(|e| OAuthError::CodeExchange(e.to_string()))?;

        let access_token = token_result.access_token().secret().to_string();
        Ok((callback, access_token))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<(), OAuthError> {
        let client = build_client(&self.config)?;
        let http_client = reqwest::Client::new();
        client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&http_client)
            .await
            .map_err(|e| OAuthError::TokenRefresh(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Authenticator for InteractiveOAuthAuthenticator {
    async fn authenticate_new_account(&self) -> CoreResult<(Account, AuthenticationInfo)> {
        let (callback, auth_token) = self.login().await.map_err(CoreError::from)?;

        let account = Account::new(callback.user_id, "www.evernote.com", "");
        let info = AuthenticationInfo {
            user_id: callback.user_id,
            auth_token,
            shard_id: callback.shard_id,
            note_store_url: callback.note_store_url,
            web_api_url_prefix: callback.web_api_url_prefix,
            token_expiration_time: callback.expires_at,
            authentication_time: Utc::now(),
            user_store_cookies: Vec::new(),
        };
        Ok((account, info))
    }

    async fn authenticate_account(&self, account: &Account) -> CoreResult<AuthenticationInfo> {
        if !account.is_evernote_account() {
            return Err(CoreError::InvalidArgument(
                "account is not an evernote account".to_string(),
            ));
        }

        let (callback, auth_token) = self.login().await.map_err(CoreError::from)?;
        Ok(AuthenticationInfo {
            user_id: account.user_id,
            auth_token,
            shard_id: callback.shard_id,
            note_store_url: callback.note_store_url,
            web_api_url_prefix: callback.web_api_url_prefix,
            token_expiration_time: callback.expires_at,
            authentication_time: Utc::now(),
            user_store_cookies: Vec::new(),
        })
    }
}
