//! Configuration for the synchronization core
//!
//! Provides a typed configuration struct that maps to a TOML file with
//! environment-variable overrides (`EVERCORE_*`), loaded via `figment` the
//! way the teacher's `lnxdrive-core::config` loads its YAML configuration.
//! The core itself never reads this file: the orchestrator binary that
//! embeds this crate does, and threads the resulting `Config` into
//! `AuthenticationProvider`, `NoteStoreProvider` and the request-context
//! builder.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the synchronization core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub auth: AuthConfig,
    pub transport: TransportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: AppConfig::default(),
            auth: AuthConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (if it exists) layered under
    /// defaults, then applies `EVERCORE_`-prefixed environment overrides.
    ///
    /// Missing files are not an error: defaults are used as the base layer
    /// regardless, matching the teacher's tolerant config loading.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("EVERCORE_").split("__"));

        Ok(figment.extract()?)
    }
}

/// Application identity used when deriving secret-store and settings-store
/// keys (see the key-naming scheme in `evercore-auth::keys`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Short application name, embedded in every secret-store service name
    /// and settings-store key prefix (e.g. `"evercore"`).
    pub app_name: String,
    /// Evernote service host this account talks to, e.g. `"www.evernote.com"`.
    pub evernote_host: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "evercore".to_string(),
            evernote_host: "www.evernote.com".to_string(),
        }
    }
}

/// Authentication policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Minutes before expiration at which a cached token is considered
    /// "about to expire" and re-authentication is triggered. The
    /// specification fixes this at 30; it is configurable here only to let
    /// tests exercise the boundary without sleeping.
    pub about_to_expire_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            about_to_expire_minutes: 30,
        }
    }
}

impl AuthConfig {
    /// Returns the about-to-expire threshold as a `chrono::Duration`.
    pub fn about_to_expire_threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.about_to_expire_minutes)
    }
}

/// Transport-layer defaults carried in the request context built for each
/// RPC call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Base connection timeout, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Number of automatic retries the transport performs per call.
    pub retry_count: u32,
    /// Whether retries use exponential backoff.
    pub exponential_backoff: bool,
    /// Upper bound the exponential backoff may grow the timeout to.
    pub max_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 30_000,
            retry_count: 3,
            exponential_backoff: true,
            max_timeout_ms: 240_000,
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }
}
