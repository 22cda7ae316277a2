//! evercore-auth - authentication and credential lifecycle
//!
//! Provides [`provider::AuthenticationProvider`], the policy layer described
//! in the synchronization core's authentication design (caching, about-to-
//! expire handling, the public-notebook fast path), plus the concrete
//! collaborators a real deployment plugs into it: [`oauth::InteractiveOAuthAuthenticator`]
//! (an `evercore_core::ports::Authenticator`) and
//! [`keyring_secret_store::KeyringSecretStore`] (an `evercore_core::ports::SecretStore`).

pub mod cache;
pub mod error;
pub mod keyring_secret_store;
pub mod keys;
pub mod oauth;
pub mod provider;

pub use error::OAuthError;
pub use oauth::{InteractiveOAuthAuthenticator, OAuthConfig};
pub use keyring_secret_store::KeyringSecretStore;
pub use provider::{AuthMode, AuthenticationProvider, ClearCachesSelector};
