//! Secret-store and settings-store key naming
//!
//! Every builder here matches the exact service/key scheme a reference
//! deployment must follow so that secrets written by one process version are
//! still readable by the next. Nothing is hashed or obfuscated: the
//! underlying keychain provides the actual protection.

/// `(service, key)` pair for the user's own auth token.
pub fn auth_token_key(app_name: &str, host: &str, user_id: i32) -> (String, String) {
    (
        format!("{app_name}_{host}_{user_id}"),
        format!("{app_name}_auth_token_{host}_{user_id}"),
    )
}

/// `(service, key)` pair for the user's shard id.
pub fn shard_id_key(app_name: &str, host: &str, user_id: i32) -> (String, String) {
    (
        format!("{app_name}_shard_id"),
        format!("{app_name}_shard_id_{host}_{user_id}"),
    )
}

/// `(service, key)` pair for a linked notebook's auth token.
pub fn linked_notebook_auth_token_key(
    app_name: &str,
    host: &str,
    user_id: i32,
    linked_notebook_guid: &str,
) -> (String, String) {
    (
        format!("{app_name}_linked_notebook_auth_token"),
        format!("{app_name}_linked_notebook_auth_token_{host}_{user_id}_{linked_notebook_guid}"),
    )
}

/// Settings-store section for the user's own authentication metadata.
pub fn auth_section(host: &str, user_id: i32) -> String {
    format!("Authentication/{host}/{user_id}")
}

pub const NOTE_STORE_URL: &str = "NoteStoreUrl";
pub const WEB_API_URL_PREFIX: &str = "WebApiUrlPrefix";
pub const EXPIRATION_TIMESTAMP: &str = "ExpirationTimestamp";
pub const AUTHENTICATION_TIMESTAMP: &str = "AuthenticationTimestamp";
pub const USER_STORE_COOKIE: &str = "UserStoreCookie";

pub fn linked_notebook_expiration_timestamp_key(guid: &str) -> String {
    format!("LinkedNotebookExpirationTimestamp_{guid}")
}

pub fn linked_notebook_authentication_timestamp_key(guid: &str) -> String {
    format!("LinkedNotebookAuthenticationTimestamp_{guid}")
}
