//! Well-known label and annotation keys used to discover and link secrets
//! and records (spec.md §6 "Secret layout").

pub const LABEL_ACCOUNT_ID: &str = "account.nauth.io/id";
pub const LABEL_ACCOUNT_SIGNED_BY: &str = "account.nauth.io/signed-by";
pub const LABEL_ACCOUNT_NAME: &str = "account.nauth.io/name";
pub const LABEL_USER_ID: &str = "user.nauth.io/id";
pub const LABEL_USER_ACCOUNT_ID: &str = "user.nauth.io/account-id";
pub const LABEL_USER_SIGNED_BY: &str = "user.nauth.io/signed-by";
pub const LABEL_USER_NAME: &str = "user.nauth.io/name";
pub const LABEL_SECRET_TYPE: &str = "nauth.io/secret-type";
pub const LABEL_MANAGED: &str = "nauth.io/managed";
pub const LABEL_MANAGEMENT_POLICY: &str = "nauth.io/management-policy";

/// Values of [`LABEL_SECRET_TYPE`].
pub mod secret_type {
    pub const ACCOUNT_ROOT: &str = "account-root";
    pub const ACCOUNT_SIGN: &str = "account-sign";
    pub const OPERATOR_SIGN: &str = "operator-sign";
    pub const USER_SIGN: &str = "user-sign";
    pub const USER_CREDS: &str = "user-creds";
    pub const SYSTEM_ACCOUNT_USER_CREDS: &str = "system-account-user-creds";
}

/// The single recognized value of [`LABEL_MANAGEMENT_POLICY`].
pub const MANAGEMENT_POLICY_OBSERVE: &str = "observe";

/// Secret data key holding a single seed or token, unless the secret carries
/// a more specific key (e.g. `user.creds`).
pub const SECRET_KEY_DEFAULT: &str = "default";

/// Secret data key holding a NATS creds file (JWT + seed banners).
pub const SECRET_KEY_USER_CREDS: &str = "user.creds";

/// Returns `true` if `labels` mark the owning record as read-only-mirrored.
pub fn is_observe_policy(labels: &std::collections::BTreeMap<String, String>) -> bool {
    labels
        .get(LABEL_MANAGEMENT_POLICY)
        .map(|v| v == MANAGEMENT_POLICY_OBSERVE)
        .unwrap_or(false)
}

/// Empty `key` on a secret reference defaults to [`SECRET_KEY_DEFAULT`] (spec.md §8).
pub fn secret_key_or_default(key: &str) -> &str {
    if key.is_empty() {
        SECRET_KEY_DEFAULT
    } else {
        key
    }
}
