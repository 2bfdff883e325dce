//! Error taxonomy for the native back end (spec.md §7).

#[derive(Debug, thiserror::Error)]
pub enum NativeError {
    #[error("secret store error: {0}")]
    SecretStore(#[from] nauth_secrets::SecretStoreError),
    #[error("claims error: {0}")]
    Claims(#[from] nauth_claims::native::NativeClaimsError),
    #[error("jwt codec error: {0}")]
    Jwt(#[from] anyhow::Error),
    #[error("expected exactly one secret matching {selector:?} in namespace {namespace:?}, found {found}")]
    AmbiguousKeySelection {
        namespace: String,
        selector: String,
        found: usize,
    },
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("stored account key does not match decoded JWT subject (match)")]
    KeyMismatch,
    #[error("NATS client error: {0}")]
    NatsClient(String),
    #[error("account {0} still has {1} dependent users")]
    DependentUsersExist(String, usize),
    /// Not-found-during-delete sentinel (spec.md §7 "Not-found during delete"):
    /// joined with the underlying cause so the caller's finalizer removal is
    /// deferred rather than dropped.
    #[error("retry later: {0}")]
    RetryLater(String),
}
