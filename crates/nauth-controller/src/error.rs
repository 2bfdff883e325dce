//! Reconcile-driver error taxonomy (spec.md §4.9, §7).

use std::time::Duration;

use kube::runtime::controller::Action;
use kube::runtime::finalizer::Error as FinalizerError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("kube api error: {0}")]
    Kube(#[from] kube::Error),
    #[error("finalizer error: {0}")]
    Finalizer(#[from] Box<FinalizerError<Error>>),
    #[error(transparent)]
    Resolver(#[from] nauth_provider::ResolverError),
    #[error("provider error: {0}")]
    Provider(#[from] nauth_provider::ProviderError),
    #[error("invalid spec: {0}")]
    InvalidSpec(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// `kube::runtime::finalizer::finalizer` returns its error unboxed; callers
/// map it through this helper rather than relying on `?` (the derived
/// `From` only covers the boxed form, matching the other reconcilers'
/// convention of boxing at the call site).
pub fn finalizer_err(err: FinalizerError<Error>) -> Error {
    Error::Finalizer(Box::new(err))
}

/// Maps a reconcile failure to a requeue cadence (spec.md §7): fatal
/// misconfiguration backs off far, transient/conflict/retry-later back off
/// quickly so dependent-resource or network hiccups self-heal soon.
pub fn requeue_after(err: &Error) -> Action {
    use nauth_provider::ProviderError;

    match err {
        Error::Provider(ProviderError::Fatal(_)) | Error::InvalidSpec(_) => {
            Action::requeue(Duration::from_secs(10 * 60))
        }
        Error::Provider(ProviderError::Conflict(_)) | Error::Provider(ProviderError::RetryLater(_)) => {
            Action::requeue(Duration::from_secs(15))
        }
        Error::Provider(ProviderError::Transient(_)) => Action::requeue(Duration::from_secs(30)),
        Error::Resolver(_) => Action::requeue(Duration::from_secs(60)),
        _ => Action::requeue(Duration::from_secs(60)),
    }
}
