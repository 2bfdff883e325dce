//! Provider interface and resolver (spec.md §4.8): polymorphic dispatch
//! between the native and hosted back ends, keyed by a cluster reference's
//! `kind`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nauth_types::cluster_ref::{parse_cluster_reference, ClusterRef};

/// Outcome of an account create/update/import call.
#[derive(Debug, Clone)]
pub struct AccountOutcome {
    pub account_id: String,
    pub account_signed_by: String,
    /// Projected claims, stored verbatim in `status.claims` (spec.md §3).
    pub claims: serde_json::Value,
    pub requeue_after: Option<Duration>,
    /// Set when the remote/observed account key no longer matches the
    /// stored `account-signed-by` label (spec.md §4.7 step 4).
    pub account_nkey_rotated: bool,
}

#[derive(Debug, Clone)]
pub struct UserOutcome {
    pub user_id: String,
    pub user_account_id: String,
    pub user_signed_by: String,
    pub requeue_after: Option<Duration>,
}

/// Everything a `Provider` needs to act on one `Account` reconcile.
#[derive(Debug, Clone)]
pub struct AccountContext {
    pub namespace: String,
    pub account_name: String,
    pub account_id: Option<String>,
    pub account_signed_by: Option<String>,
    pub observe_policy: bool,
    pub spec: nauth_types::account::AccountSpec,
    /// `system.spec.reconcileInterval ?? 5m`, used as the hosted provider's
    /// periodic-sync `requeueAfter` (spec.md §4.7 step 2, step 5).
    pub reconcile_interval: Duration,
    /// The reconciled `Account`'s `metadata.uid`, so a back end can stamp an
    /// owner reference on the secrets it writes.
    pub owner_uid: String,
}

#[derive(Debug, Clone)]
pub struct UserContext {
    pub namespace: String,
    pub user_name: String,
    pub user_id: Option<String>,
    /// The user's last-known `user-account-id` label; carried so a delete
    /// can locate the owning account's signing key without requiring the
    /// `Account` record to still exist (spec.md §7 "Not-found during delete").
    pub account_id: Option<String>,
    pub spec: nauth_types::user::UserSpec,
    /// The reconciled `User`'s `metadata.uid`, so a back end can stamp an
    /// owner reference on the secrets it writes.
    pub owner_uid: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0}")]
    Fatal(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transient: {0}")]
    Transient(String),
    #[error("retry later: {0}")]
    RetryLater(String),
}

/// The six operations a back end must implement (spec.md §4.8).
#[async_trait]
pub trait Provider: Send + Sync {
    async fn create_account(&self, ctx: &AccountContext) -> Result<AccountOutcome, ProviderError>;
    async fn update_account(&self, ctx: &AccountContext) -> Result<AccountOutcome, ProviderError>;
    async fn import_account(&self, ctx: &AccountContext) -> Result<AccountOutcome, ProviderError>;
    async fn delete_account(&self, ctx: &AccountContext) -> Result<(), ProviderError>;
    async fn create_or_update_user(&self, ctx: &UserContext) -> Result<UserOutcome, ProviderError>;
    async fn delete_user(&self, ctx: &UserContext) -> Result<(), ProviderError>;
}

/// Declares whether a back end needs a periodic resync even absent a spec
/// change (true for hosted, to keep local state in sync with the remote
/// account; false for native, which is push-only).
pub trait ProviderFactory: Send + Sync {
    fn requires_periodic_sync(&self) -> bool;
    fn build(&self, config: Option<serde_json::Value>) -> Arc<dyn Provider>;
}

type ConfigFuture = Pin<Box<dyn Future<Output = anyhow::Result<Option<serde_json::Value>>> + Send>>;
pub type ConfigFetcher = Arc<dyn Fn(String, String) -> ConfigFuture + Send + Sync>;

struct Registration {
    factory: Arc<dyn ProviderFactory>,
    fetch_config: ConfigFetcher,
}

/// Maps `clusterKind -> (factory, configFetcher)`; resolves an `Account`'s
/// provider by its `natsClusterRef`, an environment default, or legacy
/// native mode (spec.md §4.8).
pub struct Resolver {
    registrations: HashMap<String, Registration>,
    /// The clusterKind used for legacy native mode (nil config), e.g. `"NatsCluster"`.
    legacy_kind: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("no provider factory registered for cluster kind {0:?}")]
    UnknownKind(String),
    #[error("cluster config {0}/{1} not found")]
    ConfigNotFound(String, String),
    #[error(transparent)]
    InvalidClusterRef(#[from] nauth_types::cluster_ref::ClusterRefError),
    #[error(transparent)]
    ConfigFetch(#[from] anyhow::Error),
}

impl Resolver {
    pub fn new(legacy_kind: impl Into<String>) -> Self {
        Self {
            registrations: HashMap::new(),
            legacy_kind: legacy_kind.into(),
        }
    }

    /// Registers a factory for `kind`. Panics on duplicate registration to
    /// prevent silent misconfiguration (spec.md §4.8).
    pub fn register_factory(
        &mut self,
        kind: impl Into<String>,
        factory: Arc<dyn ProviderFactory>,
        fetch_config: ConfigFetcher,
    ) {
        let kind = kind.into();
        if self.registrations.contains_key(&kind) {
            panic!("duplicate provider factory registered for cluster kind {kind:?}");
        }
        self.registrations.insert(kind, Registration { factory, fetch_config });
    }

    /// `ResolveForAccount` precedence (spec.md §4.8):
    /// 1. `account.spec.natsClusterRef`;
    /// 2. `DEFAULT_CLUSTER_REF` environment default (`[namespace/]name` form);
    /// 3. nil config (legacy native mode).
    pub async fn resolve_for_account(
        &self,
        cluster_ref: Option<&ClusterRef>,
        account_namespace: &str,
        default_cluster_ref_env: Option<&str>,
    ) -> Result<(Arc<dyn Provider>, bool), ResolverError> {
        if let Some(cluster_ref) = cluster_ref {
            let namespace = cluster_ref.namespace.as_deref().unwrap_or(account_namespace);
            return self.resolve_kind(&cluster_ref.kind, namespace, &cluster_ref.name).await;
        }

        if let Some(reference) = default_cluster_ref_env {
            let (namespace, name) = parse_cluster_reference(reference, account_namespace)?;
            return self.resolve_kind(&self.legacy_kind, &namespace, &name).await;
        }

        let registration = self
            .registrations
            .get(&self.legacy_kind)
            .ok_or_else(|| ResolverError::UnknownKind(self.legacy_kind.clone()))?;
        let provider = registration.factory.build(None);
        let sync = registration.factory.requires_periodic_sync();
        Ok((provider, sync))
    }

    async fn resolve_kind(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<(Arc<dyn Provider>, bool), ResolverError> {
        let registration = self
            .registrations
            .get(kind)
            .ok_or_else(|| ResolverError::UnknownKind(kind.to_string()))?;
        let config = (registration.fetch_config)(namespace.to_string(), name.to_string()).await?;
        let config = config.ok_or_else(|| {
            ResolverError::ConfigNotFound(namespace.to_string(), name.to_string())
        })?;
        tracing::debug!(kind, namespace, name, "resolved cluster config");
        let provider = registration.factory.build(Some(config));
        let sync = registration.factory.requires_periodic_sync();
        Ok((provider, sync))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubFactory {
        periodic_sync: bool,
    }

    struct StubProvider;

    #[async_trait]
    impl Provider for StubProvider {
        async fn create_account(&self, _ctx: &AccountContext) -> Result<AccountOutcome, ProviderError> {
            unimplemented!()
        }
        async fn update_account(&self, _ctx: &AccountContext) -> Result<AccountOutcome, ProviderError> {
            unimplemented!()
        }
        async fn import_account(&self, _ctx: &AccountContext) -> Result<AccountOutcome, ProviderError> {
            unimplemented!()
        }
        async fn delete_account(&self, _ctx: &AccountContext) -> Result<(), ProviderError> {
            unimplemented!()
        }
        async fn create_or_update_user(&self, _ctx: &UserContext) -> Result<UserOutcome, ProviderError> {
            unimplemented!()
        }
        async fn delete_user(&self, _ctx: &UserContext) -> Result<(), ProviderError> {
            unimplemented!()
        }
    }

    impl ProviderFactory for StubFactory {
        fn requires_periodic_sync(&self) -> bool {
            self.periodic_sync
        }
        fn build(&self, _config: Option<serde_json::Value>) -> Arc<dyn Provider> {
            Arc::new(StubProvider)
        }
    }

    fn no_config_fetcher() -> ConfigFetcher {
        Arc::new(|_ns, _name| Box::pin(async { Ok(Some(serde_json::json!({}))) }))
    }

    #[test]
    #[should_panic(expected = "duplicate provider factory registered")]
    fn duplicate_registration_panics() {
        let mut resolver = Resolver::new("NatsCluster");
        resolver.register_factory("NatsCluster", Arc::new(StubFactory { periodic_sync: false }), no_config_fetcher());
        resolver.register_factory("NatsCluster", Arc::new(StubFactory { periodic_sync: false }), no_config_fetcher());
    }

    #[tokio::test]
    async fn nil_cluster_ref_resolves_legacy_native() {
        let mut resolver = Resolver::new("NatsCluster");
        resolver.register_factory("NatsCluster", Arc::new(StubFactory { periodic_sync: false }), no_config_fetcher());
        let (_, periodic_sync) = resolver.resolve_for_account(None, "ns", None).await.unwrap();
        assert!(!periodic_sync);
    }

    #[tokio::test]
    async fn env_default_resolves_against_legacy_kind() {
        let mut resolver = Resolver::new("NatsCluster");
        resolver.register_factory("NatsCluster", Arc::new(StubFactory { periodic_sync: false }), no_config_fetcher());
        let (_, periodic_sync) = resolver
            .resolve_for_account(None, "ns", Some("my-cluster"))
            .await
            .unwrap();
        assert!(!periodic_sync);
    }

    #[tokio::test]
    async fn explicit_cluster_ref_takes_precedence_over_env() {
        let mut resolver = Resolver::new("NatsCluster");
        resolver.register_factory("System", Arc::new(StubFactory { periodic_sync: true }), no_config_fetcher());
        let cluster_ref = ClusterRef {
            api_version: None,
            kind: "System".into(),
            name: "explicit".into(),
            namespace: None,
        };
        let (_, periodic_sync) = resolver
            .resolve_for_account(Some(&cluster_ref), "ns", Some("my-cluster"))
            .await
            .unwrap();
        assert!(periodic_sync);
    }
}
