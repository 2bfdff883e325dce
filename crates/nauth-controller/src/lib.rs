//! Account/User reconcile drivers (spec.md §4.9), wiring the provider
//! resolver (`nauth-provider`) to `kube-rs` controllers for both CRDs.

pub mod account;
pub mod config;
pub mod context;
pub mod error;
pub mod user;

use std::sync::Arc;

use kube::runtime::events::Reporter;
use kube::Client;

use nauth_native::{AsyncNatsPublisher, NativeProviderFactory};
use nauth_provider::Resolver;
use nauth_secrets::SecretStore;

pub use context::Context;
pub use error::Error;

/// Knobs read from the environment at startup (spec.md §6 "Environment variables").
pub struct Settings {
    pub controller_namespace: String,
    pub nats_url: String,
    pub system_account_creds: String,
    pub default_cluster_ref: Option<String>,
    pub operator_version: String,
}

/// Builds the resolver (native legacy default + `NatsCluster`/`System`
/// cluster-kind registrations) and runs the Account and User controllers
/// concurrently until either exits (spec.md §5 "distinct kinds... run
/// concurrently").
pub async fn run(client: Client, settings: Settings) -> anyhow::Result<()> {
    let secrets = Arc::new(SecretStore::new(client.clone()));
    let default_publisher = Arc::new(AsyncNatsPublisher::new(settings.nats_url, settings.system_account_creds));

    let native_factory = Arc::new(NativeProviderFactory {
        client: client.clone(),
        secrets: secrets.clone(),
        publisher: default_publisher,
        controller_namespace: settings.controller_namespace,
    });
    let hosted_factory = Arc::new(nauth_hosted::HostedProviderFactory {
        client: client.clone(),
        secrets: secrets.clone(),
    });

    let mut resolver = Resolver::new("NatsCluster");
    resolver.register_factory(
        "NatsCluster",
        native_factory,
        config::nats_cluster_config_fetcher(client.clone(), secrets.clone()),
    );
    resolver.register_factory(
        "System",
        hosted_factory,
        config::system_config_fetcher(client.clone(), secrets.clone()),
    );

    let reporter: Reporter = "nauth-controller".into();
    let ctx = Context::new(client.clone(), resolver, reporter, settings.default_cluster_ref, settings.operator_version);

    tokio::join!(account::run(client.clone(), ctx.clone()), user::run(client, ctx));
    Ok(())
}
