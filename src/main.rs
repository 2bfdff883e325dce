use std::path::Path;

use clap::Parser;
use kube::Client;
use nauth_controller::Settings;
use nauth_types::labels::SECRET_KEY_DEFAULT;

/// Path Kubernetes mounts a pod's own namespace at when running in-cluster
/// (spec.md §9 "falling back to a service-account-mounted namespace file").
const SERVICE_ACCOUNT_NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

#[derive(Parser, Debug)]
#[command(name = "nauth", about = "Declarative credential-management control plane for a NATS messaging fleet")]
struct Args {
    /// Namespace the controller's own secrets (operator signing key,
    /// system-account user creds) live in; falls back to the pod's own
    /// namespace when unset.
    #[arg(long, env = "CONTROLLER_NAMESPACE")]
    controller_namespace: Option<String>,

    /// Legacy default NATS server URL, used when an `Account` resolves to
    /// the legacy native cluster kind with no explicit `NatsCluster` ref.
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    nats_url: String,

    /// `[namespace/]name` fallback cluster reference (spec.md §4.8).
    #[arg(long, env = "DEFAULT_CLUSTER_REF")]
    default_cluster_ref: Option<String>,

    /// Written to `status.operatorVersion`; bump on release to force one
    /// re-reconcile of every object even with an unchanged generation.
    #[arg(long, env = "OPERATOR_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    operator_version: String,
}

fn controller_namespace(arg: Option<String>) -> anyhow::Result<String> {
    if let Some(ns) = arg {
        return Ok(ns);
    }
    std::fs::read_to_string(Path::new(SERVICE_ACCOUNT_NAMESPACE_FILE))
        .map(|s| s.trim().to_string())
        .map_err(|e| anyhow::anyhow!("CONTROLLER_NAMESPACE unset and {SERVICE_ACCOUNT_NAMESPACE_FILE} unreadable: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let controller_namespace = controller_namespace(args.controller_namespace)?;

    let client = Client::try_default().await?;
    let secrets = nauth_secrets::SecretStore::new(client.clone());
    let system_account_creds =
        nauth_native::keystore::system_account_user_creds(&secrets, &controller_namespace, SECRET_KEY_DEFAULT).await?;

    tracing::info!(namespace = %controller_namespace, "starting nauth-controller");

    nauth_controller::run(
        client,
        Settings {
            controller_namespace,
            nats_url: args.nats_url,
            system_account_creds,
            default_cluster_ref: args.default_cluster_ref,
            operator_version: args.operator_version,
        },
    )
    .await
}
