//! `ConfigFetcher` builders (spec.md §4.8) resolving a `NatsCluster` or
//! `System` cluster reference into the typed JSON config each provider
//! factory expects.

use std::sync::Arc;

use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::Value;

use nauth_hosted::{HostedClient, StaticToken};
use nauth_provider::ConfigFetcher;
use nauth_secrets::{secret_value, SecretStore};
use nauth_types::nats_cluster::{NatsCluster, ValueFromRef};
use nauth_types::system::System;

const FIELD_MANAGER: &str = "nauth-controller";

/// Resolves a `ValueFromRef`, defaulting its namespace to `default_namespace`
/// and its key to `SECRET_KEY_DEFAULT` (spec.md §6).
async fn resolve_value(
    secrets: &SecretStore,
    default_namespace: &str,
    r: &ValueFromRef,
) -> anyhow::Result<String> {
    let namespace = r.namespace.as_deref().unwrap_or(default_namespace);
    let secret = secrets
        .get(namespace, &r.name)
        .await?
        .ok_or_else(|| anyhow::anyhow!("secret {namespace}/{} not found", r.name))?;
    let key = nauth_types::labels::secret_key_or_default(&r.key);
    secret_value(&secret, key)
        .ok_or_else(|| anyhow::anyhow!("secret {namespace}/{} has no key {key:?}", r.name))
}

/// `ConfigFetcher` for the native back end's `"NatsCluster"` kind: resolves
/// the cluster's NATS URL and system-account creds into the JSON shape
/// `NativeClusterConfig` deserializes (spec.md §3 "NatsCluster").
pub fn nats_cluster_config_fetcher(client: Client, secrets: Arc<SecretStore>) -> ConfigFetcher {
    Arc::new(move |namespace: String, name: String| {
        let client = client.clone();
        let secrets = secrets.clone();
        Box::pin(async move {
            let api: Api<NatsCluster> = Api::namespaced(client, &namespace);
            let cluster = match api.get_opt(&name).await? {
                Some(c) => c,
                None => return Ok(None),
            };
            cluster.spec.validate().map_err(|e| anyhow::anyhow!(e))?;

            let url = match (&cluster.spec.url, &cluster.spec.url_from) {
                (Some(url), None) => url.clone(),
                (None, Some(r)) => resolve_value(&secrets, &namespace, r).await?,
                _ => unreachable!("validated above"),
            };
            let system_account_creds = match &cluster.spec.system_account_user_creds_secret_ref {
                Some(r) => resolve_value(&secrets, &namespace, r).await?,
                None => anyhow::bail!(
                    "NatsCluster {namespace}/{name} has no systemAccountUserCredsSecretRef"
                ),
            };
            let operator_namespace = cluster
                .spec
                .operator_signing_key_secret_ref
                .as_ref()
                .and_then(|r| r.namespace.clone());

            Ok(Some(serde_json::json!({
                "url": url,
                "systemAccountCreds": system_account_creds,
                "operatorNamespace": operator_namespace,
            })))
        })
    })
}

/// `ConfigFetcher` for the hosted back end's `"System"` kind. Resolves
/// `teamId`/`apiCredentialsSecretRef`, then — if `status.systemId` is not
/// yet populated — lists the team's systems and matches `systemSelector.name`
/// (spec.md §4.7 step 1, §6 hosted REST surface), patching the match back
/// onto status best-effort so later resolves skip the list call.
pub fn system_config_fetcher(client: Client, secrets: Arc<SecretStore>) -> ConfigFetcher {
    Arc::new(move |namespace: String, name: String| {
        let client = client.clone();
        let secrets = secrets.clone();
        Box::pin(async move {
            let api: Api<System> = Api::namespaced(client, &namespace);
            let system = match api.get_opt(&name).await? {
                Some(s) => s,
                None => return Ok(None),
            };
            system.spec.validate().map_err(|e| anyhow::anyhow!(e))?;

            let team_id = match (&system.spec.team_id, &system.spec.team_id_from) {
                (Some(id), None) => id.clone(),
                (None, Some(r)) => resolve_value(&secrets, &namespace, r).await?,
                _ => unreachable!("validated above"),
            };
            let token = resolve_value(&secrets, &namespace, &system.spec.api_credentials_secret_ref).await?;

            let system_id = match system.status.as_ref().and_then(|s| s.system_id.clone()) {
                Some(id) => id,
                None => {
                    let http = HostedClient::new(system.spec.api_endpoint.clone(), Box::new(StaticToken(token.clone())))?;
                    let systems = http.list_systems(&team_id).await?;
                    let matched = systems
                        .iter()
                        .find(|s| s.get("name").and_then(Value::as_str) == Some(system.spec.system_selector.name.as_str()))
                        .ok_or_else(|| {
                            anyhow::anyhow!(
                                "no system named {:?} in team {team_id}",
                                system.spec.system_selector.name
                            )
                        })?;
                    let id = matched
                        .get("id")
                        .and_then(Value::as_str)
                        .ok_or_else(|| anyhow::anyhow!("system selector match has no id"))?
                        .to_string();

                    let status_patch = serde_json::json!({ "status": { "systemId": id } });
                    if let Err(e) = api
                        .patch_status(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(&status_patch))
                        .await
                    {
                        tracing::warn!(namespace, name, error = %e, "failed to persist resolved systemId");
                    }
                    id
                }
            };

            Ok(Some(serde_json::json!({
                "systemId": system_id,
                "apiEndpoint": system.spec.api_endpoint,
                "token": token,
            })))
        })
    })
}
