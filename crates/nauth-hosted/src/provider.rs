//! Hosted provider (spec.md §4.7): idempotent create-or-update, observe
//! mode, drift detection, tiered-limit arbitration, nkey-rotation
//! detection, JetStream-resource deletion guard.

use std::sync::Arc;

use async_trait::async_trait;
use kube::Api;
use serde::Deserialize;
use serde_json::Value;

use nauth_claims::hosted::{jwt_settings_dto, limits_equal, user_jwt_settings_dto, JwtSettingsDto};
use nauth_provider::{AccountContext, AccountOutcome, Provider, ProviderError, ProviderFactory, UserContext, UserOutcome};
use nauth_secrets::{Owner, SecretStore};
use nauth_types::labels::{secret_type, LABEL_MANAGED, LABEL_SECRET_TYPE, SECRET_KEY_USER_CREDS};
use nauth_types::tiered_limit::TieredLimit;

use crate::arbitration::select_for_account;
use crate::client::{HostedClient, StaticToken};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedClusterConfig {
    pub system_id: Option<String>,
    pub api_endpoint: String,
    pub token: String,
}

pub struct HostedProviderFactory {
    pub client: kube::Client,
    pub secrets: Arc<SecretStore>,
}

impl ProviderFactory for HostedProviderFactory {
    fn requires_periodic_sync(&self) -> bool {
        true
    }

    fn build(&self, config: Option<Value>) -> Arc<dyn Provider> {
        let config: HostedClusterConfig = config
            .and_then(|v| serde_json::from_value(v).ok())
            .expect("hosted provider requires a resolved System cluster config");
        let http = HostedClient::new(config.api_endpoint, Box::new(StaticToken(config.token)))
            .expect("failed to construct hosted HTTP client");
        Arc::new(HostedProvider {
            http,
            client: self.client.clone(),
            secrets: self.secrets.clone(),
            system_id: config.system_id,
        })
    }
}

pub struct HostedProvider {
    http: HostedClient,
    client: kube::Client,
    secrets: Arc<SecretStore>,
    system_id: Option<String>,
}

impl HostedProvider {
    fn tiered_limits_api(&self, namespace: &str) -> Api<TieredLimit> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn selected_tiers(&self, ctx: &AccountContext) -> Result<(Option<nauth_types::tiered_limit::Tier>, Option<nauth_types::tiered_limit::Tier>), ProviderError> {
        let api = self.tiered_limits_api(&ctx.namespace);
        let selected = select_for_account(&api, &ctx.account_name, &ctx.namespace)
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        Ok(match selected {
            Some(tl) => (tl.spec.r1, tl.spec.r3),
            None => (None, None),
        })
    }

    fn desired_settings(&self, ctx: &AccountContext, r1: Option<&nauth_types::tiered_limit::Tier>, r3: Option<&nauth_types::tiered_limit::Tier>) -> JwtSettingsDto {
        jwt_settings_dto(&ctx.spec.nats_limits, &ctx.spec.account_limits, &ctx.spec.jet_stream_limits, r1, r3)
    }
}

#[async_trait]
impl Provider for HostedProvider {
    async fn create_account(&self, ctx: &AccountContext) -> Result<AccountOutcome, ProviderError> {
        let system_id = self
            .system_id
            .as_deref()
            .ok_or_else(|| ProviderError::Fatal("system.status.systemId is not set".into()))?;

        let (r1, r3) = self.selected_tiers(ctx).await?;
        let jwt_settings = self.desired_settings(ctx, r1.as_ref(), r3.as_ref());
        let display_name = ctx
            .spec
            .display_name
            .clone()
            .unwrap_or_else(|| format!("{}/{}", ctx.namespace, ctx.account_name));

        let body = serde_json::json!({
            "name": display_name,
            "jwt_settings": jwt_settings,
        });
        let created = self
            .http
            .create_account(system_id, &body)
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        tracing::info!(namespace = %ctx.namespace, account = %ctx.account_name, system_id, "created hosted account");

        let account_id = created
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Transient("create account response missing id".into()))?
            .to_string();
        let account_public_key = created
            .get("account_public_key")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(AccountOutcome {
            account_id,
            account_signed_by: account_public_key,
            claims: created,
            requeue_after: Some(ctx.reconcile_interval),
            account_nkey_rotated: false,
        })
    }

    async fn update_account(&self, ctx: &AccountContext) -> Result<AccountOutcome, ProviderError> {
        let account_id = ctx
            .account_id
            .as_deref()
            .ok_or_else(|| ProviderError::Fatal("account has no account-id".into()))?;

        let remote = self
            .http
            .get_account(account_id)
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let (r1, r3) = self.selected_tiers(ctx).await?;
        let desired = self.desired_settings(ctx, r1.as_ref(), r3.as_ref());
        let remote_settings: JwtSettingsDto = remote
            .get("jwt_settings")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let final_state = if !limits_equal(&remote_settings, &desired) {
            tracing::info!(account_id, "hosted account limits drifted, patching");
            let body = serde_json::json!({ "jwt_settings": desired });
            self.http
                .patch_account(account_id, &body)
                .await
                .map_err(|e| ProviderError::Transient(e.to_string()))?
        } else {
            remote
        };

        let account_public_key = final_state
            .get("account_public_key")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let nkey_rotated = ctx
            .account_signed_by
            .as_deref()
            .is_some_and(|signed_by| !account_public_key.is_empty() && signed_by != account_public_key);
        if nkey_rotated {
            tracing::warn!(account_id, "hosted account public key no longer matches stored signed-by label");
        }

        Ok(AccountOutcome {
            account_id: account_id.to_string(),
            account_signed_by: account_public_key,
            claims: final_state,
            requeue_after: Some(ctx.reconcile_interval),
            account_nkey_rotated: nkey_rotated,
        })
    }

    async fn import_account(&self, ctx: &AccountContext) -> Result<AccountOutcome, ProviderError> {
        let account_id = ctx
            .account_id
            .as_deref()
            .ok_or_else(|| ProviderError::Fatal("observe mode requires an existing account-id".into()))?;
        let remote = self
            .http
            .get_account(account_id)
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        let account_public_key = remote
            .get("account_public_key")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(AccountOutcome {
            account_id: account_id.to_string(),
            account_signed_by: account_public_key,
            claims: remote,
            requeue_after: Some(ctx.reconcile_interval),
            account_nkey_rotated: false,
        })
    }

    /// Deletion guard: lists streams, KV buckets, and object buckets under
    /// the account; if any exist, fails listing them as `stream/NAME`,
    /// `kv/NAME`, `object/NAME` (spec.md §4.7 "Delete account (guarded)").
    async fn delete_account(&self, ctx: &AccountContext) -> Result<(), ProviderError> {
        let account_id = ctx
            .account_id
            .as_deref()
            .ok_or_else(|| ProviderError::Fatal("account has no account-id".into()))?;

        if ctx.observe_policy {
            return Ok(());
        }

        let mut existing = Vec::new();
        for (prefix, items) in [
            ("stream", self.http.list_streams(account_id).await),
            ("kv", self.http.list_kv_buckets(account_id).await),
            ("object", self.http.list_object_buckets(account_id).await),
        ] {
            let items = items.map_err(|e| ProviderError::Transient(e.to_string()))?;
            for item in items {
                let name = item.get("name").and_then(Value::as_str).unwrap_or("unknown").to_string();
                existing.push(format!("{prefix}/{name}"));
            }
        }

        if !existing.is_empty() {
            return Err(ProviderError::Conflict(format!(
                "JetStream resources still exist: {}",
                existing.join(", ")
            )));
        }

        self.http
            .delete_account(account_id)
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))
    }

    async fn create_or_update_user(&self, ctx: &UserContext) -> Result<UserOutcome, ProviderError> {
        let account_id = self.resolve_account_id(&ctx.namespace, &ctx.spec.account_name).await?;
        let jwt_settings = user_jwt_settings_dto(&ctx.spec);

        let (user_id, signed_by) = match &ctx.user_id {
            None => {
                let sk_groups = self
                    .http
                    .list_sk_groups(&account_id)
                    .await
                    .map_err(|e| ProviderError::Transient(e.to_string()))?;
                let sk_group_id = sk_groups
                    .iter()
                    .find(|g| g.get("name").and_then(Value::as_str) == Some("Default"))
                    .or_else(|| sk_groups.first())
                    .and_then(|g| g.get("id").and_then(Value::as_str))
                    .ok_or_else(|| ProviderError::Fatal("account has no signing-key groups".into()))?
                    .to_string();

                let display_name = ctx.spec.display_name.clone().unwrap_or_else(|| ctx.user_name.clone());
                let body = serde_json::json!({
                    "name": display_name,
                    "sk_group_id": sk_group_id,
                    "jwt_settings": jwt_settings,
                });
                let created = self
                    .http
                    .create_user(&account_id, &body)
                    .await
                    .map_err(|e| ProviderError::Transient(e.to_string()))?;
                let id = created
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ProviderError::Transient("create user response missing id".into()))?
                    .to_string();
                let public_key = created.get("public_key").and_then(Value::as_str).unwrap_or_default().to_string();
                (id, public_key)
            }
            Some(id) => {
                let _ = self
                    .http
                    .get_user(id)
                    .await
                    .map_err(|e| ProviderError::Transient(e.to_string()))?;
                let body = serde_json::json!({ "jwt_settings": jwt_settings });
                let patched = self
                    .http
                    .patch_user(id, &body)
                    .await
                    .map_err(|e| ProviderError::Transient(e.to_string()))?;
                let public_key = patched.get("public_key").and_then(Value::as_str).unwrap_or_default().to_string();
                (id.clone(), public_key)
            }
        };

        let creds = self
            .http
            .fetch_user_creds(&user_id)
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let mut labels = std::collections::BTreeMap::new();
        labels.insert(LABEL_SECRET_TYPE.to_string(), secret_type::USER_CREDS.to_string());
        labels.insert(LABEL_MANAGED.to_string(), "true".to_string());
        let mut data = std::collections::BTreeMap::new();
        data.insert(SECRET_KEY_USER_CREDS.to_string(), creds);

        let owner = Owner {
            api_version: "nauth.io/v1alpha1".into(),
            kind: "User".into(),
            name: ctx.user_name.clone(),
            uid: ctx.owner_uid.clone(),
        };
        let secret_name = format!("{}-creds", ctx.user_name);
        self.secrets
            .apply(&ctx.namespace, &secret_name, labels, data, Some(&owner))
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        Ok(UserOutcome {
            user_id,
            user_account_id: account_id,
            user_signed_by: signed_by,
            requeue_after: None,
        })
    }

    async fn delete_user(&self, ctx: &UserContext) -> Result<(), ProviderError> {
        if let Some(user_id) = &ctx.user_id {
            self.http
                .delete_user(user_id)
                .await
                .map_err(|e| ProviderError::Transient(e.to_string()))?;
        }
        let secret_name = format!("{}-creds", ctx.user_name);
        self.secrets
            .delete(&ctx.namespace, &secret_name)
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        Ok(())
    }
}

impl HostedProvider {
    async fn resolve_account_id(&self, namespace: &str, account_name: &str) -> Result<String, ProviderError> {
        let api: Api<nauth_types::account::Account> = Api::namespaced(self.client.clone(), namespace);
        let account = api
            .get(account_name)
            .await
            .map_err(|e| ProviderError::Fatal(format!("account {account_name} not found: {e}")))?;
        account
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(nauth_types::labels::LABEL_ACCOUNT_ID))
            .cloned()
            .ok_or_else(|| ProviderError::Fatal(format!("account {account_name} has no account-id label")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_config_deserializes_with_absent_system_id() {
        let raw = serde_json::json!({
            "apiEndpoint": "https://api.synadia.io",
            "token": "secret-token",
        });
        let config: HostedClusterConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(config.system_id, None);
        assert_eq!(config.api_endpoint, "https://api.synadia.io");
    }

    #[test]
    fn cluster_config_deserializes_with_system_id() {
        let raw = serde_json::json!({
            "systemId": "sys-123",
            "apiEndpoint": "https://api.synadia.io",
            "token": "secret-token",
        });
        let config: HostedClusterConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(config.system_id.as_deref(), Some("sys-123"));
    }
}
