//! Adapts the native account/user engines to the `Provider` trait (spec.md
//! §4.8) so the resolver can dispatch legacy/native-kind accounts the same
//! way it dispatches hosted ones.

use std::sync::Arc;

use async_trait::async_trait;
use kube::Client;
use nauth_provider::{AccountContext, AccountOutcome, Provider, ProviderError, ProviderFactory, UserContext, UserOutcome};
use nauth_secrets::{Owner, SecretStore};
use serde::Deserialize;
use serde_json::Value;

use crate::account::NativeAccountEngine;
use crate::error::NativeError;
use crate::keystore;
use crate::publisher::{AsyncNatsPublisher, NatsPublisher};
use crate::user::NativeUserEngine;

/// A resolved `NatsCluster` record (spec.md §3), used to build a
/// cluster-specific publisher instead of the legacy default one.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeClusterConfig {
    pub url: String,
    pub system_account_creds: String,
    /// Namespace the operator signing key secret lives in; defaults to the
    /// factory's controller namespace when absent.
    #[serde(default)]
    pub operator_namespace: Option<String>,
}

impl From<NativeError> for ProviderError {
    fn from(err: NativeError) -> Self {
        match err {
            NativeError::RetryLater(msg) => ProviderError::RetryLater(msg),
            NativeError::DependentUsersExist(id, n) => {
                ProviderError::Conflict(format!("account {id} still has {n} dependent users"))
            }
            NativeError::KeyMismatch | NativeError::AmbiguousKeySelection { .. } => {
                ProviderError::Fatal(err.to_string())
            }
            other => ProviderError::Transient(other.to_string()),
        }
    }
}

pub struct NativeProviderFactory {
    pub client: Client,
    pub secrets: Arc<SecretStore>,
    pub publisher: Arc<dyn NatsPublisher>,
    /// Namespace the operator signing key secret is looked up in (spec.md
    /// §4.3 step 1 "controller namespace (configurable)").
    pub controller_namespace: String,
}

impl ProviderFactory for NativeProviderFactory {
    fn requires_periodic_sync(&self) -> bool {
        false
    }

    fn build(&self, config: Option<Value>) -> Arc<dyn Provider> {
        match config {
            Some(value) => {
                let cfg: NativeClusterConfig =
                    serde_json::from_value(value).expect("invalid native cluster config");
                let publisher: Arc<dyn NatsPublisher> =
                    Arc::new(AsyncNatsPublisher::new(cfg.url, cfg.system_account_creds));
                Arc::new(NativeProvider {
                    client: self.client.clone(),
                    secrets: self.secrets.clone(),
                    publisher,
                    controller_namespace: cfg.operator_namespace.unwrap_or_else(|| self.controller_namespace.clone()),
                })
            }
            None => Arc::new(NativeProvider {
                client: self.client.clone(),
                secrets: self.secrets.clone(),
                publisher: self.publisher.clone(),
                controller_namespace: self.controller_namespace.clone(),
            }),
        }
    }
}

pub struct NativeProvider {
    client: Client,
    secrets: Arc<SecretStore>,
    publisher: Arc<dyn NatsPublisher>,
    controller_namespace: String,
}

impl NativeProvider {
    async fn operator(&self) -> Result<nkeys::KeyPair, ProviderError> {
        keystore::operator_signing_key(self.secrets.as_ref(), &self.controller_namespace, "")
            .await
            .map_err(ProviderError::from)
    }

    fn account_engine(&self) -> NativeAccountEngine<'_> {
        NativeAccountEngine {
            store: self.secrets.as_ref(),
            publisher: self.publisher.as_ref(),
            client: self.client.clone(),
        }
    }

    fn user_engine(&self) -> NativeUserEngine<'_> {
        NativeUserEngine {
            store: self.secrets.as_ref(),
            publisher: self.publisher.as_ref(),
            client: self.client.clone(),
        }
    }

    fn account_owner(ctx: &AccountContext) -> Owner {
        Owner {
            api_version: "nauth.io/v1alpha1".into(),
            kind: "Account".into(),
            name: ctx.account_name.clone(),
            uid: ctx.owner_uid.clone(),
        }
    }

    fn user_owner(ctx: &UserContext) -> Owner {
        Owner {
            api_version: "nauth.io/v1alpha1".into(),
            kind: "User".into(),
            name: ctx.user_name.clone(),
            uid: ctx.owner_uid.clone(),
        }
    }
}

#[async_trait]
impl Provider for NativeProvider {
    async fn create_account(&self, ctx: &AccountContext) -> Result<AccountOutcome, ProviderError> {
        let operator = self.operator().await?;
        let owner = Self::account_owner(ctx);
        let result = self
            .account_engine()
            .create(&ctx.namespace, &ctx.account_name, &ctx.spec, &owner, &operator)
            .await?;

        Ok(AccountOutcome {
            account_id: result.account_id,
            account_signed_by: result.account_signed_by,
            claims: serde_json::to_value(&result.claims).unwrap_or(Value::Null),
            requeue_after: None,
            account_nkey_rotated: false,
        })
    }

    async fn update_account(&self, ctx: &AccountContext) -> Result<AccountOutcome, ProviderError> {
        let account_id = ctx
            .account_id
            .as_deref()
            .ok_or_else(|| ProviderError::Fatal("account has no account-id".into()))?;
        let operator = self.operator().await?;
        let result = self
            .account_engine()
            .update(&ctx.namespace, &ctx.account_name, account_id, &ctx.spec, &operator)
            .await?;

        let nkey_rotated = ctx
            .account_signed_by
            .as_deref()
            .is_some_and(|signed_by| signed_by != result.account_signed_by);

        Ok(AccountOutcome {
            account_id: result.account_id,
            account_signed_by: result.account_signed_by,
            claims: serde_json::to_value(&result.claims).unwrap_or(Value::Null),
            requeue_after: None,
            account_nkey_rotated: nkey_rotated,
        })
    }

    async fn import_account(&self, ctx: &AccountContext) -> Result<AccountOutcome, ProviderError> {
        let account_id = ctx
            .account_id
            .as_deref()
            .ok_or_else(|| ProviderError::Fatal("observe mode requires an existing account-id".into()))?;
        let (_, claims) = self
            .account_engine()
            .import(&ctx.namespace, &ctx.account_name, account_id)
            .await?;

        Ok(AccountOutcome {
            account_id: account_id.to_string(),
            account_signed_by: claims.iss.clone(),
            claims: serde_json::to_value(&claims).unwrap_or(Value::Null),
            requeue_after: None,
            account_nkey_rotated: false,
        })
    }

    async fn delete_account(&self, ctx: &AccountContext) -> Result<(), ProviderError> {
        let account_id = ctx
            .account_id
            .as_deref()
            .ok_or_else(|| ProviderError::Fatal("account has no account-id".into()))?;
        let operator = self.operator().await?;
        self.account_engine()
            .delete(&ctx.namespace, account_id, ctx.observe_policy, &operator)
            .await?;
        Ok(())
    }

    async fn create_or_update_user(&self, ctx: &UserContext) -> Result<UserOutcome, ProviderError> {
        let operator = self.operator().await?;
        let owner = Self::user_owner(ctx);
        let result = self
            .user_engine()
            .create_or_update(&ctx.namespace, &ctx.user_name, &ctx.spec, &owner, &operator)
            .await?;

        Ok(UserOutcome {
            user_id: result.user_id,
            user_account_id: result.user_account_id,
            user_signed_by: result.user_signed_by,
            requeue_after: None,
        })
    }

    async fn delete_user(&self, ctx: &UserContext) -> Result<(), ProviderError> {
        let operator = self.operator().await?;
        let user_id = ctx.user_id.as_deref().unwrap_or_default();
        let account_id = ctx
            .account_id
            .as_deref()
            .ok_or_else(|| ProviderError::RetryLater(format!("user {} has no account-id label", ctx.user_name)))?;
        self.user_engine()
            .delete(
                &ctx.namespace,
                &ctx.user_name,
                &ctx.spec.account_name,
                account_id,
                user_id,
                ctx.spec.use_signing_key,
                &operator,
            )
            .await?;
        Ok(())
    }
}
