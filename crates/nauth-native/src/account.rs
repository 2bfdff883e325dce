//! Native account engine (spec.md §4.4): create/update/import/delete of a
//! native NKey+JWT account.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use nats_jwt_rs::Claims;
use nkeys::KeyPair;

use nauth_claims::native::{
    build_account_claims, decode_account_claims, project_account, sign_account_claims,
    AccountClaimsBody,
};
use nauth_secrets::{Owner, SecretStore};
use nauth_types::account::{Account, AccountSpec, ImportAccountRef};
use nauth_types::labels::{
    secret_type, LABEL_ACCOUNT_ID, LABEL_ACCOUNT_NAME, LABEL_MANAGED, LABEL_SECRET_TYPE,
    LABEL_USER_ACCOUNT_ID,
};

use crate::error::NativeError;
use crate::keystore::{self, AccountKeyPair};
use crate::publisher::NatsPublisher;

pub struct NativeAccountEngine<'a> {
    pub store: &'a SecretStore,
    pub publisher: &'a dyn NatsPublisher,
    pub client: Client,
}

pub struct AccountResult {
    pub account_id: String,
    pub account_signed_by: String,
    pub claims: Claims<AccountClaimsBody>,
}

impl<'a> NativeAccountEngine<'a> {
    fn accounts_api(&self, namespace: &str) -> Api<Account> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Resolves an [`ImportAccountRef`] to the referenced account's
    /// `account-id` label (spec.md §4.4 step 2).
    async fn resolve_import_account_id(
        &self,
        namespace: &str,
        import_ref: &ImportAccountRef,
    ) -> Option<String> {
        let ns = import_ref.namespace.as_deref().unwrap_or(namespace);
        let account = self.accounts_api(ns).get(&import_ref.name).await.ok()?;
        account
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(LABEL_ACCOUNT_ID))
            .cloned()
    }

    async fn resolve_all_imports(
        &self,
        namespace: &str,
        spec: &AccountSpec,
    ) -> BTreeMap<String, Option<String>> {
        let mut resolved = BTreeMap::new();
        for import in &spec.imports {
            let key = format!("{}/{}", import.account_ref.namespace.as_deref().unwrap_or(namespace), import.account_ref.name);
            if resolved.contains_key(&key) {
                continue;
            }
            let id = self.resolve_import_account_id(namespace, &import.account_ref).await;
            resolved.insert(key, id);
        }
        resolved
    }

    /// Create or reuse the account root+signing keypair, `Apply`-ing both
    /// secrets under the managed labels (spec.md §4.4 step 1).
    async fn ensure_account_keys(
        &self,
        namespace: &str,
        account_name: &str,
        owner: &Owner,
    ) -> Result<(String, AccountKeyPair), NativeError> {
        let selector = format!("{LABEL_ACCOUNT_NAME}={account_name},{LABEL_MANAGED}=true");
        let existing = self.store.get_by_labels(namespace, &selector).await?;
        let existing_root = existing
            .iter()
            .find(|s| secret_labeled(s, secret_type::ACCOUNT_ROOT));
        let existing_sign = existing
            .iter()
            .find(|s| secret_labeled(s, secret_type::ACCOUNT_SIGN));

        if let (Some(root), Some(signing)) = (existing_root, existing_sign) {
            let account_id = root
                .metadata
                .labels
                .as_ref()
                .and_then(|l| l.get(LABEL_ACCOUNT_ID))
                .cloned()
                .ok_or_else(|| NativeError::KeyNotFound("account-id label missing on reused root secret".into()))?;
            return Ok((
                account_id,
                AccountKeyPair {
                    root: keypair_from(root)?,
                    signing: keypair_from(signing)?,
                },
            ));
        }

        let root = KeyPair::new_account();
        let signing = KeyPair::new_account();
        let account_id = root.public_key();

        let mut labels = BTreeMap::new();
        labels.insert(LABEL_ACCOUNT_ID.to_string(), account_id.clone());
        labels.insert(LABEL_ACCOUNT_NAME.to_string(), account_name.to_string());
        labels.insert(LABEL_MANAGED.to_string(), "true".to_string());

        let root_name = format!("{account_name}-ac-root");
        let sign_name = format!("{account_name}-ac-sign");

        let mut root_labels = labels.clone();
        root_labels.insert(LABEL_SECRET_TYPE.to_string(), secret_type::ACCOUNT_ROOT.to_string());
        let mut root_data = BTreeMap::new();
        root_data.insert("default".to_string(), root.seed().map_err(|e| NativeError::NatsClient(e.to_string()))?);
        self.store.apply(namespace, &root_name, root_labels, root_data, Some(owner)).await?;

        let mut sign_labels = labels;
        sign_labels.insert(LABEL_SECRET_TYPE.to_string(), secret_type::ACCOUNT_SIGN.to_string());
        let mut sign_data = BTreeMap::new();
        sign_data.insert("default".to_string(), signing.seed().map_err(|e| NativeError::NatsClient(e.to_string()))?);
        self.store.apply(namespace, &sign_name, sign_labels, sign_data, Some(owner)).await?;

        Ok((account_id, AccountKeyPair { root, signing }))
    }

    pub async fn create(
        &self,
        namespace: &str,
        account_name: &str,
        spec: &AccountSpec,
        owner: &Owner,
        operator: &KeyPair,
    ) -> Result<AccountResult, NativeError> {
        let (account_id, keys) = self.ensure_account_keys(namespace, account_name, owner).await?;
        self.sign_and_publish(namespace, spec, &account_id, &keys, operator).await
    }

    pub async fn update(
        &self,
        namespace: &str,
        account_name: &str,
        account_id: &str,
        spec: &AccountSpec,
        operator: &KeyPair,
    ) -> Result<AccountResult, NativeError> {
        let keys = keystore::account_keys(self.store, namespace, account_name, account_id).await?;
        self.sign_and_publish(namespace, spec, account_id, &keys, operator).await
    }

    async fn sign_and_publish(
        &self,
        namespace: &str,
        spec: &AccountSpec,
        account_id: &str,
        keys: &AccountKeyPair,
        operator: &KeyPair,
    ) -> Result<AccountResult, NativeError> {
        let resolved = self.resolve_all_imports(namespace, spec).await;
        let claims = build_account_claims(spec, &keys.root, &keys.signing, |import_ref| {
            let key = format!("{}/{}", import_ref.namespace.as_deref().unwrap_or(namespace), import_ref.name);
            resolved.get(&key).cloned().flatten()
        })?;

        let jwt = sign_account_claims(&claims, operator)?;

        self.publisher.ensure_connected(namespace).await.map_err(|e| NativeError::NatsClient(e.to_string()))?;
        let upload = self.publisher.upload_account_jwt(&jwt).await;
        self.publisher.disconnect().await;
        upload.map_err(|e| NativeError::NatsClient(e.to_string()))?;

        Ok(AccountResult {
            account_id: account_id.to_string(),
            account_signed_by: keys.signing.public_key(),
            claims,
        })
    }

    /// Import (observe mode): require an existing `account-id`, look up and
    /// decode the remote JWT, verify it against the stored keys, and project
    /// it back into desired-state shape (spec.md §4.4 "Import (observe)").
    pub async fn import(
        &self,
        namespace: &str,
        account_name: &str,
        account_id: &str,
    ) -> Result<(AccountSpec, Claims<AccountClaimsBody>), NativeError> {
        self.publisher.ensure_connected(namespace).await.map_err(|e| NativeError::NatsClient(e.to_string()))?;
        let jwt = self.publisher.lookup_account_jwt(account_id).await;
        self.publisher.disconnect().await;
        let jwt = jwt.map_err(|e| NativeError::NatsClient(e.to_string()))?;
        if jwt.is_empty() {
            return Err(NativeError::NatsClient("jwt lookup returned empty result".into()));
        }

        let claims = decode_account_claims(&jwt)?;
        let keys = keystore::account_keys(self.store, namespace, account_name, account_id).await?;
        if claims.sub != keys.root.public_key() {
            return Err(NativeError::KeyMismatch);
        }

        let spec = project_account(&claims);
        Ok((spec, claims))
    }

    /// Deletes the account JWT (unless observe-policy) and its owned
    /// secrets. Callers (C9) are responsible for the dependent-users guard;
    /// this engine only checks it defensively for the non-observe path.
    pub async fn delete(
        &self,
        namespace: &str,
        account_id: &str,
        observe_policy: bool,
        operator: &KeyPair,
    ) -> Result<(), NativeError> {
        let dependents = self
            .store
            .get_by_labels(namespace, &format!("{LABEL_USER_ACCOUNT_ID}={account_id}"))
            .await?;
        if !dependents.is_empty() {
            return Err(NativeError::DependentUsersExist(account_id.to_string(), dependents.len()));
        }

        if !observe_policy {
            self.publisher.ensure_connected(namespace).await.map_err(|e| NativeError::NatsClient(e.to_string()))?;
            let result = self.publisher.delete_account_jwt(account_id).await;
            self.publisher.disconnect().await;
            result.map_err(|e| NativeError::NatsClient(e.to_string()))?;
        }
        let _ = operator;

        self.store
            .delete_by_labels(namespace, &format!("{LABEL_ACCOUNT_ID}={account_id}"))
            .await?;
        Ok(())
    }
}

fn secret_labeled(secret: &Secret, secret_type_value: &str) -> bool {
    secret
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(LABEL_SECRET_TYPE))
        .is_some_and(|v| v == secret_type_value)
}

fn keypair_from(secret: &Secret) -> Result<KeyPair, NativeError> {
    let seed = nauth_secrets::secret_value(secret, "default")
        .ok_or_else(|| NativeError::KeyNotFound("secret has no default key".into()))?;
    KeyPair::from_seed(&seed).map_err(|e| NativeError::NatsClient(e.to_string()))
}
