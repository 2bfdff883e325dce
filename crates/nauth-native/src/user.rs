//! Native user engine (spec.md §4.5): direct or scoped user JWT issuance,
//! credentials-file formatting and storage.

use std::collections::BTreeMap;

use kube::{Api, Client};
use nkeys::KeyPair;

use nauth_claims::native::{
    build_account_claims, build_direct_user_claims, build_scoped_user_claims, decode_account_claims,
    format_creds, remove_scoped_signer, scoped_signer_for, sign_account_claims, upsert_scoped_signer,
    NativeClaimsError,
};
use nauth_secrets::{Owner, SecretStore};
use nauth_types::account::Account;
use nauth_types::labels::{
    secret_type, LABEL_ACCOUNT_ID, LABEL_SECRET_TYPE, LABEL_USER_ACCOUNT_ID, LABEL_USER_ID,
    LABEL_USER_SIGNED_BY,
};
use nauth_types::user::UserSpec;

use crate::error::NativeError;
use crate::keystore;
use crate::publisher::NatsPublisher;

pub struct NativeUserEngine<'a> {
    pub store: &'a SecretStore,
    pub publisher: &'a dyn NatsPublisher,
    pub client: Client,
}

pub struct UserResult {
    pub user_id: String,
    pub user_account_id: String,
    pub user_signed_by: String,
}

impl<'a> NativeUserEngine<'a> {
    async fn resolve_account(&self, namespace: &str, account_name: &str) -> Result<(String, String), NativeError> {
        let api: Api<Account> = Api::namespaced(self.client.clone(), namespace);
        let account = api
            .get(account_name)
            .await
            .map_err(|e| NativeError::KeyNotFound(format!("account {account_name} not found: {e}")))?;
        let account_id = account
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(LABEL_ACCOUNT_ID))
            .cloned()
            .ok_or_else(|| NativeError::KeyNotFound(format!("account {account_name} has no account-id label")))?;
        Ok((account_id, account_name.to_string()))
    }

    /// Resolves the account signing keypair and current JWT needed to issue
    /// or re-issue a user (spec.md §4.5 step 1-2).
    async fn account_signing_key(&self, namespace: &str, account_name: &str, account_id: &str) -> Result<KeyPair, NativeError> {
        let keys = keystore::account_keys(self.store, namespace, account_name, account_id).await?;
        Ok(keys.signing)
    }

    pub async fn create_or_update(
        &self,
        namespace: &str,
        user_name: &str,
        spec: &UserSpec,
        owner: &Owner,
        operator: &KeyPair,
    ) -> Result<UserResult, NativeError> {
        let (account_id, account_name) = self.resolve_account(namespace, &spec.account_name).await?;
        let account_signing = self.account_signing_key(namespace, &account_name, &account_id).await?;

        let user_key = KeyPair::new_user();

        let (jwt, signer_public_key) = if spec.use_signing_key {
            self.issue_scoped(namespace, user_name, spec, &account_id, &account_name, &account_signing, &user_key, owner, operator).await?
        } else {
            let claims = build_direct_user_claims(spec, &user_key, &account_id);
            let jwt = claims.encode(&account_signing).map_err(NativeClaimsError::from)?;
            (jwt, account_signing.public_key())
        };

        let seed = user_key.seed().map_err(|e| NativeError::NatsClient(e.to_string()))?;
        let creds = format_creds(&jwt, &seed);

        let mut labels = BTreeMap::new();
        labels.insert(LABEL_USER_ID.to_string(), user_key.public_key());
        labels.insert(LABEL_USER_ACCOUNT_ID.to_string(), account_id.clone());
        labels.insert(LABEL_USER_SIGNED_BY.to_string(), signer_public_key.clone());
        labels.insert(LABEL_SECRET_TYPE.to_string(), secret_type::USER_CREDS.to_string());
        labels.insert(nauth_types::labels::LABEL_MANAGED.to_string(), "true".to_string());

        let mut data = BTreeMap::new();
        data.insert(nauth_types::labels::SECRET_KEY_USER_CREDS.to_string(), creds);

        let secret_name = format!("{user_name}-creds");
        self.store.apply(namespace, &secret_name, labels, data, Some(owner)).await?;

        Ok(UserResult {
            user_id: user_key.public_key(),
            user_account_id: account_id,
            user_signed_by: signer_public_key,
        })
    }

    /// Scoped issuance: ensure a per-user signing key, merge a scoped-signer
    /// entry into the account JWT, re-sign and re-upload it, then issue user
    /// claims with no embedded permissions (spec.md §4.5 step 4 "Scoped").
    #[allow(clippy::too_many_arguments)]
    async fn issue_scoped(
        &self,
        namespace: &str,
        user_name: &str,
        spec: &UserSpec,
        account_id: &str,
        account_name: &str,
        account_signing: &KeyPair,
        user_key: &KeyPair,
        owner: &Owner,
        operator: &KeyPair,
    ) -> Result<(String, String), NativeError> {
        let scoped_key = match keystore::user_signing_key(self.store, namespace, user_name).await? {
            Some(key) => key,
            None => keystore::create_user_signing_key(self.store, namespace, user_name, owner).await?,
        };

        self.publisher.ensure_connected(namespace).await.map_err(|e| NativeError::NatsClient(e.to_string()))?;
        let current_jwt = self.publisher.lookup_account_jwt(account_id).await;
        self.publisher.disconnect().await;
        let current_jwt = current_jwt.map_err(|e| NativeError::NatsClient(e.to_string()))?;

        let mut account_claims = decode_account_claims(&current_jwt)?;
        upsert_scoped_signer(&mut account_claims.nats, scoped_signer_for(spec, &scoped_key));

        let account_jwt = sign_account_claims(&account_claims, operator)?;
        self.publisher.ensure_connected(namespace).await.map_err(|e| NativeError::NatsClient(e.to_string()))?;
        let upload = self.publisher.upload_account_jwt(&account_jwt).await;
        self.publisher.disconnect().await;
        upload.map_err(|e| NativeError::NatsClient(e.to_string()))?;
        let _ = account_name;

        let user_claims = build_scoped_user_claims(spec, user_key, account_id);
        let user_jwt = user_claims.encode(&scoped_key).map_err(NativeClaimsError::from)?;
        Ok((user_jwt, scoped_key.public_key()))
    }

    /// Deletes a user: for scoped users, regenerates and re-uploads the
    /// account JWT with the scoped signer removed, then deletes the
    /// scoped-signer secret; in both modes, deletes the creds secret
    /// (spec.md §4.5 "Delete").
    pub async fn delete(
        &self,
        namespace: &str,
        user_name: &str,
        account_name: &str,
        account_id: &str,
        user_public_key: &str,
        use_signing_key: bool,
        operator: &KeyPair,
    ) -> Result<(), NativeError> {
        if use_signing_key {
            let account_keys = keystore::account_keys(self.store, namespace, account_name, account_id)
                .await
                .map_err(|e| NativeError::RetryLater(e.to_string()))?;
            let _ = account_keys;

            self.publisher.ensure_connected(namespace).await.map_err(|e| NativeError::NatsClient(e.to_string()))?;
            let current_jwt = self.publisher.lookup_account_jwt(account_id).await;
            self.publisher.disconnect().await;
            let current_jwt = current_jwt.map_err(|e| NativeError::NatsClient(e.to_string()))?;

            if !current_jwt.is_empty() {
                let mut account_claims = decode_account_claims(&current_jwt)?;
                if let Some(scoped_key) = keystore::user_signing_key(self.store, namespace, user_name).await? {
                    remove_scoped_signer(&mut account_claims.nats, &scoped_key.public_key());
                    let account_jwt = sign_account_claims(&account_claims, operator)?;
                    self.publisher.ensure_connected(namespace).await.map_err(|e| NativeError::NatsClient(e.to_string()))?;
                    let upload = self.publisher.upload_account_jwt(&account_jwt).await;
                    self.publisher.disconnect().await;
                    upload.map_err(|e| NativeError::NatsClient(e.to_string()))?;
                }
            }

            let signing_secret_name = format!("{user_name}-user-sign");
            self.store.delete(namespace, &signing_secret_name).await?;
        }

        let _ = user_public_key;
        let creds_secret_name = format!("{user_name}-creds");
        self.store.delete(namespace, &creds_secret_name).await?;
        Ok(())
    }
}
