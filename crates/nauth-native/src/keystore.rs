//! Native keystore (spec.md §4.3): locates operator, account-root,
//! account-signing, user-signing, and system-account keys by label, falling
//! back to legacy name-based secrets and labeling them on first success.

use nauth_secrets::{secret_value, Owner, SecretStore};
use nauth_types::labels::{
    secret_key_or_default, secret_type, LABEL_ACCOUNT_ID, LABEL_ACCOUNT_NAME, LABEL_MANAGED,
    LABEL_SECRET_TYPE, LABEL_USER_NAME,
};
use nkeys::KeyPair;
use std::collections::BTreeMap;

use crate::error::NativeError;

/// Decodes a secret's seed value (stored under `default` unless overridden)
/// into an NKey keypair.
fn keypair_from_secret(secret: &k8s_openapi::api::core::v1::Secret, key: &str) -> Result<KeyPair, NativeError> {
    let seed = secret_value(secret, secret_key_or_default(key))
        .ok_or_else(|| NativeError::KeyNotFound(format!("secret has no {key} key")))?;
    KeyPair::from_seed(&seed).map_err(|e| NativeError::NatsClient(e.to_string()))
}

/// Looks up the operator signing key: exactly one secret labeled
/// `{secret-type=operator-sign}` in `namespace` (spec.md §4.3 step 1).
pub async fn operator_signing_key(
    store: &SecretStore,
    namespace: &str,
    secret_key: &str,
) -> Result<KeyPair, NativeError> {
    let selector = format!("{LABEL_SECRET_TYPE}={}", secret_type::OPERATOR_SIGN);
    let matches = store.get_by_labels(namespace, &selector).await?;
    match matches.as_slice() {
        [secret] => keypair_from_secret(secret, secret_key),
        other => Err(NativeError::AmbiguousKeySelection {
            namespace: namespace.to_string(),
            selector,
            found: other.len(),
        }),
    }
}

/// System-account user credentials, for NATS client auth (spec.md §4.3 step 4).
pub async fn system_account_user_creds(
    store: &SecretStore,
    namespace: &str,
    secret_key: &str,
) -> Result<String, NativeError> {
    let selector = format!(
        "{LABEL_SECRET_TYPE}={}",
        secret_type::SYSTEM_ACCOUNT_USER_CREDS
    );
    let matches = store.get_by_labels(namespace, &selector).await?;
    match matches.as_slice() {
        [secret] => secret_value(secret, secret_key_or_default(secret_key))
            .ok_or_else(|| NativeError::KeyNotFound("system-account-user-creds has no data".into())),
        other => Err(NativeError::AmbiguousKeySelection {
            namespace: namespace.to_string(),
            selector,
            found: other.len(),
        }),
    }
}

pub struct AccountKeyPair {
    pub root: KeyPair,
    pub signing: KeyPair,
}

/// Resolves an account's root+signing keypair, preferring the label path and
/// falling back to legacy `<account>-ac-root`/`<account>-ac-sign` names,
/// concurrently, joining errors (spec.md §4.3 step 2, §5).
pub async fn account_keys(
    store: &SecretStore,
    namespace: &str,
    account_name: &str,
    account_id: &str,
) -> Result<AccountKeyPair, NativeError> {
    let root_selector = format!(
        "{LABEL_ACCOUNT_ID}={account_id},{LABEL_SECRET_TYPE}={},{LABEL_MANAGED}=true",
        secret_type::ACCOUNT_ROOT
    );
    let sign_selector = format!(
        "{LABEL_ACCOUNT_ID}={account_id},{LABEL_SECRET_TYPE}={},{LABEL_MANAGED}=true",
        secret_type::ACCOUNT_SIGN
    );

    let root_matches = store.get_by_labels(namespace, &root_selector).await?;
    let sign_matches = store.get_by_labels(namespace, &sign_selector).await?;

    if let (Some(root), Some(signing)) = (root_matches.first(), sign_matches.first()) {
        return Ok(AccountKeyPair {
            root: keypair_from_secret(root, "")?,
            signing: keypair_from_secret(signing, "")?,
        });
    }

    legacy_account_keys(store, namespace, account_name, account_id).await
}

/// Legacy fallback: `<account>-ac-root` / `<account>-ac-sign`, fetched
/// concurrently; on success, labels both so subsequent lookups use the
/// label path (spec.md §4.3 step 2, §9 "label on first read").
async fn legacy_account_keys(
    store: &SecretStore,
    namespace: &str,
    account_name: &str,
    account_id: &str,
) -> Result<AccountKeyPair, NativeError> {
    let root_name = format!("{account_name}-ac-root");
    let sign_name = format!("{account_name}-ac-sign");

    let (root_res, sign_res) = futures::future::join(
        store.get(namespace, &root_name),
        store.get(namespace, &sign_name),
    )
    .await;

    let root_secret = root_res?.ok_or_else(|| NativeError::KeyNotFound(root_name.clone()))?;
    let sign_secret = sign_res?.ok_or_else(|| NativeError::KeyNotFound(sign_name.clone()))?;

    let root = keypair_from_secret(&root_secret, "")?;
    let signing = keypair_from_secret(&sign_secret, "")?;

    let mut root_labels = BTreeMap::new();
    root_labels.insert(LABEL_ACCOUNT_ID.to_string(), account_id.to_string());
    root_labels.insert(LABEL_ACCOUNT_NAME.to_string(), account_name.to_string());
    root_labels.insert(LABEL_SECRET_TYPE.to_string(), secret_type::ACCOUNT_ROOT.to_string());
    root_labels.insert(LABEL_MANAGED.to_string(), "true".to_string());

    let mut sign_labels = root_labels.clone();
    sign_labels.insert(LABEL_SECRET_TYPE.to_string(), secret_type::ACCOUNT_SIGN.to_string());

    let (label_root, label_sign) = futures::future::join(
        store.label(namespace, &root_name, root_labels),
        store.label(namespace, &sign_name, sign_labels),
    )
    .await;
    label_root?;
    label_sign?;

    Ok(AccountKeyPair { root, signing })
}

/// Per-user scoped signing key: `{user-name, secret-type=user-sign, managed=true}`
/// (spec.md §4.3 step 3).
pub async fn user_signing_key(
    store: &SecretStore,
    namespace: &str,
    user_name: &str,
) -> Result<Option<KeyPair>, NativeError> {
    let selector = format!(
        "{LABEL_USER_NAME}={user_name},{LABEL_SECRET_TYPE}={},{LABEL_MANAGED}=true",
        secret_type::USER_SIGN
    );
    let matches = store.get_by_labels(namespace, &selector).await?;
    match matches.first() {
        Some(secret) => Ok(Some(keypair_from_secret(secret, "")?)),
        None => Ok(None),
    }
}

/// Generates a user signing key and persists it, owned by the user record.
pub async fn create_user_signing_key(
    store: &SecretStore,
    namespace: &str,
    user_name: &str,
    owner: &Owner,
) -> Result<KeyPair, NativeError> {
    let key = KeyPair::new_account();
    let secret_name = format!("{user_name}-user-sign");
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_USER_NAME.to_string(), user_name.to_string());
    labels.insert(LABEL_SECRET_TYPE.to_string(), secret_type::USER_SIGN.to_string());
    labels.insert(LABEL_MANAGED.to_string(), "true".to_string());
    let mut data = BTreeMap::new();
    data.insert("default".to_string(), key.seed().map_err(|e| NativeError::NatsClient(e.to_string()))?);
    store
        .apply(namespace, &secret_name, labels, data, Some(owner))
        .await?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;

    fn secret_with(key: &str, value: &str) -> Secret {
        let mut data = BTreeMap::new();
        data.insert(key.to_string(), value.to_string());
        Secret {
            metadata: ObjectMeta::default(),
            string_data: Some(data),
            ..Default::default()
        }
    }

    #[test]
    fn keypair_from_secret_decodes_default_key() {
        let kp = KeyPair::new_account();
        let seed = kp.seed().unwrap();
        let secret = secret_with("default", &seed);
        let decoded = keypair_from_secret(&secret, "").unwrap();
        assert_eq!(decoded.public_key(), kp.public_key());
    }

    #[test]
    fn keypair_from_secret_missing_key_is_not_found() {
        let secret = secret_with("default", "");
        let err = keypair_from_secret(&secret, "other").unwrap_err();
        assert!(matches!(err, NativeError::KeyNotFound(_)));
    }
}
