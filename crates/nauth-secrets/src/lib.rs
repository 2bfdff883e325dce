//! Uniform read/write/label/delete facade over a labeled Kubernetes `Secret`
//! store (spec.md §4.2).
//!
//! `Apply` is idempotent (server-side apply under a fixed field manager);
//! callers that need cascade delete pass an owner reference which is stamped
//! onto every secret this facade writes.

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{DeleteParams, ListParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;

const FIELD_MANAGER: &str = "nauth-controller";

#[derive(Debug, thiserror::Error)]
pub enum SecretStoreError {
    #[error("kube api error: {0}")]
    Kube(#[from] kube::Error),
    #[error("secret {namespace}/{name} has no data")]
    NoData { namespace: String, name: String },
}

/// Everything needed to own a secret so that deleting the owning record
/// cascades to it (spec.md §3 "Ownership and lifecycle").
#[derive(Debug, Clone)]
pub struct Owner {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
}

impl Owner {
    fn to_owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            uid: self.uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }
}

pub struct SecretStore {
    client: Client,
}

impl SecretStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Secret>, SecretStoreError> {
        match self.api(namespace).get_opt(name).await? {
            Some(secret) => Ok(Some(secret)),
            None => Ok(None),
        }
    }

    /// Returns every secret in `namespace` whose labels satisfy `selector`
    /// (a `kube` label-selector expression, e.g. `"account-id=ABC,managed=true"`).
    pub async fn get_by_labels(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Secret>, SecretStoreError> {
        let list = self
            .api(namespace)
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(list.items)
    }

    /// Creates or updates a secret's labels and string data via server-side
    /// apply. Re-applying identical `data` is a no-op write.
    pub async fn apply(
        &self,
        namespace: &str,
        name: &str,
        labels: BTreeMap<String, String>,
        data: BTreeMap<String, String>,
        owner: Option<&Owner>,
    ) -> Result<Secret, SecretStoreError> {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels),
                owner_references: owner.map(|o| vec![o.to_owner_reference()]),
                ..Default::default()
            },
            string_data: Some(data),
            ..Default::default()
        };
        let patch = Patch::Apply(&secret);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        Ok(self.api(namespace).patch(name, &params, &patch).await?)
    }

    /// Merges `labels` onto an existing secret without touching its data
    /// (used by legacy-secret migration: spec.md §4.3 "label on first sight").
    pub async fn label(
        &self,
        namespace: &str,
        name: &str,
        labels: BTreeMap<String, String>,
    ) -> Result<Secret, SecretStoreError> {
        let patch = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": { "labels": labels },
        });
        let params = PatchParams::apply(FIELD_MANAGER).force();
        Ok(self
            .api(namespace)
            .patch(name, &params, &Patch::Apply(&patch))
            .await?)
    }

    pub async fn delete(&self, namespace: &str, name: &str) -> Result<(), SecretStoreError> {
        match self
            .api(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete_by_labels(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<(), SecretStoreError> {
        for secret in self.get_by_labels(namespace, selector).await? {
            if let Some(name) = secret.metadata.name {
                self.delete(namespace, &name).await?;
            }
        }
        Ok(())
    }

    /// Creates a secret only if absent; used by legacy-secret paths that
    /// must not server-side-apply over an unmanaged, name-only secret before
    /// it has been labeled.
    pub async fn create_if_absent(
        &self,
        namespace: &str,
        name: &str,
        labels: BTreeMap<String, String>,
        data: BTreeMap<String, String>,
        owner: Option<&Owner>,
    ) -> Result<Secret, SecretStoreError> {
        if let Some(existing) = self.get(namespace, name).await? {
            return Ok(existing);
        }
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels),
                owner_references: owner.map(|o| vec![o.to_owner_reference()]),
                ..Default::default()
            },
            string_data: Some(data),
            ..Default::default()
        };
        match self.api(namespace).create(&PostParams::default(), &secret).await {
            Ok(created) => Ok(created),
            Err(kube::Error::Api(e)) if e.code == 409 => self
                .get(namespace, name)
                .await?
                .ok_or_else(|| SecretStoreError::NoData {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reads a single key out of a secret's `stringData`/`data`, preferring
/// decoded `data` as that is what the API server returns on GET.
pub fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    if let Some(data) = &secret.data {
        if let Some(bytes) = data.get(key) {
            return String::from_utf8(bytes.0.clone()).ok();
        }
    }
    secret
        .string_data
        .as_ref()
        .and_then(|m| m.get(key))
        .cloned()
}
