//! `NatsCluster` — native-back-end cluster-config record (spec.md §3).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValueFromRef {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub key: String,
}

#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "nauth.io",
    version = "v1alpha1",
    kind = "NatsCluster",
    namespaced,
    status = "NatsClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct NatsClusterSpec {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub url_from: Option<ValueFromRef>,
    #[serde(default)]
    pub operator_signing_key_secret_ref: Option<ValueFromRef>,
    #[serde(default)]
    pub system_account_user_creds_secret_ref: Option<ValueFromRef>,
}

impl NatsClusterSpec {
    /// Declarative validation: exactly one of `url`/`urlFrom` is set (spec.md §3 invariant).
    pub fn validate(&self) -> Result<(), String> {
        match (&self.url, &self.url_from) {
            (Some(_), Some(_)) => Err("exactly one of url or urlFrom must be set, both are set".into()),
            (None, None) => Err("exactly one of url or urlFrom must be set, neither is set".into()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NatsClusterStatus {}
