//! `TieredLimit` — hosted-back-end-specific per-replication-tier JetStream
//! quotas (spec.md §3, §4.7).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::account::Limit;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tier {
    #[serde(default)]
    pub disk_storage: Option<Limit>,
    #[serde(default)]
    pub disk_max_stream_bytes: Option<Limit>,
    #[serde(default)]
    pub streams: Option<Limit>,
    #[serde(default)]
    pub consumer: Option<Limit>,
    #[serde(default)]
    pub max_ack_pending: Option<Limit>,
    #[serde(default)]
    pub max_bytes_required: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TieredLimitAccountRef {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "nauth.io",
    version = "v1alpha1",
    kind = "TieredLimit",
    namespaced,
    status = "TieredLimitStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct TieredLimitSpec {
    pub account_ref: TieredLimitAccountRef,
    #[serde(default)]
    pub r1: Option<Tier>,
    #[serde(default)]
    pub r3: Option<Tier>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectedForAccount {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TieredLimitStatus {
    #[serde(default)]
    pub selected_for_account: Option<SelectedForAccount>,
}

impl TieredLimitStatus {
    pub fn selects(&self, name: &str, namespace: &str) -> bool {
        self.selected_for_account
            .as_ref()
            .is_some_and(|s| s.name == name && s.namespace == namespace)
    }
}
