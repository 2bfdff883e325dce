//! `System` — hosted-back-end cluster-config record (spec.md §3).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::nats_cluster::ValueFromRef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SystemSelector {
    pub name: String,
}

#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "nauth.io",
    version = "v1alpha1",
    kind = "System",
    namespaced,
    status = "SystemStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct SystemSpec {
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub team_id_from: Option<ValueFromRef>,
    pub system_selector: SystemSelector,
    pub api_credentials_secret_ref: ValueFromRef,
    pub api_endpoint: String,
    /// Seconds between periodic sync reconciles (spec.md §4.7 default 5m).
    #[serde(default)]
    pub reconcile_interval_seconds: Option<u64>,
}

impl SystemSpec {
    pub fn validate(&self) -> Result<(), String> {
        match (&self.team_id, &self.team_id_from) {
            (Some(_), Some(_)) => Err("exactly one of teamId or teamIdFrom must be set, both are set".into()),
            (None, None) => Err("exactly one of teamId or teamIdFrom must be set, neither is set".into()),
            _ => Ok(()),
        }
    }

    pub fn reconcile_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reconcile_interval_seconds.unwrap_or(300))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    #[serde(default)]
    pub system_id: Option<String>,
}
