//! `User` desired/observed state (spec.md §3).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::account::{Limit, NatsLimits};
use crate::condition::Condition;
use crate::value::{CidrList, TimeRange};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPermission {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePermission {
    #[serde(default)]
    pub max_msgs: i32,
    /// Expiry in seconds.
    #[serde(default)]
    pub expires: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    #[serde(default)]
    pub pub_: Option<SubjectPermission>,
    #[serde(default)]
    pub sub: Option<SubjectPermission>,
    #[serde(default)]
    pub resp: Option<ResponsePermission>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserLimits {
    #[serde(default)]
    pub src: CidrList,
    #[serde(default)]
    pub times: Vec<TimeRange>,
    #[serde(default)]
    pub locale: Option<String>,
}

#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "nauth.io",
    version = "v1alpha1",
    kind = "User",
    namespaced,
    status = "UserStatus",
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Account","type":"string","jsonPath":".spec.accountName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct UserSpec {
    pub account_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub permissions: Option<Permissions>,
    #[serde(default)]
    pub limits: Option<UserLimits>,
    #[serde(default)]
    pub nats_limits: Option<NatsLimits>,
    #[serde(default)]
    pub use_signing_key: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default)]
    pub observed_operator_version: Option<String>,
    #[serde(default)]
    pub reconcile_timestamp: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub claims: Option<serde_json::Value>,
}

/// `i64` re-exported for callers that only need the User module.
pub type NatsLimit = Limit;
