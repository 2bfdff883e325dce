//! `Account` desired/observed state (spec.md §3).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cluster_ref::ClusterRef;
use crate::condition::Condition;
use crate::value::StringList;

/// `i64` limit where `-1` means "unlimited" (NATS convention, spec.md §4.1).
pub type Limit = i64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NatsLimits {
    #[serde(default)]
    pub subs: Option<Limit>,
    #[serde(default)]
    pub data: Option<Limit>,
    #[serde(default)]
    pub payload: Option<Limit>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountLimits {
    #[serde(default)]
    pub imports: Option<Limit>,
    #[serde(default)]
    pub exports: Option<Limit>,
    #[serde(default)]
    pub wildcards: Option<bool>,
    #[serde(default)]
    pub conn: Option<Limit>,
    #[serde(default)]
    pub leaf: Option<Limit>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JetStreamLimits {
    #[serde(default)]
    pub mem_storage: Option<Limit>,
    #[serde(default)]
    pub disk_storage: Option<Limit>,
    #[serde(default)]
    pub streams: Option<Limit>,
    #[serde(default)]
    pub consumer: Option<Limit>,
    #[serde(default)]
    pub max_ack_pending: Option<Limit>,
    #[serde(default)]
    pub mem_max_stream_bytes: Option<Limit>,
    #[serde(default)]
    pub disk_max_stream_bytes: Option<Limit>,
    #[serde(default)]
    pub max_bytes_required: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExportType {
    Stream,
    Service,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ResponseType {
    Singleton,
    Stream,
    Chunked,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Latency {
    pub sampling_rate: i32,
    pub results_subject: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Export {
    pub name: String,
    pub subject: String,
    #[serde(rename = "type")]
    pub export_type: ExportType,
    #[serde(default)]
    pub token_req: bool,
    /// public key -> unix-seconds revocation timestamp.
    #[serde(default)]
    pub revocations: std::collections::BTreeMap<String, i64>,
    #[serde(default)]
    pub response_type: Option<ResponseType>,
    #[serde(default)]
    pub response_threshold: Option<i64>,
    #[serde(default)]
    pub latency: Option<Latency>,
    #[serde(default)]
    pub account_token_position: Option<u32>,
    #[serde(default)]
    pub advertise: bool,
    #[serde(default)]
    pub allow_trace: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportAccountRef {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Import {
    pub name: String,
    pub account_ref: ImportAccountRef,
    pub subject: String,
    /// May contain `$N` back-references to `*` wildcards in `subject`.
    #[serde(default)]
    pub local_subject: Option<String>,
    #[serde(rename = "type")]
    pub import_type: ExportType,
    #[serde(default)]
    pub share: bool,
    #[serde(default)]
    pub allow_trace: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SigningKeyDescriptor {
    pub public_key: String,
}

#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "nauth.io",
    version = "v1alpha1",
    kind = "Account",
    namespaced,
    status = "AccountStatus",
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"AccountId","type":"string","jsonPath":".metadata.labels.account\\.nauth\\.io/id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AccountSpec {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub nats_cluster_ref: Option<ClusterRef>,
    #[serde(default)]
    pub nats_limits: NatsLimits,
    #[serde(default)]
    pub account_limits: AccountLimits,
    #[serde(default)]
    pub jet_stream_limits: JetStreamLimits,
    #[serde(default)]
    pub exports: Vec<Export>,
    #[serde(default)]
    pub imports: Vec<Import>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default)]
    pub reconcile_timestamp: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub operator_version: Option<String>,
    /// Last successfully projected claims, round-tripped for `ImportAccount`.
    #[serde(default)]
    pub claims: Option<serde_json::Value>,
    #[serde(default)]
    pub signing_key: Option<SigningKeyDescriptor>,
    /// Set by the hosted provider when the remote account public key no
    /// longer matches the `account-signed-by` label (spec.md §4.7).
    #[serde(default)]
    pub account_nkey_rotated: bool,
}

impl AccountSpec {
    /// Detects duplicate import subjects (spec.md §4.4 invariant).
    pub fn conflicting_import_subject(&self) -> Option<&str> {
        let mut seen = std::collections::HashSet::new();
        for import in &self.imports {
            if !seen.insert(import.subject.as_str()) {
                return Some(import.subject.as_str());
            }
        }
        None
    }
}

/// Convenience accessor mirroring `StringList`'s set semantics, used by the
/// native account engine when assembling the signing-keys list.
pub fn signing_keys_with(mut keys: StringList, extra: &str) -> StringList {
    keys.add(extra);
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import(subject: &str) -> Import {
        Import {
            name: "i".into(),
            account_ref: ImportAccountRef {
                name: "other".into(),
                namespace: None,
            },
            subject: subject.into(),
            local_subject: None,
            import_type: ExportType::Stream,
            share: false,
            allow_trace: false,
        }
    }

    #[test]
    fn detects_duplicate_import_subjects() {
        let spec = AccountSpec {
            display_name: None,
            nats_cluster_ref: None,
            nats_limits: Default::default(),
            account_limits: Default::default(),
            jet_stream_limits: Default::default(),
            exports: vec![],
            imports: vec![import("a.>"), import("a.>")],
        };
        assert_eq!(spec.conflicting_import_subject(), Some("a.>"));
    }

    #[test]
    fn distinct_subjects_have_no_conflict() {
        let spec = AccountSpec {
            display_name: None,
            nats_cluster_ref: None,
            nats_limits: Default::default(),
            account_limits: Default::default(),
            jet_stream_limits: Default::default(),
            exports: vec![],
            imports: vec![import("a.>"), import("b.>")],
        };
        assert_eq!(spec.conflicting_import_subject(), None);
    }
}
