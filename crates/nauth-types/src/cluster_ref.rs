//! `ClusterRef` and the `[namespace/]name` reference-string grammar used by
//! both an `Account.spec.natsClusterRef` and the `DEFAULT_CLUSTER_REF`
//! environment fallback (spec.md §4.8).

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ClusterRef {
    #[serde(default)]
    pub api_version: Option<String>,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClusterRefError {
    #[error("invalid Cluster Reference pattern: {0:?}")]
    InvalidPattern(String),
}

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([a-z0-9]([-a-z0-9]*[a-z0-9])?/)?[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap()
    })
}

/// Parses a `[namespace/]name` string against the grammar in spec.md §4.8,
/// defaulting the namespace to `default_namespace` when omitted.
pub fn parse_cluster_reference(
    reference: &str,
    default_namespace: &str,
) -> Result<(String, String), ClusterRefError> {
    if !pattern().is_match(reference) {
        return Err(ClusterRefError::InvalidPattern(reference.to_string()));
    }
    match reference.split_once('/') {
        Some((ns, name)) => Ok((ns.to_string(), name.to_string())),
        None => Ok((default_namespace.to_string(), reference.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_reference_splits() {
        assert_eq!(
            parse_cluster_reference("ns/name", "default").unwrap(),
            ("ns".to_string(), "name".to_string())
        );
    }

    #[test]
    fn bare_name_defaults_namespace() {
        assert_eq!(
            parse_cluster_reference("name", "fallback-ns").unwrap(),
            ("fallback-ns".to_string(), "name".to_string())
        );
    }

    #[test]
    fn rejects_invalid_patterns() {
        for bad in ["", "/name", "ns/", "my.ns/name"] {
            assert!(parse_cluster_reference(bad, "default").is_err(), "{bad:?} should be rejected");
        }
    }
}
