//! Shared reconcile context (spec.md §4.9): the resolver, a recorder
//! factory, and the environment knobs that gate short-circuiting and
//! default cluster selection.

use std::sync::Arc;

use kube::runtime::events::{Recorder, Reporter};
use kube::Client;

use nauth_provider::Resolver;

pub struct Context {
    pub client: Client,
    pub resolver: Resolver,
    reporter: Reporter,
    /// `DEFAULT_CLUSTER_REF` env var: `[namespace/]name` fallback when an
    /// `Account` has no explicit `natsClusterRef` (spec.md §4.8).
    pub default_cluster_ref: Option<String>,
    /// Bumped on every controller binary release; written to
    /// `status.operatorVersion`/`status.observedOperatorVersion` so an
    /// upgrade forces one re-projection even with an unchanged generation
    /// (spec.md §4.9 step 3).
    pub operator_version: String,
}

impl Context {
    pub fn new(
        client: Client,
        resolver: Resolver,
        reporter: impl Into<Reporter>,
        default_cluster_ref: Option<String>,
        operator_version: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            resolver,
            reporter: reporter.into(),
            default_cluster_ref,
            operator_version: operator_version.into(),
        })
    }

    pub fn recorder(&self) -> Recorder {
        Recorder::new(self.client.clone(), self.reporter.clone())
    }
}
