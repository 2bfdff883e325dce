//! Desired-state and status types for the nauth control plane.
//!
//! Every type here is plain data: serialization, set semantics, and
//! declarative validation only. Reconciliation behavior lives in
//! `nauth-controller`; back-end translation lives in `nauth-claims` and
//! `nauth-hosted`.

pub mod account;
pub mod cluster_ref;
pub mod condition;
pub mod labels;
pub mod nats_cluster;
pub mod system;
pub mod tiered_limit;
pub mod user;
pub mod value;

pub use account::{Account, AccountSpec, AccountStatus};
pub use cluster_ref::{parse_cluster_reference, ClusterRef, ClusterRefError};
pub use condition::{set_condition, Condition, ConditionStatus};
pub use nats_cluster::{NatsCluster, NatsClusterSpec, NatsClusterStatus};
pub use system::{System, SystemSpec, SystemStatus};
pub use tiered_limit::{TieredLimit, TieredLimitSpec, TieredLimitStatus};
pub use user::{User, UserSpec, UserStatus};
