//! Hosted (Synadia Cloud) provider back end (spec.md §4.6, §4.7).

pub mod arbitration;
pub mod client;
pub mod provider;

pub use client::{HostedApiError, HostedClient, StaticToken, TokenProvider};
pub use provider::{HostedClusterConfig, HostedProvider, HostedProviderFactory};
