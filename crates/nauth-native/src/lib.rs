//! Native (NKey + NATS JWT) back end: keystore (§4.3), account engine
//! (§4.4), and user engine (§4.5).

pub mod account;
pub mod error;
pub mod keystore;
pub mod provider;
pub mod publisher;
pub mod user;

pub use account::{AccountResult, NativeAccountEngine};
pub use error::NativeError;
pub use provider::{NativeClusterConfig, NativeProvider, NativeProviderFactory};
pub use publisher::{AsyncNatsPublisher, NatsPublisher};
pub use user::{NativeUserEngine, UserResult};
