//! Two-way conversion between desired state (`nauth-types`) and each back
//! end's wire payload: signed NATS JWTs for the native back end (`native`),
//! REST DTOs for the hosted back end (`hosted`).

pub mod hosted;
pub mod native;
