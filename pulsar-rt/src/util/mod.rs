//! Utility types and helpers for the actor runtime

pub mod ids;
pub mod serde_helpers;

pub use ids::ActorId;
pub use serde_helpers::duration_serde;
