//! Named event surface used throughout the runtime.
//!
//! Everything that emits lifecycle signals (protocols, consumers, actors,
//! the arbiter) embeds an [`EventHub`]. One-time events fire at most once
//! and are awaitable as futures; many-time events fire any number of times
//! and invoke their handlers in insertion order.

pub mod error;
pub mod hub;

pub use error::EventError;
pub use hub::{EventHub, EventOutcome, HandlerId};
