//! The user-facing actor behaviour trait.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use super::context::ActorContext;
use super::error::ActorError;

/// Behaviour of one actor.
///
/// Both hooks execute on the actor's own event loop, after the handshake
/// (`on_start`) and during graceful shutdown (`on_stop`). Everything else
/// an actor does happens through registered commands dispatched by the
/// runtime, or through servers and timers it sets up in `on_start`.
///
/// Long CPU work must not run directly in a hook or handler; use
/// `tokio::task::spawn_blocking` from the actor's runtime and await the
/// result.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use pulsar_rt::actor::{Actor, ActorContext, ActorError};
///
/// struct Greeter;
///
/// #[async_trait]
/// impl Actor for Greeter {
///     async fn on_start(&mut self, ctx: &ActorContext) -> Result<(), ActorError> {
///         ctx.set_info_entry("greeting", "hello".into());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Actor: Send + 'static {
    /// Called once after the handshake, before any command is processed.
    ///
    /// Returning an error aborts the start; the actor terminates without
    /// entering its loop.
    async fn on_start(&mut self, ctx: &ActorContext) -> Result<(), ActorError> {
        let _ = ctx;
        Ok(())
    }

    /// Called once during graceful shutdown, before the mailbox closes.
    async fn on_stop(&mut self, ctx: &ActorContext) {
        let _ = ctx;
    }
}

/// The do-nothing actor; useful for pools whose behaviour is entirely
/// command-driven.
#[derive(Debug, Default)]
pub struct NullActor;

#[async_trait]
impl Actor for NullActor {}
