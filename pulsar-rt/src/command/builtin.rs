//! The built-in verbs.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use tracing::debug;

// Layer 3: Internal module imports
use super::error::CommandError;
use super::registry::{CommandHandler, CommandRegistry};
use super::request::CommandRequest;
use crate::message::Value;

/// Install every built-in verb into `registry`.
pub fn install(registry: &CommandRegistry) {
    let entries: [(&str, bool, CommandHandler); 7] = [
        (super::PING, true, Arc::new(ping)),
        (super::ECHO, true, Arc::new(echo)),
        (super::INFO, true, Arc::new(info)),
        (super::NOTIFY, true, Arc::new(notify)),
        (super::RUN, true, Arc::new(run)),
        (super::STOP, true, Arc::new(stop)),
        (super::SPAWN, true, Arc::new(spawn)),
    ];
    for (name, ack, handler) in entries {
        // Install only once; a second install call leaves entries as-is.
        let _ = registry.register(name, ack, handler);
    }
}

fn ping(_request: CommandRequest) -> super::registry::HandlerFuture {
    Box::pin(async { Ok(Value::from("pong")) })
}

fn echo(request: CommandRequest) -> super::registry::HandlerFuture {
    Box::pin(async move { Ok(request.first_arg(super::ECHO)?.clone()) })
}

fn info(request: CommandRequest) -> super::registry::HandlerFuture {
    Box::pin(async move { Ok(request.target.info()) })
}

/// Heartbeat from a child actor; on the arbiter the first one completes
/// the sender's handshake. Replies with an empty ack.
fn notify(request: CommandRequest) -> super::registry::HandlerFuture {
    Box::pin(async move {
        let info = request
            .kwargs
            .get("info")
            .cloned()
            .unwrap_or(Value::Null);
        request.target.record_notify(request.caller, info)?;
        Ok(Value::Null)
    })
}

/// Execute a registered callable on the target's event loop.
///
/// The first argument names the callable; the rest are its input. The
/// callable registry replaces shipping code between processes.
fn run(request: CommandRequest) -> super::registry::HandlerFuture {
    Box::pin(async move {
        let name = request
            .first_arg(super::RUN)?
            .as_str()
            .ok_or_else(|| CommandError::bad_arguments(super::RUN, "callable name not a string"))?
            .to_owned();
        let callable = super::registry::global()
            .callable(&name)
            .ok_or_else(|| CommandError::UnknownCallable(name.clone()))?;
        debug!(callable = %name, "running callable");
        callable(&request)
    })
}

fn stop(request: CommandRequest) -> super::registry::HandlerFuture {
    Box::pin(async move {
        debug!(target = %request.target.aid(), "stop requested");
        request.target.request_stop();
        Ok(Value::Null)
    })
}

/// Spawn a new actor; arbiter only. Resolves with the new actor's aid
/// once its handshake completes.
fn spawn(request: CommandRequest) -> super::registry::HandlerFuture {
    Box::pin(async move {
        let params = request.kwargs.clone();
        request.target.spawn_actor(params).await
    })
}
