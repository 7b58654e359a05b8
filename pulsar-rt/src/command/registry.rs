//! The process-global verb table.

// Layer 1: Standard library imports
use std::sync::{Arc, OnceLock};

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use futures::future::BoxFuture;

// Layer 3: Internal module imports
use super::builtin;
use super::error::CommandError;
use super::request::CommandRequest;
use crate::message::Value;

/// The future a command handler resolves with.
pub type HandlerFuture = BoxFuture<'static, Result<Value, CommandError>>;

/// A registered command handler.
pub type CommandHandler = Arc<dyn Fn(CommandRequest) -> HandlerFuture + Send + Sync>;

/// A callable executable through the `run` verb.
pub type RunCallable =
    Arc<dyn Fn(&CommandRequest) -> Result<Value, CommandError> + Send + Sync>;

/// One registered verb.
#[derive(Clone)]
pub struct CommandSpec {
    /// The verb name
    pub name: String,
    /// Whether senders expect a reply
    pub ack: bool,
    /// The handler invoked on the target's event loop
    pub handler: CommandHandler,
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("ack", &self.ack)
            .finish()
    }
}

/// Verb name to handler table.
///
/// Entries are write-once: registering an existing name is an error and
/// the original entry stays.
#[derive(Default)]
pub struct CommandRegistry {
    entries: DashMap<String, CommandSpec>,
    callables: DashMap<String, RunCallable>,
}

impl CommandRegistry {
    /// Create an empty registry (tests; production uses [`global`]).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with the built-in verbs.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        builtin::install(&registry);
        registry
    }

    /// Register a verb. First registration wins.
    pub fn register(
        &self,
        name: &str,
        ack: bool,
        handler: CommandHandler,
    ) -> Result<(), CommandError> {
        let spec = CommandSpec {
            name: name.to_owned(),
            ack,
            handler,
        };
        match self.entries.entry(name.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(CommandError::AlreadyRegistered(name.to_owned()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(spec);
                Ok(())
            }
        }
    }

    /// Look a verb up.
    pub fn get(&self, name: &str) -> Option<CommandSpec> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    /// True if the verb exists.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of registered verbs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no verb is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a callable for the `run` verb. First registration wins.
    pub fn register_callable(
        &self,
        name: &str,
        callable: RunCallable,
    ) -> Result<(), CommandError> {
        match self.callables.entry(name.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(CommandError::AlreadyRegistered(name.to_owned()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(callable);
                Ok(())
            }
        }
    }

    /// Look a `run` callable up.
    pub fn callable(&self, name: &str) -> Option<RunCallable> {
        self.callables.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Dispatch a request to its verb's handler.
    pub async fn dispatch(
        &self,
        verb: &str,
        request: CommandRequest,
    ) -> Result<Value, CommandError> {
        let spec = self
            .get(verb)
            .ok_or_else(|| CommandError::NotFound(verb.to_owned()))?;
        (spec.handler)(request).await
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("verbs", &self.entries.len())
            .field("callables", &self.callables.len())
            .finish()
    }
}

static REGISTRY: OnceLock<CommandRegistry> = OnceLock::new();

/// The process-global registry, built-ins installed on first access.
pub fn global() -> &'static CommandRegistry {
    REGISTRY.get_or_init(CommandRegistry::with_builtins)
}

/// Register a verb in the global registry.
pub fn register(name: &str, ack: bool, handler: CommandHandler) -> Result<(), CommandError> {
    global().register(name, ack, handler)
}

/// Register a `run` callable in the global registry.
pub fn register_callable(name: &str, callable: RunCallable) -> Result<(), CommandError> {
    global().register_callable(name, callable)
}
