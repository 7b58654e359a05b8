//! The request context handed to command handlers.

// Layer 1: Standard library imports
use std::collections::BTreeMap;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use super::error::CommandError;
use crate::message::{Request, Value};
use crate::util::ActorId;

/// The surface a command handler sees of the actor it runs on.
///
/// Workers implement the base surface; the arbiter additionally overrides
/// the supervisor operations (`record_notify`, `spawn_actor`), which
/// default to an [`CommandError::ArbiterOnly`] rejection everywhere else.
#[async_trait]
pub trait CommandTarget: Send + Sync {
    /// Identity of this actor.
    fn aid(&self) -> ActorId;

    /// Name of this actor.
    fn name(&self) -> String;

    /// Info snapshot: name, state, uptime and counters.
    fn info(&self) -> Value;

    /// Ask the actor to begin its graceful shutdown.
    fn request_stop(&self);

    /// Supervisor surface: record a heartbeat from `caller`.
    ///
    /// The first notify from an unknown caller completes its handshake.
    fn record_notify(&self, caller: ActorId, info: Value) -> Result<(), CommandError> {
        let _ = (caller, info);
        Err(CommandError::ArbiterOnly(super::NOTIFY.to_owned()))
    }

    /// Supervisor surface: spawn an actor, resolving with its aid.
    async fn spawn_actor(
        &self,
        params: BTreeMap<String, Value>,
    ) -> Result<Value, CommandError> {
        let _ = params;
        Err(CommandError::ArbiterOnly(super::SPAWN.to_owned()))
    }
}

/// One inbound command, bound to the actor that will handle it.
#[derive(Clone)]
pub struct CommandRequest {
    /// The actor the command executes on
    pub target: Arc<dyn CommandTarget>,
    /// Identity of the calling actor
    pub caller: ActorId,
    /// Positional arguments
    pub args: Vec<Value>,
    /// Keyword arguments
    pub kwargs: BTreeMap<String, Value>,
}

impl CommandRequest {
    /// Bind a wire request to its handling actor.
    pub fn new(target: Arc<dyn CommandTarget>, request: &Request) -> Self {
        Self {
            target,
            caller: request.sender,
            args: request.args.clone(),
            kwargs: request.kwargs.clone(),
        }
    }

    /// First positional argument, or a bad-arguments error.
    pub fn first_arg(&self, command: &str) -> Result<&Value, CommandError> {
        self.args
            .first()
            .ok_or_else(|| CommandError::bad_arguments(command, "missing argument"))
    }

    /// Keyword argument by name, or a bad-arguments error.
    pub fn kwarg(&self, command: &str, name: &str) -> Result<&Value, CommandError> {
        self.kwargs
            .get(name)
            .ok_or_else(|| CommandError::bad_arguments(command, format!("missing '{name}'")))
    }
}

impl std::fmt::Debug for CommandRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRequest")
            .field("caller", &self.caller)
            .field("args", &self.args.len())
            .field("kwargs", &self.kwargs.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A minimal target used across the command test modules.
    pub(crate) struct StubTarget {
        pub aid: ActorId,
        pub name: String,
        pub stops: std::sync::atomic::AtomicUsize,
    }

    impl StubTarget {
        pub fn new(name: &str) -> Self {
            Self {
                aid: ActorId::new(),
                name: name.to_owned(),
                stops: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CommandTarget for StubTarget {
        fn aid(&self) -> ActorId {
            self.aid
        }

        fn name(&self) -> String {
            self.name.clone()
        }

        fn info(&self) -> Value {
            let mut info = BTreeMap::new();
            info.insert("name".to_owned(), Value::from(self.name.clone()));
            info.insert("state".to_owned(), Value::from("running"));
            Value::Map(info)
        }

        fn request_stop(&self) {
            self.stops
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    fn request_with_args(args: Vec<Value>) -> CommandRequest {
        CommandRequest {
            target: Arc::new(StubTarget::new("stub")),
            caller: ActorId::new(),
            args,
            kwargs: BTreeMap::new(),
        }
    }

    #[test]
    fn test_first_arg_present() {
        let request = request_with_args(vec![Value::from("x")]);
        assert_eq!(request.first_arg("echo").unwrap(), &Value::from("x"));
    }

    #[test]
    fn test_first_arg_missing() {
        let request = request_with_args(Vec::new());
        assert!(matches!(
            request.first_arg("echo"),
            Err(CommandError::BadArguments { .. })
        ));
    }

    #[tokio::test]
    async fn test_supervisor_surface_defaults_reject() {
        let target = StubTarget::new("worker");
        assert!(matches!(
            target.record_notify(ActorId::new(), Value::map()),
            Err(CommandError::ArbiterOnly(_))
        ));
        assert!(matches!(
            target.spawn_actor(BTreeMap::new()).await,
            Err(CommandError::ArbiterOnly(_))
        ));
    }
}
