//! Process-global actor factory registry.
//!
//! Process-mode spawn re-executes the current binary, so actor behaviour
//! cannot travel with the spawn request; instead both parent and child
//! register constructors under a kind name at startup, and the spawn
//! parameters carry only the name.

// Layer 1: Standard library imports
use std::sync::{Arc, OnceLock};

// Layer 2: Third-party crate imports
use dashmap::DashMap;

// Layer 3: Internal module imports
use super::error::ActorError;
use super::traits::Actor;

/// Builds a fresh actor of one registered kind.
pub type ActorFactory = Arc<dyn Fn() -> Box<dyn Actor> + Send + Sync>;

static FACTORIES: OnceLock<DashMap<String, ActorFactory>> = OnceLock::new();

fn factories() -> &'static DashMap<String, ActorFactory> {
    FACTORIES.get_or_init(DashMap::new)
}

/// Register an actor kind. First registration wins.
pub fn register_actor(kind: &str, factory: ActorFactory) -> Result<(), ActorError> {
    match factories().entry(kind.to_owned()) {
        dashmap::mapref::entry::Entry::Occupied(_) => {
            Err(ActorError::AlreadyRegistered(kind.to_owned()))
        }
        dashmap::mapref::entry::Entry::Vacant(slot) => {
            slot.insert(factory);
            Ok(())
        }
    }
}

/// Build an actor of a registered kind.
pub fn create_actor(kind: &str) -> Result<Box<dyn Actor>, ActorError> {
    match factories().get(kind) {
        Some(factory) => Ok(factory()),
        None => Err(ActorError::UnknownKind(kind.to_owned())),
    }
}
