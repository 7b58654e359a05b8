//! The event hub: named one-time and many-time events.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::warn;

// Layer 3: Internal module imports
use super::error::EventError;
use crate::message::Value;

/// What a one-time event resolved to: optional payload or error.
pub type EventOutcome = Result<Option<Value>, EventError>;

/// Opaque identity of one bound handler.
///
/// Returned by [`EventHub::bind`]; closures are not comparable, so removal
/// is by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Arc<dyn Fn(Option<&Value>, Option<&EventError>) -> Result<(), EventError> + Send + Sync>;

enum EventSlot {
    /// Fires any number of times; handlers run in insertion order.
    Many { handlers: Vec<(HandlerId, Handler)> },
    /// Fires at most once; observable as a future.
    Once {
        handlers: Vec<(HandlerId, Handler)>,
        outcome: Option<EventOutcome>,
        waiters: Vec<oneshot::Sender<EventOutcome>>,
    },
}

struct HubInner {
    events: HashMap<String, EventSlot>,
    next_handler: u64,
}

/// Named events with bindable callbacks.
///
/// A hub is cheap to clone (shared state) and safe to fire from any task.
/// Many-time events are created lazily on first `bind` or `fire`; one-time
/// events are declared up front by the emitter type that owns the hub.
///
/// # Example
/// ```rust
/// use pulsar_rt::events::EventHub;
/// use pulsar_rt::message::Value;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let hub = EventHub::new();
/// let hits = Arc::new(AtomicUsize::new(0));
/// let seen = Arc::clone(&hits);
/// hub.bind("data_processed", move |_, _| {
///     seen.fetch_add(1, Ordering::SeqCst);
///     Ok(())
/// }).unwrap();
///
/// hub.fire("data_processed", Some(Value::Int(12)), None);
/// hub.fire("data_processed", None, None);
/// assert_eq!(hits.load(Ordering::SeqCst), 2);
/// ```
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<Mutex<HubInner>>,
}

impl EventHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                events: HashMap::new(),
                next_handler: 0,
            })),
        }
    }

    /// Declare a one-time event. Declaring an existing name again is a
    /// no-op; a name already used by a many-time event stays many-time.
    pub fn declare_once(&self, name: &str) {
        let mut inner = self.inner.lock();
        inner
            .events
            .entry(name.to_owned())
            .or_insert_with(|| EventSlot::Once {
                handlers: Vec::new(),
                outcome: None,
                waiters: Vec::new(),
            });
    }

    /// True if `name` names a declared one-time event.
    pub fn is_one_time(&self, name: &str) -> bool {
        matches!(
            self.inner.lock().events.get(name),
            Some(EventSlot::Once { .. })
        )
    }

    /// True if the one-time event `name` has fired.
    pub fn has_fired(&self, name: &str) -> bool {
        matches!(
            self.inner.lock().events.get(name),
            Some(EventSlot::Once {
                outcome: Some(_),
                ..
            })
        )
    }

    /// Register a handler.
    ///
    /// Many-time events are created lazily; binding to a one-time event
    /// that already fired is an error.
    pub fn bind<F>(&self, name: &str, handler: F) -> Result<HandlerId, EventError>
    where
        F: Fn(Option<&Value>, Option<&EventError>) -> Result<(), EventError>
            + Send
            + Sync
            + 'static,
    {
        let mut inner = self.inner.lock();
        let id = HandlerId(inner.next_handler);
        inner.next_handler += 1;

        let slot = inner
            .events
            .entry(name.to_owned())
            .or_insert_with(|| EventSlot::Many {
                handlers: Vec::new(),
            });
        match slot {
            EventSlot::Many { handlers } => {
                handlers.push((id, Arc::new(handler)));
                Ok(id)
            }
            EventSlot::Once {
                outcome: Some(_), ..
            } => Err(EventError::AlreadyFired(name.to_owned())),
            EventSlot::Once { handlers, .. } => {
                handlers.push((id, Arc::new(handler)));
                Ok(id)
            }
        }
    }

    /// Remove a previously bound handler. Returns the number removed.
    pub fn unbind(&self, name: &str, id: HandlerId) -> usize {
        let mut inner = self.inner.lock();
        let handlers = match inner.events.get_mut(name) {
            Some(EventSlot::Many { handlers }) => handlers,
            Some(EventSlot::Once { handlers, .. }) => handlers,
            None => return 0,
        };
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        before - handlers.len()
    }

    /// Fire an event with an optional payload or error.
    ///
    /// Many-time: handlers run in insertion order; a handler error is
    /// logged and does not stop the remaining handlers. One-time: the
    /// first fire resolves the event (error wins if both are given, with
    /// a warning) and later fires are ignored with a warning.
    pub fn fire(&self, name: &str, data: Option<Value>, exc: Option<EventError>) {
        let (handlers, outcome, waiters) = {
            let mut inner = self.inner.lock();
            let slot = inner
                .events
                .entry(name.to_owned())
                .or_insert_with(|| EventSlot::Many {
                    handlers: Vec::new(),
                });
            match slot {
                EventSlot::Many { handlers } => {
                    let handlers: Vec<Handler> =
                        handlers.iter().map(|(_, h)| Arc::clone(h)).collect();
                    (handlers, None, Vec::new())
                }
                EventSlot::Once {
                    outcome: Some(_), ..
                } => {
                    warn!(event = name, "one-time event fired more than once; ignored");
                    return;
                }
                EventSlot::Once {
                    handlers,
                    outcome,
                    waiters,
                } => {
                    if data.is_some() && exc.is_some() {
                        warn!(event = name, "fired with both data and error; error wins");
                    }
                    let resolved: EventOutcome = match &exc {
                        Some(error) => Err(error.clone()),
                        None => Ok(data.clone()),
                    };
                    *outcome = Some(resolved.clone());
                    let handlers: Vec<Handler> =
                        handlers.drain(..).map(|(_, h)| h).collect();
                    (handlers, Some(resolved), std::mem::take(waiters))
                }
            }
        };

        // Handlers run outside the lock so they may touch the hub.
        let data_ref = match &outcome {
            Some(Ok(payload)) => payload.as_ref(),
            Some(Err(_)) => None,
            None => data.as_ref(),
        };
        let exc_ref = match &outcome {
            Some(Err(error)) => Some(error),
            _ => exc.as_ref(),
        };
        for handler in handlers {
            if let Err(error) = handler(data_ref, exc_ref) {
                warn!(event = name, %error, "event handler failed");
            }
        }

        if let Some(resolved) = outcome {
            for waiter in waiters {
                let _ = waiter.send(resolved.clone());
            }
        }
    }

    /// Fire a many-time event, letting handlers abort the guarded
    /// operation.
    ///
    /// The first handler returning [`EventError::Aborted`] stops the
    /// remaining handlers and propagates; other handler errors are logged
    /// as in [`fire`](Self::fire).
    pub fn fire_abortable(&self, name: &str, data: Option<Value>) -> Result<(), EventError> {
        let handlers: Vec<Handler> = {
            let inner = self.inner.lock();
            match inner.events.get(name) {
                Some(EventSlot::Many { handlers }) => {
                    handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
                }
                _ => Vec::new(),
            }
        };

        for handler in handlers {
            match handler(data.as_ref(), None) {
                Ok(()) => {}
                Err(EventError::Aborted(by)) => return Err(EventError::Aborted(by)),
                Err(error) => {
                    warn!(event = name, %error, "event handler failed");
                }
            }
        }
        Ok(())
    }

    /// Await a one-time event; resolves with its payload or error.
    ///
    /// Resolves immediately if the event already fired.
    pub async fn wait(&self, name: &str) -> EventOutcome {
        let receiver = {
            let mut inner = self.inner.lock();
            match inner.events.get_mut(name) {
                Some(EventSlot::Once {
                    outcome: Some(resolved),
                    ..
                }) => return resolved.clone(),
                Some(EventSlot::Once { waiters, .. }) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    rx
                }
                _ => return Err(EventError::NotOneTime(name.to_owned())),
            }
        };
        match receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(EventError::Dropped(name.to_owned())),
        }
    }

    /// Drop all handlers of an event. Clearing a fired one-time event is
    /// a no-op.
    pub fn clear(&self, name: &str) {
        let mut inner = self.inner.lock();
        match inner.events.get_mut(name) {
            Some(EventSlot::Many { handlers }) => handlers.clear(),
            Some(EventSlot::Once {
                outcome: None,
                handlers,
                ..
            }) => handlers.clear(),
            _ => {}
        }
    }

    /// Copy the bindings of every many-time event present in both hubs
    /// from `other` into `self`.
    pub fn copy_many_times_events(&self, other: &EventHub) {
        let copied: Vec<(String, Vec<Handler>)> = {
            let other_inner = other.inner.lock();
            other_inner
                .events
                .iter()
                .filter_map(|(name, slot)| match slot {
                    EventSlot::Many { handlers } => Some((
                        name.clone(),
                        handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
                    )),
                    EventSlot::Once { .. } => None,
                })
                .collect()
        };

        let mut inner = self.inner.lock();
        for (name, handlers) in copied {
            if !matches!(inner.events.get(&name), Some(EventSlot::Many { .. })) {
                continue;
            }
            for handler in handlers {
                let id = HandlerId(inner.next_handler);
                inner.next_handler += 1;
                if let Some(EventSlot::Many { handlers: existing }) = inner.events.get_mut(&name) {
                    existing.push((id, handler));
                }
            }
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("EventHub")
            .field("events", &inner.events.len())
            .finish()
    }
}
