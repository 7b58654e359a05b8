//! Request/reply correlation.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU32, Ordering};

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::debug;

// Layer 3: Internal module imports
use super::error::MailboxError;
use crate::message::Value;

/// Outcome delivered to a pending request future.
pub type ReplyOutcome = Result<Value, MailboxError>;

/// Map of in-flight request ids to reply futures for one connection.
///
/// Ids are allocated from a single per-connection counter, so requests
/// that expect no reply (`ack = false`) still consume an id but never
/// occupy an entry. A reply for an unknown id is dropped by the caller
/// after [`resolve`](Self::resolve) returns `false`.
#[derive(Debug, Default)]
pub struct PendingRequests {
    next_id: AtomicU32,
    entries: DashMap<u32, oneshot::Sender<ReplyOutcome>>,
}

impl PendingRequests {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next request id without registering an entry.
    pub fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocate an id and register a reply future for it.
    pub fn register(&self) -> (u32, oneshot::Receiver<ReplyOutcome>) {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.entries.insert(id, tx);
        (id, rx)
    }

    /// Deliver a reply. Returns `false` for unknown (or cancelled) ids.
    pub fn resolve(&self, id: u32, outcome: ReplyOutcome) -> bool {
        match self.entries.remove(&id) {
            Some((_, tx)) => {
                // The waiter may have been dropped; either way the entry
                // is gone and a later duplicate is unknown.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Cancel a pending request; a late reply will be dropped.
    pub fn cancel(&self, id: u32) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Fail every pending request, leaving the map empty.
    pub fn fail_all(&self, error: &MailboxError) -> usize {
        let ids: Vec<u32> = self.entries.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, tx)) = self.entries.remove(&id) {
                let _ = tx.send(Err(error.clone()));
                failed += 1;
            }
        }
        if failed > 0 {
            debug!(count = failed, "failed pending requests");
        }
        failed
    }

    /// Number of requests still awaiting a reply.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no request is awaiting a reply.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_resolve() {
        let pending = PendingRequests::new();
        let (id, rx) = pending.register();

        assert!(pending.resolve(id, Ok(Value::from("pong"))));
        assert_eq!(rx.await.unwrap(), Ok(Value::from("pong")));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_unknown_reply_dropped() {
        let pending = PendingRequests::new();
        assert!(!pending.resolve(99, Ok(Value::Null)));
    }

    #[test]
    fn test_duplicate_reply_dropped() {
        let pending = PendingRequests::new();
        let (id, _rx) = pending.register();

        assert!(pending.resolve(id, Ok(Value::Null)));
        assert!(!pending.resolve(id, Ok(Value::Null)));
    }

    #[test]
    fn test_ids_are_sequential_and_shared() {
        let pending = PendingRequests::new();
        let first = pending.next_id();
        let (second, _rx) = pending.register();
        let third = pending.next_id();

        assert_eq!(second, first + 1);
        assert_eq!(third, second + 1);
        // next_id alone registered nothing.
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_removes_entry() {
        let pending = PendingRequests::new();
        let (id, rx) = pending.register();

        assert!(pending.cancel(id));
        assert!(!pending.cancel(id));
        // A late reply is now unknown.
        assert!(!pending.resolve(id, Ok(Value::Null)));
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_fail_all_on_teardown() {
        let pending = PendingRequests::new();
        let (_, rx1) = pending.register();
        let (_, rx2) = pending.register();

        assert_eq!(pending.fail_all(&MailboxError::ConnectionLost), 2);
        assert_eq!(pending.len(), 0);
        assert_eq!(rx1.await.unwrap(), Err(MailboxError::ConnectionLost));
        assert_eq!(rx2.await.unwrap(), Err(MailboxError::ConnectionLost));
    }
}
