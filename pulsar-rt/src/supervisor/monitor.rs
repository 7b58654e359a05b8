//! Worker pool supervision.

// Layer 1: Standard library imports
use std::collections::HashSet;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use tracing::{error, warn};

// Layer 3: Internal module imports
use super::backoff::RestartBackoff;
use crate::actor::ConcurrencyMode;
use crate::message::Value;
use crate::util::ActorId;

/// A monitor: an actor supervising a homogeneous pool of workers.
///
/// Monitors live inside the arbiter process on the arbiter's loop; they
/// have an aid and a directory entry, but no socket of their own: all
/// messages to their workers are routed through the arbiter. The
/// arbiter's periodic sweep calls [`plan_spawns`](Self::plan_spawns) and
/// [`plan_stops`](Self::plan_stops) every cycle and acts on the result.
#[derive(Debug)]
pub struct MonitorPool {
    aid: ActorId,
    name: String,
    kind: String,
    mode: ConcurrencyMode,
    target_size: usize,
    workers: HashSet<ActorId>,
    backoff: RestartBackoff,
    hold_until: Option<DateTime<Utc>>,
    stopping: bool,
    created_at: DateTime<Utc>,
}

impl MonitorPool {
    /// Create a pool that keeps `target_size` workers of `kind` alive.
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        mode: ConcurrencyMode,
        target_size: usize,
    ) -> Self {
        Self {
            aid: ActorId::new(),
            name: name.into(),
            kind: kind.into(),
            mode,
            target_size,
            workers: HashSet::new(),
            backoff: RestartBackoff::default(),
            hold_until: None,
            stopping: false,
            created_at: Utc::now(),
        }
    }

    /// The monitor's own identity.
    pub fn aid(&self) -> ActorId {
        self.aid
    }

    /// The monitor's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The worker kind this pool spawns.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Concurrency mode of the pool's workers.
    pub fn mode(&self) -> ConcurrencyMode {
        self.mode
    }

    /// The pool size the monitor maintains.
    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// Identities of the workers currently owned by this pool.
    pub fn workers(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.workers.iter().copied()
    }

    /// Number of workers currently owned.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// True when this pool owns the given worker.
    pub fn owns(&self, aid: ActorId) -> bool {
        self.workers.contains(&aid)
    }

    /// Graceful pool resize: growing spawns on the next cycle, shrinking
    /// stops surplus workers.
    pub fn manage_workers(&mut self, target: usize) {
        self.target_size = target;
    }

    /// The monitor is shutting down; no replacements from here on.
    pub fn begin_stop(&mut self) {
        self.stopping = true;
        self.target_size = 0;
    }

    /// True once shutdown began.
    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    /// Account for a newly spawned worker.
    pub fn worker_spawned(&mut self, aid: ActorId) {
        self.workers.insert(aid);
    }

    /// Release a surplus worker the monitor chose to stop.
    ///
    /// The worker leaves the pool without touching the restart backoff;
    /// its actual termination is observed later like any other.
    pub fn worker_released(&mut self, aid: ActorId) {
        self.workers.remove(&aid);
    }

    /// Account for a worker that terminated (connection lost or stale).
    ///
    /// Damps the respawn rate: replacements wait out the backoff delay.
    pub fn worker_terminated(&mut self, aid: ActorId) {
        if !self.workers.remove(&aid) {
            return;
        }
        if self.stopping {
            return;
        }
        warn!(monitor = %self.name, worker = %aid, "worker terminated");
        self.backoff.record_restart();
        if self.backoff.is_limit_exceeded() {
            error!(
                monitor = %self.name,
                "restart budget exhausted, pausing respawns"
            );
        }
        let delay = self.backoff.calculate_delay();
        self.hold_until = Utc::now().checked_add_signed(
            chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero()),
        );
    }

    /// How many workers to spawn this cycle.
    ///
    /// Zero while stopping, while the pool is at (or above) target, or
    /// while the respawn backoff holds.
    pub fn plan_spawns(&mut self) -> usize {
        if self.stopping || self.worker_count() >= self.target_size {
            return 0;
        }
        if let Some(hold_until) = self.hold_until {
            if Utc::now() < hold_until {
                return 0;
            }
            self.hold_until = None;
        }
        self.target_size - self.worker_count()
    }

    /// Which workers to stop this cycle (shrinking), surplus first.
    pub fn plan_stops(&self) -> Vec<ActorId> {
        if self.worker_count() <= self.target_size {
            return Vec::new();
        }
        let surplus = self.worker_count() - self.target_size;
        self.workers.iter().copied().take(surplus).collect()
    }

    /// Directory snapshot of this pool.
    pub fn snapshot(&self) -> Value {
        let mut map = std::collections::BTreeMap::new();
        map.insert("aid".to_owned(), Value::from(self.aid.to_string()));
        map.insert("name".to_owned(), Value::from(self.name.clone()));
        map.insert("kind".to_owned(), Value::from(self.kind.clone()));
        map.insert("target_size".to_owned(), Value::Int(self.target_size as i64));
        map.insert("workers".to_owned(), Value::Int(self.worker_count() as i64));
        map.insert(
            "uptime".to_owned(),
            Value::Int(
                Utc::now()
                    .signed_duration_since(self.created_at)
                    .num_seconds(),
            ),
        );
        Value::Map(map)
    }

    #[cfg(test)]
    fn with_backoff(mut self, backoff: RestartBackoff) -> Self {
        self.backoff = backoff;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pool(target: usize) -> MonitorPool {
        MonitorPool::new("pool", "echo", ConcurrencyMode::Thread, target).with_backoff(
            RestartBackoff::new(100, Duration::from_secs(60))
                .with_delays(Duration::ZERO, Duration::ZERO),
        )
    }

    #[test]
    fn test_fresh_pool_wants_full_complement() {
        let mut pool = pool(3);
        assert_eq!(pool.plan_spawns(), 3);
    }

    #[test]
    fn test_full_pool_wants_nothing() {
        let mut pool = pool(2);
        pool.worker_spawned(ActorId::new());
        pool.worker_spawned(ActorId::new());

        assert_eq!(pool.plan_spawns(), 0);
        assert!(pool.plan_stops().is_empty());
    }

    #[test]
    fn test_terminated_worker_is_replaced() {
        let mut pool = pool(2);
        let doomed = ActorId::new();
        pool.worker_spawned(doomed);
        pool.worker_spawned(ActorId::new());

        pool.worker_terminated(doomed);

        assert_eq!(pool.worker_count(), 1);
        assert_eq!(pool.plan_spawns(), 1);
    }

    #[test]
    fn test_no_replacement_while_stopping() {
        let mut pool = pool(2);
        let worker = ActorId::new();
        pool.worker_spawned(worker);
        pool.begin_stop();

        pool.worker_terminated(worker);

        assert_eq!(pool.plan_spawns(), 0);
        assert!(pool.is_stopping());
    }

    #[test]
    fn test_shrink_stops_surplus() {
        let mut pool = pool(3);
        for _ in 0..3 {
            pool.worker_spawned(ActorId::new());
        }

        pool.manage_workers(1);

        assert_eq!(pool.plan_stops().len(), 2);
        assert_eq!(pool.plan_spawns(), 0);
    }

    #[test]
    fn test_grow_spawns_difference() {
        let mut pool = pool(1);
        pool.worker_spawned(ActorId::new());

        pool.manage_workers(4);

        assert_eq!(pool.plan_spawns(), 3);
    }

    #[test]
    fn test_unknown_worker_termination_ignored() {
        let mut pool = pool(1);
        pool.worker_spawned(ActorId::new());

        pool.worker_terminated(ActorId::new());

        assert_eq!(pool.worker_count(), 1);
    }

    #[test]
    fn test_backoff_holds_respawn() {
        let mut pool = MonitorPool::new("pool", "echo", ConcurrencyMode::Thread, 1).with_backoff(
            RestartBackoff::new(100, Duration::from_secs(60))
                .with_delays(Duration::from_secs(60), Duration::from_secs(60)),
        );
        let worker = ActorId::new();
        pool.worker_spawned(worker);
        pool.worker_terminated(worker);

        // The hold is a minute out; this cycle plans nothing.
        assert_eq!(pool.plan_spawns(), 0);
    }

    #[test]
    fn test_snapshot_fields() {
        let mut pool = pool(2);
        pool.worker_spawned(ActorId::new());

        let snapshot = pool.snapshot();
        let map = snapshot.as_map().unwrap();
        assert_eq!(map.get("target_size"), Some(&Value::Int(2)));
        assert_eq!(map.get("workers"), Some(&Value::Int(1)));
    }
}
