//! Coarse per-loop clock.
//!
//! Protocols stamp `last change` on every read without touching the system
//! clock: a single background task per event loop refreshes an atomic
//! seconds counter twice a second and every protocol reads that.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

// Layer 2: Third-party crate imports
use tokio::time::{interval, Instant};

// Layer 3: Internal module imports
// (none)

/// Refresh period of the coarse clock.
pub const TICK: Duration = Duration::from_millis(500);

struct TrackerInner {
    started: Instant,
    seconds: AtomicU64,
}

/// Shared monotonic coarse clock, in whole seconds since creation.
///
/// Cloning shares the counter. The background task stops on its own once
/// every clone is gone.
///
/// # Example
/// ```rust,no_run
/// use pulsar_rt::protocol::TimeTracker;
///
/// # async fn demo() {
/// let time = TimeTracker::start();
/// let now = time.current_time(); // whole seconds, no syscall
/// # let _ = now;
/// # }
/// ```
#[derive(Clone)]
pub struct TimeTracker {
    inner: Arc<TrackerInner>,
}

impl TimeTracker {
    /// Create the clock and spawn its refresh task on the current runtime.
    pub fn start() -> Self {
        let tracker = Self {
            inner: Arc::new(TrackerInner {
                started: Instant::now(),
                seconds: AtomicU64::new(0),
            }),
        };

        let weak: Weak<TrackerInner> = Arc::downgrade(&tracker.inner);
        tokio::spawn(async move {
            let mut tick = interval(TICK);
            loop {
                tick.tick().await;
                match weak.upgrade() {
                    Some(inner) => {
                        let elapsed = inner.started.elapsed().as_secs();
                        inner.seconds.store(elapsed, Ordering::Relaxed);
                    }
                    None => break,
                }
            }
        });

        tracker
    }

    /// Current coarse time in whole seconds since the tracker started.
    pub fn current_time(&self) -> u64 {
        self.inner.seconds.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for TimeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeTracker")
            .field("current_time", &self.current_time())
            .finish()
    }
}
