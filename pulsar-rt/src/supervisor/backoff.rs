//! Respawn rate limiting and exponential backoff.
//!
//! Keeps a monitor from burning CPU respawning a worker that dies on
//! arrival: restarts are tracked in a sliding window and each consecutive
//! restart waits exponentially longer, with a little jitter so pools do
//! not respawn in lockstep.

// Layer 1: Standard library imports
use std::collections::VecDeque;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use rand::Rng;

// Layer 3: Internal module imports
// (none)

/// Default base delay between restarts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Default cap on the exponential delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Restart backoff and rate limiting.
///
/// # Sliding Window Behavior
///
/// Old restarts expire out of the window as time passes, so a worker
/// that was flapping an hour ago is not penalised now.
///
/// # Delay Formula
///
/// ```text
/// delay = base_delay * 2^(min(restarts_in_window - 1, 8)) + jitter
/// delay = min(delay, max_delay)
/// ```
#[derive(Debug, Clone)]
pub struct RestartBackoff {
    max_restarts: u32,
    restart_window: Duration,
    restart_history: VecDeque<DateTime<Utc>>,
    base_delay: Duration,
    max_delay: Duration,
}

impl RestartBackoff {
    /// Allow `max_restarts` restarts per `restart_window`.
    pub fn new(max_restarts: u32, restart_window: Duration) -> Self {
        Self {
            max_restarts,
            restart_window,
            restart_history: VecDeque::new(),
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Override the delay bounds.
    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Record a restart at the current time.
    pub fn record_restart(&mut self) {
        self.restart_history.push_front(Utc::now());
        self.expire_old();
    }

    /// Restarts currently inside the window.
    pub fn restarts_in_window(&mut self) -> u32 {
        self.expire_old();
        self.restart_history.len() as u32
    }

    /// True when the window's restart budget is spent.
    pub fn is_limit_exceeded(&mut self) -> bool {
        self.restarts_in_window() >= self.max_restarts
    }

    /// The delay to wait before the next restart attempt.
    pub fn calculate_delay(&mut self) -> Duration {
        let restarts = self.restarts_in_window();
        if restarts == 0 {
            return Duration::ZERO;
        }
        let exponent = (restarts - 1).min(8);
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent));
        let jitter_cap = (delay.as_millis() as u64 / 4).max(1);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..jitter_cap));
        (delay + jitter).min(self.max_delay)
    }

    fn expire_old(&mut self) {
        let window =
            chrono::Duration::from_std(self.restart_window).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now() - window;
        while let Some(oldest) = self.restart_history.back() {
            if *oldest < cutoff {
                self.restart_history.pop_back();
            } else {
                break;
            }
        }
    }
}

impl Default for RestartBackoff {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}
