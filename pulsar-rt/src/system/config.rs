//! Runtime configuration with sensible defaults.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::message::DEFAULT_MAX_FRAME_SIZE;
use crate::util::duration_serde;

/// Default heartbeat period: each actor notifies its supervisor this often.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// Default deadline for a spawned actor's handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default staleness bound: a child silent this long is killed.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for graceful shutdown before force-termination.
pub const DEFAULT_GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime-wide configuration.
///
/// # Examples
///
/// ```rust
/// use pulsar_rt::system::RuntimeConfig;
/// use std::time::Duration;
///
/// let config = RuntimeConfig::default();
/// assert_eq!(config.heartbeat_interval, Duration::from_secs(2));
///
/// let config = RuntimeConfig::builder()
///     .with_handshake_timeout(Duration::from_secs(10))
///     .build()
///     .unwrap();
/// assert_eq!(config.handshake_timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Period of each actor's notify heartbeat
    #[serde(with = "duration_serde")]
    pub heartbeat_interval: Duration,

    /// Deadline for a spawned actor's handshake
    #[serde(with = "duration_serde")]
    pub handshake_timeout: Duration,

    /// Supervisor-side staleness bound on child heartbeats
    #[serde(with = "duration_serde")]
    pub heartbeat_timeout: Duration,

    /// Graceful shutdown deadline before force-termination
    #[serde(with = "duration_serde")]
    pub graceful_timeout: Duration,

    /// Cap on a single mailbox frame's payload
    pub max_frame_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            graceful_timeout: DEFAULT_GRACEFUL_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl RuntimeConfig {
    /// Create a configuration builder.
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.heartbeat_interval.is_zero() {
            return Err("heartbeat_interval must be > 0".to_owned());
        }
        if self.handshake_timeout.is_zero() {
            return Err("handshake_timeout must be > 0".to_owned());
        }
        if self.heartbeat_timeout < self.heartbeat_interval {
            return Err("heartbeat_timeout must be >= heartbeat_interval".to_owned());
        }
        if self.graceful_timeout.is_zero() {
            return Err("graceful_timeout must be > 0".to_owned());
        }
        if self.max_frame_size == 0 {
            return Err("max_frame_size must be > 0".to_owned());
        }
        Ok(())
    }
}

/// Builder for [`RuntimeConfig`] with a fluent API.
#[derive(Debug, Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    /// Set the heartbeat period.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Set the handshake deadline.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set the supervisor-side staleness bound.
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.config.heartbeat_timeout = timeout;
        self
    }

    /// Set the graceful shutdown deadline.
    pub fn with_graceful_timeout(mut self, timeout: Duration) -> Self {
        self.config.graceful_timeout = timeout;
        self
    }

    /// Set the frame payload cap.
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Build and validate.
    pub fn build(self) -> Result<RuntimeConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(2));
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(30));
        assert_eq!(config.graceful_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_heartbeat_rejected() {
        let result = RuntimeConfig::builder()
            .with_heartbeat_interval(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_heartbeat_timeout_must_cover_interval() {
        let result = RuntimeConfig::builder()
            .with_heartbeat_interval(Duration::from_secs(10))
            .with_heartbeat_timeout(Duration::from_secs(5))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_frame_size_rejected() {
        let result = RuntimeConfig::builder().with_max_frame_size(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = RuntimeConfig::builder()
            .with_heartbeat_interval(Duration::from_millis(500))
            .with_handshake_timeout(Duration::from_secs(1))
            .with_heartbeat_timeout(Duration::from_secs(3))
            .with_graceful_timeout(Duration::from_secs(7))
            .with_max_frame_size(1024)
            .build()
            .unwrap();

        assert_eq!(config.heartbeat_interval, Duration::from_millis(500));
        assert_eq!(config.handshake_timeout, Duration::from_secs(1));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(3));
        assert_eq!(config.graceful_timeout, Duration::from_secs(7));
        assert_eq!(config.max_frame_size, 1024);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = RuntimeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let decoded: RuntimeConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.heartbeat_interval, decoded.heartbeat_interval);
        assert_eq!(config.max_frame_size, decoded.max_frame_size);
    }
}
