//! Serialization helpers for common types.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Serde serialization module for Duration as whole milliseconds.
///
/// The runtime's intervals go below one second (the heartbeat default is
/// 2 s but tests and tuned deployments use fractions), so second
/// granularity would truncate them.
pub mod duration_serde {
    use super::*;

    /// Serializes Duration as milliseconds (u64).
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    /// Deserializes Duration from milliseconds (u64).
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct TestStruct {
        #[serde(with = "duration_serde")]
        duration: Duration,
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_duration_serde_roundtrip() {
        let original = TestStruct {
            duration: Duration::from_secs(30),
        };

        let json = serde_json::to_string(&original).expect("Serialization should succeed");
        assert!(json.contains("30000"));

        let deserialized: TestStruct =
            serde_json::from_str(&json).expect("Deserialization should succeed");
        assert_eq!(original, deserialized);
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_duration_serde_subsecond() {
        let original = TestStruct {
            duration: Duration::from_millis(250),
        };

        let json = serde_json::to_string(&original).expect("Serialization should succeed");
        assert!(json.contains("250"));

        let deserialized: TestStruct =
            serde_json::from_str(&json).expect("Deserialization should succeed");
        assert_eq!(original.duration, deserialized.duration);
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_duration_serde_zero() {
        let test = TestStruct {
            duration: Duration::from_secs(0),
        };

        let json = serde_json::to_string(&test).expect("Serialization should succeed");
        let deserialized: TestStruct =
            serde_json::from_str(&json).expect("Deserialization should succeed");
        assert_eq!(test.duration, deserialized.duration);
    }
}
