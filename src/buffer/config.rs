use super::BufferError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What `close()` does with lines that are buffered but not yet delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClosePolicy {
    /// Deliver every buffered line before signalling end-of-stream.
    #[default]
    Drain,
    /// Drop buffered lines and end the output as soon as possible.
    Discard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Interval between load samples reported to the metric.
    #[serde(rename = "sample_interval_ms", with = "duration_serde")]
    pub sample_interval: Duration,
    /// Slots in the output channel between the drain task and the consumer.
    pub output_capacity: usize,
    pub close_policy: ClosePolicy,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(1),
            output_capacity: 1,
            close_policy: ClosePolicy::Drain,
        }
    }
}

impl BufferConfig {
    pub fn validate(&self) -> Result<(), BufferError> {
        if self.sample_interval.is_zero() {
            return Err(BufferError::InvalidConfig(
                "Sample interval must be greater than 0".to_string(),
            ));
        }

        if self.output_capacity == 0 {
            return Err(BufferError::InvalidConfig(
                "Output capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// Helper module for duration serialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
