use serde::Deserialize;

use crate::error::ConfigError;

fn default_flush_threshold() -> usize {
    700
}

fn default_max_buffer_depth() -> usize {
    // 10x the default threshold; validated against the effective threshold
    7000
}

fn default_flush_timeout_ms() -> u64 {
    30_000
}

fn default_key_prefix() -> String {
    "sensor_data/batch_".into()
}

fn default_alarm_multiple() -> usize {
    3
}

/// Accumulator configuration.
///
/// The flush threshold is configuration, not law — the historical 700 is
/// only the default. `max_buffer_depth` is the hard backpressure ceiling
/// past which new records are rejected instead of buffered.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    #[serde(default = "default_max_buffer_depth")]
    pub max_buffer_depth: usize,

    /// Bound on a single durable write; a timed-out flush is treated as
    /// `Unavailable` and retried on a later invocation.
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,

    /// Object key prefix for flushed batches.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Buffer depth (in multiples of the threshold) past which a
    /// non-retryable sink failure is escalated to an alerting-grade log.
    #[serde(default = "default_alarm_multiple")]
    pub alarm_multiple: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            flush_threshold: default_flush_threshold(),
            max_buffer_depth: default_max_buffer_depth(),
            flush_timeout_ms: default_flush_timeout_ms(),
            key_prefix: default_key_prefix(),
            alarm_multiple: default_alarm_multiple(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_threshold == 0 {
            return Err(ConfigError::Invalid {
                name: "flush_threshold",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_buffer_depth <= self.flush_threshold {
            return Err(ConfigError::Invalid {
                name: "max_buffer_depth",
                reason: format!(
                    "must exceed flush_threshold ({})",
                    self.flush_threshold
                ),
            });
        }
        if self.flush_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "flush_timeout_ms",
                reason: "must be non-zero".into(),
            });
        }
        if self.alarm_multiple == 0 {
            return Err(ConfigError::Invalid {
                name: "alarm_multiple",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}
