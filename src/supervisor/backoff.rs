//! Reconnect backoff policy

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay schedule between reconnect attempts
///
/// Attempt `n` (1-based) waits `backoff_pattern_ms[n - 1]`; once the pattern
/// is exhausted every further attempt waits `sustained_delay_ms`. The default
/// empty pattern gives a constant 5 second delay. Retries are unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default)]
    pub backoff_pattern_ms: Vec<u64>,
    #[serde(default = "default_sustained_delay_ms")]
    pub sustained_delay_ms: u64,
}

fn default_sustained_delay_ms() -> u64 {
    5000
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            backoff_pattern_ms: Vec::new(),
            sustained_delay_ms: default_sustained_delay_ms(),
        }
    }
}

impl BackoffConfig {
    pub fn constant(delay: Duration) -> Self {
        Self {
            backoff_pattern_ms: Vec::new(),
            sustained_delay_ms: delay.as_millis() as u64,
        }
    }

    /// Delay before reconnect attempt `attempt` (pure function)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        let millis = self
            .backoff_pattern_ms
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay_ms);
        Duration::from_millis(millis)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sustained_delay_ms == 0 {
            return Err("supervisor.sustained_delay_ms must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_constant_five_seconds() {
        let backoff = BackoffConfig::default();
        for attempt in [1, 2, 10, 1000] {
            assert_eq!(backoff.delay_for(attempt), Duration::from_secs(5));
        }
    }

    #[test]
    fn test_pattern_then_sustain() {
        let backoff = BackoffConfig {
            backoff_pattern_ms: vec![100, 500, 2000],
            sustained_delay_ms: 10_000,
        };

        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(2000));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(10_000));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_millis(10_000));
    }

    #[test]
    fn test_attempt_zero_uses_first_entry() {
        let backoff = BackoffConfig {
            backoff_pattern_ms: vec![250],
            sustained_delay_ms: 1000,
        };
        assert_eq!(backoff.delay_for(0), Duration::from_millis(250));
    }

    #[test]
    fn test_validate_rejects_zero_sustained_delay() {
        let backoff = BackoffConfig {
            backoff_pattern_ms: vec![],
            sustained_delay_ms: 0,
        };
        assert!(backoff.validate().is_err());
        assert!(BackoffConfig::default().validate().is_ok());
    }

    #[test]
    fn test_deserialize_defaults() {
        let backoff: BackoffConfig = toml::from_str("").unwrap();
        assert_eq!(backoff, BackoffConfig::default());

        let backoff: BackoffConfig = toml::from_str("backoff_pattern_ms = [50, 100]").unwrap();
        assert_eq!(backoff.backoff_pattern_ms, vec![50, 100]);
        assert_eq!(backoff.sustained_delay_ms, 5000);
    }
}
