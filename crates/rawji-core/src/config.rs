//! Converter configuration.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::conversion::VendorOpcodes;
use crate::ptp::SessionOptions;
use crate::ptp::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CONTAINER_SIZE};

/// How the delay between status polls evolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    /// Doubles after every poll, up to `max_interval_ms`.
    Exponential,
}

/// Status polling while the camera converts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    pub interval_ms: u64,
    pub max_interval_ms: u64,
    /// Give up after this long without a terminal status.
    pub max_wait_ms: u64,
    pub backoff: Backoff,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            max_interval_ms: 4000,
            max_wait_ms: 30_000,
            backoff: Backoff::Fixed,
        }
    }
}

impl PollPolicy {
    /// Delay before the poll following one that waited `current`.
    pub fn next_interval(&self, current: Duration) -> Duration {
        match self.backoff {
            Backoff::Fixed => current,
            Backoff::Exponential => (current * 2).min(Duration::from_millis(self.max_interval_ms)),
        }
    }
}

/// Retries while the camera answers DeviceBusy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusyPolicy {
    /// Consecutive busy answers tolerated before giving up.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BusyPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 200,
            max_delay_ms: 2000,
        }
    }
}

impl BusyPolicy {
    /// Delay after the `attempt`-th consecutive busy answer (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(
            self.initial_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}

/// Everything tunable about a conversion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub session_id: u32,
    /// Per-transfer timeout for command and response phases.
    pub command_timeout_ms: u64,
    /// Per-chunk timeout for data phases.
    pub data_timeout_ms: u64,
    pub chunk_size: usize,
    pub max_container_size: usize,
    pub poll: PollPolicy,
    pub busy: BusyPolicy,
    pub opcodes: VendorOpcodes,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            session_id: 1,
            command_timeout_ms: 3000,
            data_timeout_ms: 10_000,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_container_size: DEFAULT_MAX_CONTAINER_SIZE,
            poll: PollPolicy::default(),
            busy: BusyPolicy::default(),
            opcodes: VendorOpcodes::default(),
        }
    }
}

impl ConverterConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ConverterConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            command_timeout: Duration::from_millis(self.command_timeout_ms),
            data_timeout: Duration::from_millis(self.data_timeout_ms),
            chunk_size: self.chunk_size,
            max_container_size: self.max_container_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rawji.toml");

        let mut config = ConverterConfig::default();
        config.poll.backoff = Backoff::Exponential;
        config.busy.max_attempts = 9;
        config.opcodes.start_conversion = 0x9070;
        config.save_to_file(&path).unwrap();

        let loaded = ConverterConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ConverterConfig = toml::from_str(
            r#"
            command_timeout_ms = 1500

            [poll]
            max_wait_ms = 60000
            "#,
        )
        .unwrap();
        assert_eq!(config.command_timeout_ms, 1500);
        assert_eq!(config.poll.max_wait_ms, 60_000);
        assert_eq!(config.poll.interval_ms, 500);
        assert_eq!(config.busy, BusyPolicy::default());
        assert_eq!(config.opcodes, VendorOpcodes::default());
    }

    #[test]
    fn test_busy_delay_doubles_to_cap() {
        let busy = BusyPolicy::default();
        let delays: Vec<u64> = (1..=6).map(|a| busy.delay(a).as_millis() as u64).collect();
        assert_eq!(delays, vec![200, 400, 800, 1600, 2000, 2000]);
    }

    #[test]
    fn test_poll_backoff() {
        let fixed = PollPolicy::default();
        let d = Duration::from_millis(500);
        assert_eq!(fixed.next_interval(d), d);

        let exp = PollPolicy {
            backoff: Backoff::Exponential,
            ..Default::default()
        };
        assert_eq!(exp.next_interval(d), Duration::from_millis(1000));
        assert_eq!(exp.next_interval(Duration::from_millis(3000)), Duration::from_millis(4000));
    }
}
