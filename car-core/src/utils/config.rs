//! Runtime configuration for the car node.
//!
//! Every field has a default matching the reference firmware, so a partial
//! JSON document only needs to name the values it overrides.

use alloc::{format, string::String};
use core::fmt;

use embassy_time::Duration;
use serde::Deserialize;

/// Errors reported by [`CarConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The command timeout must outlast at least one poll period.
    TimeoutNotAbovePollPeriod { timeout_ms: u64, poll_period_ms: u64 },
    /// An interval that drives the loop cadence was zero.
    ZeroInterval(&'static str),
    /// An identifier used in topic names or client ids was empty.
    EmptyIdentifier(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ConfigError::TimeoutNotAbovePollPeriod {
                timeout_ms,
                poll_period_ms,
            } => write!(
                f,
                "command timeout ({timeout_ms} ms) must be greater than the poll period ({poll_period_ms} ms)"
            ),
            ConfigError::ZeroInterval(name) => write!(f, "{name} must be non-zero"),
            ConfigError::EmptyIdentifier(name) => write!(f, "{name} must not be empty"),
        }
    }
}

/// Node identity, broker location and loop timing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CarConfig {
    /// Leading topic segment shared by every car.
    pub namespace: String,
    pub device_id: String,
    /// Client ids are `{prefix}-{random hex}` so rapid reconnects never collide.
    pub client_id_prefix: String,
    /// Reported in the status announcement.
    pub firmware: String,
    pub broker_host: String,
    pub broker_port: u16,
    pub poll_period_ms: u64,
    /// A non-stop intent older than this reverts to stop.
    pub command_timeout_ms: u64,
    pub telemetry_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Echoes further than this are reported as out of range.
    pub max_distance_cm: u32,
}

impl Default for CarConfig {
    fn default() -> Self {
        CarConfig {
            namespace: "iot-car".into(),
            device_id: "car-001".into(),
            client_id_prefix: "esp32-car-001".into(),
            firmware: "test-v1.0".into(),
            broker_host: "host.wokwi.internal".into(),
            broker_port: 1883,
            poll_period_ms: 50,
            command_timeout_ms: 2000,
            telemetry_interval_ms: 5000,
            reconnect_delay_ms: 5000,
            heartbeat_interval_ms: 1000,
            max_distance_cm: 400,
        }
    }
}

impl CarConfig {
    /// Check the cross-field constraints the control loop relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::EmptyIdentifier("namespace"));
        }
        if self.device_id.is_empty() {
            return Err(ConfigError::EmptyIdentifier("device_id"));
        }
        if self.client_id_prefix.is_empty() {
            return Err(ConfigError::EmptyIdentifier("client_id_prefix"));
        }

        for (name, value) in [
            ("poll_period_ms", self.poll_period_ms),
            ("telemetry_interval_ms", self.telemetry_interval_ms),
            ("reconnect_delay_ms", self.reconnect_delay_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval(name));
            }
        }

        if self.command_timeout_ms <= self.poll_period_ms {
            return Err(ConfigError::TimeoutNotAbovePollPeriod {
                timeout_ms: self.command_timeout_ms,
                poll_period_ms: self.poll_period_ms,
            });
        }

        Ok(())
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// Topic names scoped to one device: `{namespace}/{device_id}/{leaf}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Outbound sensor samples, not retained.
    pub telemetry: String,
    /// Inbound actuation commands and probes.
    pub command: String,
    /// Retained presence; also the last-will target.
    pub status: String,
    /// Per-command acknowledgements.
    pub response: String,
}

impl Topics {
    pub fn new(
        namespace: &str,
        device_id: &str,
    ) -> Self {
        let scoped = |leaf: &str| format!("{namespace}/{device_id}/{leaf}");
        Topics {
            telemetry: scoped("telemetry"),
            command: scoped("command"),
            status: scoped("status"),
            response: scoped("response"),
        }
    }

    pub fn from_config(config: &CarConfig) -> Self {
        Self::new(&config.namespace, &config.device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(CarConfig::default().validate(), Ok(()));
    }

    #[test]
    fn timeout_must_exceed_poll_period() {
        let config = CarConfig {
            poll_period_ms: 2000,
            ..CarConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::TimeoutNotAbovePollPeriod {
                timeout_ms: 2000,
                poll_period_ms: 2000,
            })
        );
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let config = CarConfig {
            telemetry_interval_ms: 0,
            ..CarConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroInterval("telemetry_interval_ms"))
        );
    }

    #[test]
    fn partial_documents_keep_defaults() {
        let config: CarConfig =
            serde_json::from_str(r#"{"device_id":"car-042","command_timeout_ms":1500}"#).unwrap();
        assert_eq!(config.device_id, "car-042");
        assert_eq!(config.command_timeout_ms, 1500);
        assert_eq!(config.reconnect_delay_ms, 5000);
        assert_eq!(config.namespace, "iot-car");
    }

    #[test]
    fn topics_are_scoped_by_device() {
        let topics = Topics::from_config(&CarConfig::default());
        assert_eq!(topics.telemetry, "iot-car/car-001/telemetry");
        assert_eq!(topics.command, "iot-car/car-001/command");
        assert_eq!(topics.status, "iot-car/car-001/status");
        assert_eq!(topics.response, "iot-car/car-001/response");
    }
}
