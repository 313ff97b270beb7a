use std::time::Duration;
use serde::Deserialize;
use uuid::Uuid;

use crate::device::constants::{LEFT_CHANNEL_CHARACTERISTIC, RIGHT_CHANNEL_CHARACTERISTIC};
use crate::error::ConfigError;
use crate::session::SessionOptions;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub scan_timeout_secs: u64,
    pub aggregate_interval_secs: u64,
    pub left_characteristic: String,
    pub right_characteristic: String,
    pub device_name_filter: Option<String>,
    pub good_signal_only: bool,
    /// How many readings per channel the live display keeps.
    pub live_window: usize,
    /// How many interval aggregates the summary keeps.
    pub aggregate_history: usize,
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scan_timeout_secs: 5,
            aggregate_interval_secs: 10,
            left_characteristic: LEFT_CHANNEL_CHARACTERISTIC.to_string(),
            right_characteristic: RIGHT_CHANNEL_CHARACTERISTIC.to_string(),
            device_name_filter: None,
            good_signal_only: false,
            live_window: 15,
            aggregate_history: 5,
            event_buffer: 64,
        }
    }
}

fn parse_uuid(value: &str) -> Result<Uuid, ConfigError> {
    Uuid::parse_str(value).map_err(|source| ConfigError::InvalidUuid { value: value.to_string(), source })
}

fn require_positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    match value {
        0 => Err(ConfigError::InvalidValue { field, reason: "must be greater than zero".to_string() }),
        _ => Ok(()),
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("scanTimeoutSecs", self.scan_timeout_secs)?;
        require_positive("aggregateIntervalSecs", self.aggregate_interval_secs)?;
        require_positive("liveWindow", self.live_window as u64)?;
        require_positive("aggregateHistory", self.aggregate_history as u64)?;
        require_positive("eventBuffer", self.event_buffer as u64)?;

        let (left, right) = self.characteristic_uuids()?;
        if left == right {
            return Err(ConfigError::InvalidValue {
                field: "rightCharacteristic",
                reason: "must differ from leftCharacteristic".to_string(),
            });
        }
        Ok(())
    }

    pub fn characteristic_uuids(&self) -> Result<(Uuid, Uuid), ConfigError> {
        Ok((parse_uuid(&self.left_characteristic)?, parse_uuid(&self.right_characteristic)?))
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            aggregate_interval: Duration::from_secs(self.aggregate_interval_secs),
            good_signal_only: self.good_signal_only,
            device_name_filter: self.device_name_filter.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.session_options().aggregate_interval, Duration::from_secs(10));
        assert_eq!(config.scan_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: Config = serde_json::from_str(r#"{"goodSignalOnly": true, "deviceNameFilter": "mindease"}"#).unwrap();
        assert!(config.good_signal_only);
        assert_eq!(config.device_name_filter.as_deref(), Some("mindease"));
        assert_eq!(config.aggregate_interval_secs, 10);
        assert_eq!(config.live_window, 15);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = Config { aggregate_interval_secs: 0, ..Config::default() };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { field: "aggregateIntervalSecs", .. })));
    }

    #[test]
    fn bad_characteristics_are_rejected() {
        let config = Config { left_characteristic: "not-a-uuid".to_string(), ..Config::default() };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUuid { .. })));

        let config = Config { right_characteristic: LEFT_CHANNEL_CHARACTERISTIC.to_string(), ..Config::default() };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { field: "rightCharacteristic", .. })));
    }
}
