//! Configuration collaborators and core tunables.
//!
//! The core does not read property files. A harness hands it a
//! [`ConfigSource`] for scalar settings and a [`CapabilitySource`] for
//! capability partitions; [`MapConfig`] and [`StaticCapabilities`] are the
//! in-memory implementations used by tests and by harnesses that already hold
//! their settings in memory.
//!
//! # Example
//!
//! ```
//! use tapline_core::config::{CoreSettings, MapConfig};
//!
//! let config = MapConfig::new()
//!     .with("default.wait.seconds", "5")
//!     .with("max.retries", "4");
//!
//! let settings = CoreSettings::from_config(&config).unwrap();
//! assert_eq!(settings.default_wait.as_secs(), 5);
//! assert_eq!(settings.max_retries, 4);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

pub const DEFAULT_WAIT_SECONDS: &str = "default.wait.seconds";
pub const DEFAULT_WAIT_POLLING_MILLIS: &str = "default.wait.polling.millis";
pub const MAX_RETRIES: &str = "max.retries";
pub const RETRY_DELAY_SECONDS: &str = "retry.delay.seconds";

/// Key/value lookup for scalar settings.
pub trait ConfigSource: Send + Sync {
    /// Raw value for `key`, if set.
    fn get(&self, key: &str) -> Option<String>;

    /// Value for `key`, or `default` when unset.
    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Non-empty value for `key`, or a configuration error naming it.
    fn require(&self, key: &str) -> Result<String> {
        match self.get(key) {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(Error::missing_keys("setting", vec![key.to_string()])),
        }
    }
}

/// In-memory [`ConfigSource`].
#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    values: HashMap<String, String>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ConfigSource for MapConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// One partition of capabilities, in declaration order.
pub type CapabilityPartition = Map<String, Value>;

/// Supplies the per-device and global capability partitions.
pub trait CapabilitySource: Send + Sync {
    /// Capabilities for one device, or `None` if the device is unknown.
    fn device_partition(&self, device_type: &str, device_key: &str) -> Option<CapabilityPartition>;

    /// Capabilities applied to every device. May be empty.
    fn global_partition(&self) -> CapabilityPartition;
}

/// In-memory [`CapabilitySource`].
///
/// The serde layout mirrors the usual device catalogue shape: device types
/// mapping to named devices, plus a `global-settings` object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticCapabilities {
    #[serde(default)]
    devices: BTreeMap<String, BTreeMap<String, CapabilityPartition>>,
    #[serde(default, rename = "global-settings")]
    global: CapabilityPartition,
}

impl StaticCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(
        mut self,
        device_type: impl Into<String>,
        device_key: impl Into<String>,
        partition: CapabilityPartition,
    ) -> Self {
        self.devices
            .entry(device_type.into())
            .or_default()
            .insert(device_key.into(), partition);
        self
    }

    pub fn with_global(mut self, partition: CapabilityPartition) -> Self {
        self.global = partition;
        self
    }
}

impl CapabilitySource for StaticCapabilities {
    fn device_partition(&self, device_type: &str, device_key: &str) -> Option<CapabilityPartition> {
        self.devices
            .get(device_type)
            .and_then(|devices| devices.get(device_key))
            .cloned()
    }

    fn global_partition(&self) -> CapabilityPartition {
        self.global.clone()
    }
}

/// Tunables shared by the wait engine and the retry fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreSettings {
    /// Timeout for waits that do not override it.
    pub default_wait: Duration,
    /// Delay between condition evaluations.
    pub poll_interval: Duration,
    /// Attempts per retried lookup.
    pub max_retries: u32,
    /// Delay between retried lookups.
    pub retry_delay: Duration,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            default_wait: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl CoreSettings {
    /// Reads the tunables from `config`, falling back to defaults for unset
    /// keys.
    ///
    /// A value that is set but not a non-negative integer is a configuration
    /// error, as is `max.retries = 0` or `default.wait.polling.millis = 0`.
    pub fn from_config(config: &dyn ConfigSource) -> Result<Self> {
        let defaults = Self::default();

        let default_wait =
            parse_u64(config, DEFAULT_WAIT_SECONDS, defaults.default_wait.as_secs())?;
        let poll_millis = parse_u64(
            config,
            DEFAULT_WAIT_POLLING_MILLIS,
            defaults.poll_interval.as_millis() as u64,
        )?;
        let max_retries = parse_u64(config, MAX_RETRIES, u64::from(defaults.max_retries))?;
        let retry_delay = parse_u64(config, RETRY_DELAY_SECONDS, defaults.retry_delay.as_secs())?;

        if poll_millis == 0 {
            return Err(Error::configuration(format!(
                "{DEFAULT_WAIT_POLLING_MILLIS} must be greater than zero"
            )));
        }
        let max_retries = u32::try_from(max_retries)
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| {
                Error::configuration(format!("{MAX_RETRIES} must be between 1 and {}", u32::MAX))
            })?;

        Ok(Self {
            default_wait: Duration::from_secs(default_wait),
            poll_interval: Duration::from_millis(poll_millis),
            max_retries,
            retry_delay: Duration::from_secs(retry_delay),
        })
    }
}

fn parse_u64(config: &dyn ConfigSource, key: &str, default: u64) -> Result<u64> {
    match config.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
            Error::configuration(format!("{key} must be a non-negative integer, got '{raw}'"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_when_unset() {
        let settings = CoreSettings::from_config(&MapConfig::new()).unwrap();
        assert_eq!(settings, CoreSettings::default());
        assert_eq!(settings.default_wait, Duration::from_secs(10));
        assert_eq!(settings.poll_interval, Duration::from_millis(500));
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.retry_delay, Duration::from_secs(1));
    }

    #[test]
    fn reads_all_tunables() {
        let config: MapConfig = [
            (DEFAULT_WAIT_SECONDS, "20"),
            (DEFAULT_WAIT_POLLING_MILLIS, "250"),
            (MAX_RETRIES, "5"),
            (RETRY_DELAY_SECONDS, "2"),
        ]
        .into_iter()
        .collect();
        let settings = CoreSettings::from_config(&config).unwrap();
        assert_eq!(settings.default_wait, Duration::from_secs(20));
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.retry_delay, Duration::from_secs(2));
    }

    #[test]
    fn rejects_non_numeric() {
        let config = MapConfig::new().with(DEFAULT_WAIT_SECONDS, "ten");
        let err = CoreSettings::from_config(&config).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("default.wait.seconds"));
    }

    #[test]
    fn rejects_zero_retries_and_zero_polling() {
        let config = MapConfig::new().with(MAX_RETRIES, "0");
        assert!(CoreSettings::from_config(&config).is_err());

        let config = MapConfig::new().with(DEFAULT_WAIT_POLLING_MILLIS, "0");
        assert!(CoreSettings::from_config(&config).is_err());
    }

    #[test]
    fn require_rejects_blank() {
        let config = MapConfig::new().with("appium.host", "  ");
        let err = config.require("appium.host").unwrap_err();
        match err {
            Error::Configuration { missing, .. } => assert_eq!(missing, ["appium.host"]),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(config.get_or("appium.port", "4723"), "4723");
    }

    #[test]
    fn static_capabilities_lookup() {
        let mut pixel = CapabilityPartition::new();
        pixel.insert("deviceName".into(), json!("Pixel 7"));
        let source = StaticCapabilities::new().with_device("real", "pixel7", pixel);

        let found = source.device_partition("real", "pixel7").unwrap();
        assert_eq!(found["deviceName"], json!("Pixel 7"));
        assert!(source.device_partition("real", "missing").is_none());
        assert!(source.device_partition("emulator", "pixel7").is_none());
        assert!(source.global_partition().is_empty());
    }

    #[test]
    fn static_capabilities_deserialize_catalogue_layout() {
        let source: StaticCapabilities = serde_json::from_value(json!({
            "devices": {
                "emulator": { "pixel": { "platformName": "Android" } }
            },
            "global-settings": { "showAppiumLogs": false }
        }))
        .unwrap();
        assert_eq!(
            source.device_partition("emulator", "pixel").unwrap()["platformName"],
            json!("Android")
        );
        assert_eq!(source.global_partition()["showAppiumLogs"], json!(false));
    }
}
