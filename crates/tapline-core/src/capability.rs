//! Capability resolution.
//!
//! Turns a device selection into the immutable [`CapabilitySet`] a session is
//! started with. Two paths exist:
//!
//! - [`CapabilityResolver::resolve`] for a locally attached device: the device
//!   partition is applied first, then the global partition, so global values
//!   win on overlapping keys.
//! - [`CapabilityResolver::resolve_remote`] for a cloud device provider,
//!   built from [`RemoteCredentials`] and a [`RemoteDeviceSpec`].
//!
//! Both paths validate the merged set and fail with
//! [`Error::Configuration`] naming every missing key before any session is
//! created.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::config::{CapabilityPartition, CapabilitySource, ConfigSource};
use crate::error::{Error, Result};

/// Keys every local session must carry after merging.
pub const REQUIRED_KEYS: [&str; 8] = [
    "platformName",
    "deviceName",
    "platformVersion",
    "udid",
    "automationName",
    "app",
    "appPackage",
    "appActivity",
];

/// Keys every remote-provider session must carry.
pub const REMOTE_REQUIRED_KEYS: [&str; 4] =
    ["platformName", "deviceName", "platformVersion", "app"];

/// Ordered capability name to value mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(Map<String, Value>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value for `key`, if it is a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Sets `key`, replacing any previous value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Applies `partition` on top of the current values (last writer wins).
    pub fn merge(&mut self, partition: &CapabilityPartition) {
        for (key, value) in partition {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// True when `key` is present with a non-null, non-blank value.
    pub fn has_value(&self, key: &str) -> bool {
        match self.0.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        }
    }

    /// Keys from `required` without a value, in the order given.
    pub fn missing<'a>(&self, required: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        required
            .into_iter()
            .filter(|key| !self.has_value(key))
            .map(str::to_string)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Copy with secret values masked, for logging.
    pub fn redacted(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(k, v)| {
                if k.ends_with(".key") || k.ends_with("accessKey") {
                    (k.clone(), Value::String("***".into()))
                } else {
                    (k.clone(), v.clone())
                }
            })
            .collect()
    }
}

impl From<CapabilityPartition> for CapabilitySet {
    fn from(map: CapabilityPartition) -> Self {
        Self(map)
    }
}

/// Account credentials for a remote device provider.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCredentials {
    pub user: String,
    pub key: String,
}

impl RemoteCredentials {
    pub fn new(user: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            key: key.into(),
        }
    }

    /// Reads `browserstack.user` and `browserstack.key`.
    pub fn from_config(config: &dyn ConfigSource) -> Result<Self> {
        let user = config.get("browserstack.user");
        let key = config.get("browserstack.key");
        let mut missing = Vec::new();
        if is_blank(&user) {
            missing.push("browserstack.user".to_string());
        }
        if is_blank(&key) {
            missing.push("browserstack.key".to_string());
        }
        match (user, key) {
            (Some(user), Some(key)) if missing.is_empty() => Ok(Self { user, key }),
            _ => {
                error!(missing = ?missing, "remote provider credentials not configured");
                Err(Error::missing_keys("remote credentials", missing))
            }
        }
    }
}

impl fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("user", &self.user)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Device selection on a remote provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDeviceSpec {
    pub platform_name: String,
    pub device_name: String,
    pub platform_version: String,
    /// Provider-side reference to the uploaded application.
    pub app_url: String,
    pub debug: bool,
    pub project: Option<String>,
    pub build: Option<String>,
    pub session_name: Option<String>,
}

impl RemoteDeviceSpec {
    /// Reads the `browserstack.*` device keys.
    ///
    /// `browserstack.platform.name` defaults to `Android` and
    /// `browserstack.debug` to `false`. Every missing required key is named in
    /// the error.
    pub fn from_config(config: &dyn ConfigSource) -> Result<Self> {
        let platform_name = config.get_or("browserstack.platform.name", "Android");
        let device_name = config.get("browserstack.device.name");
        let platform_version = config.get("browserstack.platform.version");
        let app_url = config.get("browserstack.app.url");

        let mut missing = Vec::new();
        if platform_name.trim().is_empty() {
            missing.push("browserstack.platform.name".to_string());
        }
        if is_blank(&device_name) {
            missing.push("browserstack.device.name".to_string());
        }
        if is_blank(&platform_version) {
            missing.push("browserstack.platform.version".to_string());
        }
        if is_blank(&app_url) {
            missing.push("browserstack.app.url".to_string());
        }
        if !missing.is_empty() {
            error!(missing = ?missing, "remote device spec incomplete");
            return Err(Error::missing_keys("remote device settings", missing));
        }

        let debug = config
            .get_or("browserstack.debug", "false")
            .trim()
            .eq_ignore_ascii_case("true");

        Ok(Self {
            platform_name,
            device_name: device_name.unwrap_or_default(),
            platform_version: platform_version.unwrap_or_default(),
            app_url: app_url.unwrap_or_default(),
            debug,
            project: config.get("browserstack.project"),
            build: config.get("browserstack.build"),
            session_name: config.get("browserstack.session.name"),
        })
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Resolves capability sets from a [`CapabilitySource`].
///
/// Stateless apart from the borrowed source; safe to share and reuse.
pub struct CapabilityResolver<'a> {
    source: &'a dyn CapabilitySource,
    required: Vec<String>,
}

impl<'a> CapabilityResolver<'a> {
    /// Resolver enforcing [`REQUIRED_KEYS`].
    pub fn new(source: &'a dyn CapabilitySource) -> Self {
        Self {
            source,
            required: REQUIRED_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Replaces the required-key set.
    pub fn with_required<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Merge the device partition with the global partition and validate.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] if either identifier is blank, if the device
    ///   is unknown, or if any required key is missing after the merge.
    pub fn resolve(&self, device_type: &str, device_key: &str) -> Result<CapabilitySet> {
        if device_type.trim().is_empty() || device_key.trim().is_empty() {
            return Err(Error::configuration(format!(
                "Device type or name not specified (type: '{device_type}', name: '{device_key}')"
            )));
        }

        let device = self
            .source
            .device_partition(device_type, device_key)
            .ok_or_else(|| {
                error!(device_type, device_key, "no capabilities for device");
                Error::configuration(format!(
                    "No capabilities found for device type '{device_type}', device '{device_key}'"
                ))
            })?;
        let global = self.source.global_partition();

        let mut caps = CapabilitySet::new();
        caps.merge(&device);
        caps.merge(&global);
        debug!(
            device_type,
            device_key,
            device_keys = device.len(),
            global_keys = global.len(),
            "merged capability partitions"
        );

        let missing = caps.missing(self.required.iter().map(String::as_str));
        if !missing.is_empty() {
            error!(missing = ?missing, "missing required capabilities");
            return Err(Error::missing_keys("capabilities", missing));
        }

        info!(device_type, device_key, keys = caps.len(), "resolved capabilities");
        Ok(caps)
    }

    /// Build and validate capabilities for a remote provider session.
    pub fn resolve_remote(
        &self,
        credentials: &RemoteCredentials,
        spec: &RemoteDeviceSpec,
    ) -> Result<CapabilitySet> {
        let mut missing = Vec::new();
        if credentials.user.trim().is_empty() {
            missing.push("browserstack.user".to_string());
        }
        if credentials.key.trim().is_empty() {
            missing.push("browserstack.key".to_string());
        }
        if !missing.is_empty() {
            return Err(Error::missing_keys("remote credentials", missing));
        }

        let mut caps = CapabilitySet::new();
        caps.insert("browserstack.user", credentials.user.clone());
        caps.insert("browserstack.key", credentials.key.clone());
        caps.insert("platformName", spec.platform_name.clone());
        caps.insert("deviceName", spec.device_name.clone());
        caps.insert("platformVersion", spec.platform_version.clone());
        caps.insert("app", spec.app_url.clone());
        if let Some(project) = &spec.project {
            caps.insert("project", project.clone());
        }
        if let Some(build) = &spec.build {
            caps.insert("build", build.clone());
        }
        if let Some(name) = &spec.session_name {
            caps.insert("name", name.clone());
        }
        caps.insert("browserstack.debug", spec.debug);

        let missing = caps.missing(REMOTE_REQUIRED_KEYS);
        if !missing.is_empty() {
            error!(missing = ?missing, "missing required remote capabilities");
            return Err(Error::missing_keys("capabilities", missing));
        }

        info!(
            device = %spec.device_name,
            platform_version = %spec.platform_version,
            "resolved remote capabilities"
        );
        Ok(caps)
    }
}
