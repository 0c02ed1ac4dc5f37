//! Attached-device detection through `adb`.
//!
//! # Requirements
//!
//! The Android platform tools must be installed for `adb` to be available,
//! either on `PATH` or at an explicit location passed to [`AdbProbe::with_path`].
//!
//! # Example
//!
//! ```no_run
//! use tapline_core::probe::{AdbProbe, DeviceProbe};
//!
//! # async fn example() {
//! let probe = AdbProbe::new();
//! if !probe.any_device_connected().await {
//!     eprintln!("connect a device or start an emulator first");
//! }
//! # }
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Answers whether a device is available for a local session.
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    async fn any_device_connected(&self) -> bool;
}

/// [`DeviceProbe`] backed by `adb devices`.
///
/// Invocations are serialized through an internal lock; concurrent `adb`
/// calls can race the adb server's startup.
#[derive(Debug)]
pub struct AdbProbe {
    adb: PathBuf,
    lock: Mutex<()>,
}

impl AdbProbe {
    /// Probe using `adb` from `PATH`.
    pub fn new() -> Self {
        Self::with_path("adb")
    }

    pub fn with_path(adb: impl Into<PathBuf>) -> Self {
        Self {
            adb: adb.into(),
            lock: Mutex::new(()),
        }
    }

    /// Serials of devices in the `device` state.
    ///
    /// # Errors
    ///
    /// Returns an error if `adb` cannot be spawned or exits unsuccessfully.
    pub async fn devices(&self) -> std::io::Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        let output = Command::new(&self.adb).arg("devices").output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(std::io::Error::other(format!(
                "adb devices exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(parse_adb_devices(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl Default for AdbProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceProbe for AdbProbe {
    async fn any_device_connected(&self) -> bool {
        match self.devices().await {
            Ok(devices) if !devices.is_empty() => {
                info!(count = devices.len(), "devices connected");
                true
            }
            Ok(_) => {
                debug!("no devices connected");
                false
            }
            Err(e) => {
                warn!(error = %e, "adb probe failed");
                false
            }
        }
    }
}

/// Serials from `adb devices` output whose state is `device`.
///
/// Offline and unauthorized entries are skipped, as is the header line.
pub fn parse_adb_devices(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim_end)
        .filter_map(|line| line.strip_suffix("\tdevice"))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_attached_devices_only() {
        let out = "List of devices attached\n\
                   emulator-5554\tdevice\n\
                   R58M12ABCDE\tunauthorized\n\
                   0123456789\toffline\n\
                   192.168.1.20:5555\tdevice\r\n\n";
        assert_eq!(parse_adb_devices(out), ["emulator-5554", "192.168.1.20:5555"]);
    }

    #[test]
    fn header_only_means_no_devices() {
        assert!(parse_adb_devices("List of devices attached\n\n").is_empty());
        assert!(parse_adb_devices("").is_empty());
    }

    #[tokio::test]
    async fn missing_binary_counts_as_no_device() {
        let probe = AdbProbe::with_path("/nonexistent/tapline/adb");
        assert!(!probe.any_device_connected().await);
    }
}
