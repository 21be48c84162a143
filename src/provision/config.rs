//! Provisioning run configuration.

use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

/// Device login credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_password")]
    pub password: SecretString,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: default_password(),
        }
    }
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_password() -> SecretString {
    SecretString::from("moxa".to_string())
}

/// Configuration for one provisioning run.
///
/// The timing knobs default to the values the workflow was calibrated
/// against; tests shrink them to keep runs fast.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionConfig {
    /// Address the factory-fresh device currently answers on.
    pub current_host: String,

    /// Management address the device moves to during phase 1.
    pub new_host: String,

    /// Hostname assigned to the device (also its LLDP chassis id).
    pub device_hostname: String,

    #[serde(default)]
    pub credentials: Credentials,

    /// SSH port used for sessions and reachability probing.
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    /// Phase-1 attempt budget.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// How long to wait for a freshly opened session to become live.
    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout: Duration,

    /// Pause between failed phase-1 attempts.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: Duration,

    /// Per-command completion timeout.
    #[serde(default = "default_command_timeout")]
    pub command_timeout: Duration,

    /// Completion/disconnect window for the management-address change.
    #[serde(default = "default_address_change_timeout")]
    pub address_change_timeout: Duration,

    /// Fixed wait for the device to reboot after the address change.
    #[serde(default = "default_reboot_wait")]
    pub reboot_wait: Duration,

    /// Reachability window for the old address before phase 1 starts.
    #[serde(default = "default_initial_probe_window")]
    pub initial_probe_window: Duration,

    /// Reachability window for the new address after the reboot wait.
    #[serde(default = "default_probe_window")]
    pub probe_window: Duration,

    /// Pause between reachability probes.
    #[serde(default = "default_probe_interval")]
    pub probe_interval: Duration,

    /// Per-probe timeout.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: Duration,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_max_attempts() -> u32 {
    5
}

fn default_liveness_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_retry_backoff() -> Duration {
    Duration::from_secs(5)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(180)
}

fn default_address_change_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_reboot_wait() -> Duration {
    Duration::from_secs(60)
}

fn default_initial_probe_window() -> Duration {
    Duration::from_secs(20)
}

fn default_probe_window() -> Duration {
    Duration::from_secs(60)
}

fn default_probe_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(2)
}

impl ProvisionConfig {
    /// Create a config with default credentials and timing.
    pub fn new(
        current_host: impl Into<String>,
        new_host: impl Into<String>,
        device_hostname: impl Into<String>,
    ) -> Self {
        Self {
            current_host: current_host.into(),
            new_host: new_host.into(),
            device_hostname: device_hostname.into(),
            credentials: Credentials::default(),
            ssh_port: default_ssh_port(),
            max_attempts: default_max_attempts(),
            liveness_timeout: default_liveness_timeout(),
            retry_backoff: default_retry_backoff(),
            command_timeout: default_command_timeout(),
            address_change_timeout: default_address_change_timeout(),
            reboot_wait: default_reboot_wait(),
            initial_probe_window: default_initial_probe_window(),
            probe_window: default_probe_window(),
            probe_interval: default_probe_interval(),
            probe_timeout: default_probe_timeout(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.current_host.trim().is_empty() {
            return Err(ConfigError::invalid("current_host must not be empty"));
        }
        if self.new_host.trim().is_empty() {
            return Err(ConfigError::invalid("new_host must not be empty"));
        }
        if self.device_hostname.trim().is_empty() {
            return Err(ConfigError::invalid("device_hostname must not be empty"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts must be at least 1"));
        }
        Ok(())
    }
}
