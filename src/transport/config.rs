//! SSH connection configuration.

use std::time::Duration;

use secrecy::SecretString;

/// SSH connection configuration for one shell session.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// SSH port (default: 22).
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Authentication method.
    pub auth: AuthMethod,

    /// Transport-level connect timeout.
    pub connect_timeout: Duration,

    /// SSH keepalive interval. The provisioning workflow relies on keepalives
    /// to surface the device's reboot disconnect promptly.
    pub keepalive_interval: Option<Duration>,

    /// Terminal width for the PTY.
    pub terminal_width: u32,

    /// Terminal height for the PTY.
    pub terminal_height: u32,
}

impl SshConfig {
    /// Create a config for `host` with password authentication and the
    /// transport defaults used throughout the provisioning workflow.
    pub fn password(
        host: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            auth: AuthMethod::Password(password),
            connect_timeout: Duration::from_secs(10),
            keepalive_interval: Some(Duration::from_secs(1)),
            terminal_width: 80,
            terminal_height: 24,
        }
    }

    /// Set the SSH port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Authentication method for SSH connections.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// No authentication (for testing only).
    None,

    /// Password authentication.
    Password(SecretString),
}
