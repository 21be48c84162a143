//! Network-liveness probing for the rebooted device.
//!
//! The orchestrator polls a [`ReachabilityProbe`] between phases to detect
//! when the device has come back up on its new management address. One probe
//! per attempt with a per-attempt timeout; the polling cadence lives in the
//! orchestrator.

use std::time::Duration;

use async_trait::async_trait;
use log::trace;
use tokio::net::TcpStream;

/// A single-shot host liveness check.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Probe `host` once, bounded by `timeout`. Returns whether the host
    /// answered. Probe failures of any kind count as unreachable.
    async fn probe(&self, host: &str, timeout: Duration) -> bool;
}

/// TCP connect probe against the device's SSH port.
///
/// An ICMP echo would need a raw socket and elevated privileges; a TCP
/// handshake against the service we are about to use answers the same
/// question and doubles as an "sshd is up" check.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    port: u16,
}

impl TcpProbe {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(22)
    }
}

#[async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn probe(&self, host: &str, timeout: Duration) -> bool {
        let reachable = matches!(
            tokio::time::timeout(timeout, TcpStream::connect((host, self.port))).await,
            Ok(Ok(_))
        );
        trace!("probe {host}:{} -> {reachable}", self.port);
        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_port_is_reachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::new(port);
        assert!(probe.probe("127.0.0.1", Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        // Bind then drop to get a port that is very likely closed.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = TcpProbe::new(port);
        assert!(!probe.probe("127.0.0.1", Duration::from_secs(2)).await);
    }
}
