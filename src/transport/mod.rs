//! SSH transport layer wrapping russh.
//!
//! This module provides the low-level SSH connection management and the
//! byte-stream seam the session layer is built against. The session never
//! touches russh types directly: it consumes a [`ShellStream`] produced by a
//! [`ShellConnector`], so tests can substitute a scripted in-memory shell.

pub mod config;
mod ssh;

use async_trait::async_trait;

use crate::error::TransportError;

pub use config::{AuthMethod, SshConfig};
pub use ssh::{SshConnector, SshTransport};

/// A bidirectional byte stream to an interactive shell.
///
/// One stream backs exactly one session; the session's reader worker is the
/// sole owner. `read_chunk` must be cancel-safe — the reader polls it inside
/// a `select!` alongside write requests and cancellation.
#[async_trait]
pub trait ShellStream: Send {
    /// Read the next chunk of shell output. `None` means the remote side
    /// closed the channel (EOF, device reboot, transport failure).
    async fn read_chunk(&mut self) -> Option<Vec<u8>>;

    /// Write raw bytes to the shell's stdin.
    async fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), TransportError>;

    /// Tear down the underlying transport. Called once when the reader exits.
    async fn close(&mut self);
}

/// Factory for [`ShellStream`]s.
///
/// The real implementation is [`SshConnector`]; orchestrator tests inject a
/// scripted connector to drive end-to-end runs without a device.
#[async_trait]
pub trait ShellConnector: Send + Sync {
    /// Establish the transport, authenticate, and allocate an interactive
    /// shell channel, all within the config's connect timeout.
    async fn connect(
        &self,
        config: &SshConfig,
    ) -> std::result::Result<Box<dyn ShellStream>, TransportError>;
}
