//! SSH transport implementation using russh.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use russh::client::{self, Handle, Msg};
use russh::keys::PublicKey;
use russh::{Channel, ChannelMsg};
use secrecy::ExposeSecret;

use super::config::{AuthMethod, SshConfig};
use super::{ShellConnector, ShellStream};
use crate::error::TransportError;

/// SSH transport wrapping a russh client session.
pub struct SshTransport {
    /// The russh session handle.
    session: Handle<SshHandler>,

    /// Configuration used for this connection.
    config: SshConfig,
}

impl SshTransport {
    /// Connect to the SSH server and authenticate.
    pub async fn connect(config: SshConfig) -> Result<Self, TransportError> {
        let ssh_config = Arc::new(client::Config {
            keepalive_interval: config.keepalive_interval,
            ..Default::default()
        });

        let mut session = tokio::time::timeout(
            config.connect_timeout,
            client::connect(
                ssh_config,
                (config.host.as_str(), config.port),
                SshHandler,
            ),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.connect_timeout))?
        .map_err(TransportError::Ssh)?;

        Self::authenticate(&mut session, &config).await?;

        Ok(Self { session, config })
    }

    /// Open an interactive shell channel (PTY + shell request).
    pub async fn open_shell(&self) -> Result<Channel<Msg>, TransportError> {
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_pty(
                true,
                "xterm",
                self.config.terminal_width,
                self.config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_shell(true)
            .await
            .map_err(TransportError::Ssh)?;

        Ok(channel)
    }

    /// Authenticate with the server.
    async fn authenticate(
        session: &mut Handle<SshHandler>,
        config: &SshConfig,
    ) -> Result<(), TransportError> {
        let success = match &config.auth {
            AuthMethod::None => session
                .authenticate_none(&config.username)
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::Password(password) => session
                .authenticate_password(&config.username, password.expose_secret())
                .await
                .map_err(TransportError::Ssh)?
                .success(),
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            });
        }

        Ok(())
    }

    /// Close the connection.
    pub async fn close(self) -> Result<(), TransportError> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// SSH client handler for russh.
///
/// Host keys are accepted unconditionally: the workflow exists to re-address
/// a factory-fresh device that regenerates its identity on reboot, so there
/// is no stable key to pin against.
struct SshHandler;

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// [`ShellStream`] over a russh PTY channel.
///
/// Owns both the channel and the transport so that dropping the stream after
/// the reader exits releases the whole connection.
pub struct SshShellStream {
    channel: Channel<Msg>,
    transport: Option<SshTransport>,
}

#[async_trait]
impl ShellStream for SshShellStream {
    async fn read_chunk(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.channel.wait().await? {
                ChannelMsg::Data { data } => return Some(data.to_vec()),
                ChannelMsg::ExtendedData { data, .. } => return Some(data.to_vec()),
                ChannelMsg::Eof | ChannelMsg::Close => return None,
                _ => continue,
            }
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.channel.data(bytes).await.map_err(TransportError::Ssh)
    }

    async fn close(&mut self) {
        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!("transport close: {e}");
            }
        }
    }
}

/// The production [`ShellConnector`]: russh transport + PTY shell channel.
#[derive(Debug, Default)]
pub struct SshConnector;

#[async_trait]
impl ShellConnector for SshConnector {
    async fn connect(
        &self,
        config: &SshConfig,
    ) -> Result<Box<dyn ShellStream>, TransportError> {
        let transport = SshTransport::connect(config.clone()).await?;
        let channel = transport.open_shell().await?;
        Ok(Box::new(SshShellStream {
            channel,
            transport: Some(transport),
        }))
    }
}
