//! # RCON Client
//!
//! Stateful Source RCON session: TCP connect, password authentication and
//! sequential command round trips.
//!
//! ```text
//! Disconnected -> Connecting -> Authenticating -> Ready -> Awaiting -> Ready
//!        ^                                                     |
//!        +----------------- any error / disconnect() ---------+
//! ```
//!
//! Exactly one response packet is read per command. Servers that split long
//! output over several packets return only the first one.
//!
//! The client never reconnects or retries on its own: a failed command tears
//! the session down and the caller decides what happens next.

use crate::config::{RconConfig, MAX_RCON_PAYLOAD};
use crate::core::codec::RconCodec;
use crate::core::packet::{PacketType, RconPacket, AUTH_FAILED_ID};
use crate::error::{constants, ProtocolError, Result};
use crate::utils::timeout::{with_timeout_error, DEFAULT_TIMEOUT};
use futures::{SinkExt, StreamExt};
use rand::Rng;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, warn};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RconState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Awaiting,
}

/// Source RCON client owning at most one socket
#[derive(Debug)]
pub struct RconClient {
    host: String,
    port: u16,
    password: String,
    timeout: Duration,
    max_payload: usize,
    framed: Option<Framed<TcpStream, RconCodec>>,
    state: RconState,
    authenticated: bool,
}

impl RconClient {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            timeout: DEFAULT_TIMEOUT,
            max_payload: MAX_RCON_PAYLOAD,
            framed: None,
            state: RconState::Disconnected,
            authenticated: false,
        }
    }

    /// Build a client from the `[rcon]` configuration section
    pub fn from_config(config: &RconConfig, password: impl Into<String>) -> Self {
        Self::new(config.host.clone(), config.port, password)
            .with_timeout(config.timeout)
            .with_max_payload(config.max_payload)
    }

    /// Bound for connect and for each receive
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn state(&self) -> RconState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Open the socket and, when a password is set, authenticate.
    ///
    /// On failure the socket is closed before returning.
    #[instrument(skip(self), fields(host = %self.host, port = self.port))]
    pub async fn connect(&mut self) -> Result<()> {
        self.disconnect();
        self.state = RconState::Connecting;

        let result = self.open_and_authenticate().await;
        match &result {
            Ok(()) => {
                self.state = RconState::Ready;
                info!("RCON session ready");
            }
            Err(e) => {
                warn!(error = %e, "RCON connect failed");
                self.teardown();
            }
        }
        result
    }

    async fn open_and_authenticate(&mut self) -> Result<()> {
        let addr = (self.host.as_str(), self.port);
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout(self.timeout))?
            .map_err(|e| {
                ProtocolError::ConnectionError(format!(
                    "Failed to connect to {}:{}: {e}",
                    self.host, self.port
                ))
            })?;
        stream.set_nodelay(true)?;

        self.framed = Some(Framed::new(stream, RconCodec::new(self.max_payload)));

        if self.password.is_empty() {
            debug!("No password configured, skipping authentication");
            return Ok(());
        }

        self.state = RconState::Authenticating;
        self.authenticate().await
    }

    async fn authenticate(&mut self) -> Result<()> {
        let id = next_request_id();
        let auth = RconPacket::new(id, PacketType::Auth, self.password.as_bytes());
        self.send(auth).await?;

        let mut reply = self.receive().await.map_err(auth_failure)?;

        // Source servers answer with an empty RESPONSE_VALUE before the real
        // AUTH_RESPONSE
        if reply.kind == PacketType::ResponseValue {
            debug!("Skipping empty response value preceding auth response");
            reply = self.receive().await.map_err(auth_failure)?;
        }

        if reply.request_id == AUTH_FAILED_ID {
            return Err(ProtocolError::AuthError(
                constants::ERR_AUTH_REJECTED.to_string(),
            ));
        }

        if reply.request_id != id {
            debug!(expected = id, got = reply.request_id, "Auth reply id mismatch");
        }

        self.authenticated = true;
        Ok(())
    }

    /// Run one command and return the first response packet's text.
    ///
    /// Valid UTF-8 comes back unchanged; invalid sequences are replaced with
    /// U+FFFD. Use [`try_command_raw`](Self::try_command_raw) for the exact bytes.
    pub async fn try_command(&mut self, command: &str) -> Result<String> {
        let payload = self.try_command_raw(command.as_bytes()).await?;
        Ok(String::from_utf8(payload)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
    }

    /// Run one command and return the first response packet's payload as sent.
    ///
    /// Connects first when no session is open. A failure tears the session down.
    #[instrument(skip(self, command), fields(host = %self.host, port = self.port))]
    pub async fn try_command_raw(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        if self.framed.is_none() {
            self.connect().await?;
        }

        self.state = RconState::Awaiting;
        let result = self.round_trip(command).await;
        match &result {
            Ok(_) => self.state = RconState::Ready,
            Err(e) => {
                warn!(error = %e, "RCON command failed, closing session");
                self.teardown();
            }
        }
        result
    }

    async fn round_trip(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        let id = next_request_id();
        self.send(RconPacket::new(id, PacketType::EXEC_COMMAND, command))
            .await?;

        let response = self.receive().await?;
        if response.request_id != id {
            debug!(expected = id, got = response.request_id, "Response id mismatch");
        }
        Ok(response.payload)
    }

    /// Run one command, returning `None` on any failure
    pub async fn command(&mut self, command: &str) -> Option<String> {
        self.try_command(command).await.ok()
    }

    /// Close the socket. Safe to call in any state.
    pub fn disconnect(&mut self) {
        if self.framed.is_some() {
            debug!(host = %self.host, port = self.port, "RCON session closed");
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        self.framed = None;
        self.authenticated = false;
        self.state = RconState::Disconnected;
    }

    async fn send(&mut self, packet: RconPacket) -> Result<()> {
        let timeout = self.timeout;
        let framed = self
            .framed
            .as_mut()
            .ok_or_else(|| ProtocolError::ConnectionError(constants::ERR_NOT_CONNECTED.to_string()))?;

        with_timeout_error(framed.send(packet), timeout).await
    }

    async fn receive(&mut self) -> Result<RconPacket> {
        let timeout = self.timeout;
        let framed = self
            .framed
            .as_mut()
            .ok_or_else(|| ProtocolError::ConnectionError(constants::ERR_NOT_CONNECTED.to_string()))?;

        match tokio::time::timeout(timeout, framed.next()).await {
            Err(_) => Err(ProtocolError::Timeout),
            Ok(None) => Err(ProtocolError::ConnectionClosed),
            Ok(Some(result)) => result,
        }
    }
}

fn auth_failure(error: ProtocolError) -> ProtocolError {
    match error {
        ProtocolError::Timeout | ProtocolError::ConnectionClosed => {
            ProtocolError::AuthError(constants::ERR_AUTH_NO_RESPONSE.to_string())
        }
        other => other,
    }
}

/// Fresh request id in `1..=i32::MAX`; zero and negatives are never used
pub fn next_request_id() -> i32 {
    rand::rng().random_range(1..=i32::MAX)
}

/// Connect, run a single command and disconnect
pub async fn rcon_command(
    host: &str,
    port: u16,
    password: &str,
    command: &str,
    timeout: Duration,
) -> Result<String> {
    let mut client = RconClient::new(host, port, password).with_timeout(timeout);
    let result = client.try_command(command).await;
    client.disconnect();
    result
}
