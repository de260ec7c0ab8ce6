//! # Server List Ping
//!
//! One-shot Minecraft status query:
//!
//! ```text
//! C -> S  Handshake      id 0x00: [proto: VarInt -1] [host: String] [port: u16 BE] [next: VarInt 1]
//! C -> S  Status Request id 0x00: (empty)
//! S -> C  Status         id 0x00: [json: String]
//! ```
//!
//! Frames that are not a parseable status response are skipped and reading
//! continues until a valid one arrives or the peer closes. Every failure maps
//! to "offline" at the [`ServerListPing::ping`] surface.

use crate::config::{PingConfig, MAX_SLP_FRAME};
use crate::core::codec::{SlpCodec, SlpPacket};
use crate::core::varint::{decode_varint, put_varint};
use crate::error::{ProtocolError, Result};
use crate::utils::timeout::{with_timeout_error, PING_TIMEOUT};
use bytes::{BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, instrument};

const HANDSHAKE_ID: i32 = 0x00;
const STATUS_REQUEST_ID: i32 = 0x00;
const STATUS_RESPONSE_ID: i32 = 0x00;
const PROTOCOL_VERSION_ANY: i32 = -1;
const NEXT_STATE_STATUS: i32 = 1;

/// Parsed status document
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SlpStatus {
    #[serde(default)]
    pub version: SlpVersion,
    #[serde(default)]
    pub players: SlpPlayers,
    #[serde(default)]
    pub description: Description,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

impl SlpStatus {
    /// Description flattened to plain text
    pub fn motd(&self) -> String {
        self.description.flatten()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SlpVersion {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub protocol: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SlpPlayers {
    #[serde(default)]
    pub online: u32,
    #[serde(default)]
    pub max: u32,
    #[serde(default)]
    pub sample: Vec<PlayerSample>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlayerSample {
    pub name: String,
    #[serde(default)]
    pub id: String,
}

/// Server description: either plain text or a chat component tree
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Description {
    Text(String),
    Chat(ChatComponent),
}

impl Default for Description {
    fn default() -> Self {
        Description::Text(String::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ChatComponent {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<Description>,
}

impl Description {
    pub fn flatten(&self) -> String {
        match self {
            Description::Text(text) => text.clone(),
            Description::Chat(chat) => {
                let mut out = chat.text.clone();
                for part in &chat.extra {
                    out.push_str(&part.flatten());
                }
                out
            }
        }
    }
}

/// Status query against one server address
#[derive(Debug, Clone)]
pub struct ServerListPing {
    host: String,
    port: u16,
    timeout: Duration,
    max_frame: usize,
}

impl ServerListPing {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: PING_TIMEOUT,
            max_frame: MAX_SLP_FRAME,
        }
    }

    pub fn from_config(host: impl Into<String>, port: u16, config: &PingConfig) -> Self {
        Self::new(host, port)
            .with_timeout(config.timeout)
            .with_max_frame(config.max_frame)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    /// Query the server; `None` means offline
    pub async fn ping(&self) -> Option<SlpStatus> {
        match self.try_ping().await {
            Ok(status) => Some(status),
            Err(e) => {
                debug!(host = %self.host, port = self.port, error = %e, "Server offline");
                None
            }
        }
    }

    /// Query the server, reporting why it failed
    #[instrument(skip(self), fields(host = %self.host, port = self.port))]
    pub async fn try_ping(&self) -> Result<SlpStatus> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect((self.host.as_str(), self.port)))
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout(self.timeout))?
            .map_err(|e| {
                ProtocolError::ConnectionError(format!(
                    "Failed to connect to {}:{}: {e}",
                    self.host, self.port
                ))
            })?;

        // Framed owns the stream; it is closed on every return path
        let mut framed = Framed::new(stream, SlpCodec::new(self.max_frame));

        let handshake = SlpPacket::new(HANDSHAKE_ID, self.handshake_data()?);
        let request = SlpPacket::new(STATUS_REQUEST_ID, Bytes::new());

        with_timeout_error(
            async {
                framed.feed(handshake).await?;
                framed.feed(request).await?;
                framed.flush().await
            },
            self.timeout,
        )
        .await?;

        loop {
            let packet = match tokio::time::timeout(self.timeout, framed.next()).await {
                Err(_) => return Err(ProtocolError::Timeout),
                Ok(None) => return Err(ProtocolError::ConnectionClosed),
                Ok(Some(packet)) => packet?,
            };

            match parse_status(&packet) {
                Some(status) => return Ok(status),
                None => debug!(id = packet.id, len = packet.data.len(), "Skipping non-status frame"),
            }
        }
    }

    fn handshake_data(&self) -> Result<Bytes> {
        let host = self.host.as_bytes();
        let host_len = i32::try_from(host.len()).map_err(|_| ProtocolError::OversizedPacket(host.len()))?;

        let mut data = BytesMut::with_capacity(host.len() + 12);
        put_varint(&mut data, PROTOCOL_VERSION_ANY);
        put_varint(&mut data, host_len);
        data.extend_from_slice(host);
        data.put_u16(self.port);
        put_varint(&mut data, NEXT_STATE_STATUS);
        Ok(data.freeze())
    }
}

/// Status JSON from a response packet, or `None` when the packet is not a
/// complete status response
fn parse_status(packet: &SlpPacket) -> Option<SlpStatus> {
    if packet.id != STATUS_RESPONSE_ID {
        return None;
    }

    let (len, consumed) = decode_varint(&packet.data).ok()??;
    let len = usize::try_from(len).ok()?;
    let json = packet.data.get(consumed..consumed.checked_add(len)?)?;
    serde_json::from_slice(json).ok()
}
