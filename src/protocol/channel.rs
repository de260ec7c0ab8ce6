//! # Control Channels
//!
//! A game server may be reachable over several control channels. A
//! [`FallbackChain`] tries them in order and stops at the first one that
//! either delivers the command or reports a failure no later channel can fix.

use crate::error::{ProtocolError, Result};
use crate::protocol::rcon::RconClient;
use crate::protocol::rest::RestClient;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// A command that reached the server (or was accepted without transmission)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub channel: String,
    pub response: String,
    /// True when no channel transmitted the command
    pub acknowledged_only: bool,
}

/// Result of one channel attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOutcome {
    Delivered(Delivery),
    /// This channel could not deliver; the next one may
    Retry(String),
    /// The command was rejected; stop trying
    Fatal(String),
}

#[async_trait]
pub trait ControlChannel: Send {
    fn name(&self) -> &str;
    async fn send(&mut self, command: &str) -> ChannelOutcome;
}

/// POSTs `{"command": ...}` to a REST endpoint
pub struct RestChannel {
    client: RestClient,
    endpoint: String,
}

impl RestChannel {
    pub fn new(client: RestClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ControlChannel for RestChannel {
    fn name(&self) -> &str {
        "rest"
    }

    async fn send(&mut self, command: &str) -> ChannelOutcome {
        match self
            .client
            .post(&self.endpoint, Some(json!({ "command": command })))
            .await
        {
            // A body that explicitly reports failure means the server saw and refused it
            Ok(resp) if resp.response.get("success") == Some(&Value::Bool(false)) => {
                let reason = resp
                    .response
                    .get("message")
                    .or_else(|| resp.response.get("error"))
                    .and_then(Value::as_str)
                    .unwrap_or("command rejected")
                    .to_string();
                ChannelOutcome::Fatal(reason)
            }
            Ok(resp) => ChannelOutcome::Delivered(Delivery {
                channel: self.name().to_string(),
                response: match &resp.response {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                },
                acknowledged_only: false,
            }),
            Err(e) => ChannelOutcome::Retry(e.to_string()),
        }
    }
}

/// Sends the command over an RCON session
pub struct RconChannel {
    client: RconClient,
}

impl RconChannel {
    pub fn new(client: RconClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ControlChannel for RconChannel {
    fn name(&self) -> &str {
        "rcon"
    }

    async fn send(&mut self, command: &str) -> ChannelOutcome {
        let result = self.client.try_command(command).await;
        self.client.disconnect();
        match result {
            Ok(response) => ChannelOutcome::Delivered(Delivery {
                channel: self.name().to_string(),
                response,
                acknowledged_only: false,
            }),
            Err(e) => ChannelOutcome::Retry(e.to_string()),
        }
    }
}

/// Accepts every command without transmitting it
#[derive(Debug, Default)]
pub struct AcknowledgeOnly;

#[async_trait]
impl ControlChannel for AcknowledgeOnly {
    fn name(&self) -> &str {
        "acknowledge"
    }

    async fn send(&mut self, _command: &str) -> ChannelOutcome {
        ChannelOutcome::Delivered(Delivery {
            channel: self.name().to_string(),
            response: String::new(),
            acknowledged_only: true,
        })
    }
}

/// Ordered list of channels tried one after another
#[derive(Default)]
pub struct FallbackChain {
    channels: Vec<Box<dyn ControlChannel>>,
}

impl FallbackChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: impl ControlChannel + 'static) -> Self {
        self.channels.push(Box::new(channel));
        self
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub async fn execute(&mut self, command: &str) -> Result<Delivery> {
        let mut reasons = Vec::new();

        for channel in &mut self.channels {
            match channel.send(command).await {
                ChannelOutcome::Delivered(delivery) => {
                    debug!(channel = %delivery.channel, "Command delivered");
                    return Ok(delivery);
                }
                ChannelOutcome::Retry(reason) => {
                    debug!(channel = channel.name(), %reason, "Channel unavailable, trying next");
                    reasons.push(format!("{}: {reason}", channel.name()));
                }
                ChannelOutcome::Fatal(reason) => {
                    warn!(channel = channel.name(), %reason, "Command rejected");
                    return Err(ProtocolError::CommandError(reason));
                }
            }
        }

        Err(ProtocolError::CommandError(if reasons.is_empty() {
            "No control channel configured".to_string()
        } else {
            format!("All control channels failed ({})", reasons.join("; "))
        }))
    }
}
