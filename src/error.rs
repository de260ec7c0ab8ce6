//! # Error Types
//!
//! Error handling for every layer of the control plane.
//!
//! This module defines all error variants that can occur while talking to a
//! game server or while serving a hook invocation, from low-level socket
//! failures up to handler failures at the plugin boundary.
//!
//! ## Error Categories
//! - **Connection Errors**: cannot open or authenticate a session (never retried internally)
//! - **Protocol Errors**: malformed, oversized or truncated frames
//! - **Timeouts**: no response within the configured bound
//! - **Invocation Errors**: bad arguments or JSON at the plugin boundary
//! - **Handler Errors**: failures raised inside a hook handler
//!
//! Protocol-layer failures are surfaced to callers as explicit values; the
//! hook boundary converts every variant into a well-formed JSON result.
//!
//! ## Example Usage
//! ```rust
//! use gamectl::error::{ProtocolError, Result};
//! use tracing::error;
//!
//! fn parse_port(raw: &str) -> Result<u16> {
//!     raw.parse::<u16>()
//!         .map_err(|e| ProtocolError::ConfigError(format!("invalid port '{raw}': {e}")))
//! }
//!
//! if let Err(e) = parse_port("99999") {
//!     error!(error = %e, "Rejected port");
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Connection errors
    pub const ERR_NOT_CONNECTED: &str = "Not connected";

    /// Authentication errors
    pub const ERR_AUTH_REJECTED: &str = "invalid password";
    pub const ERR_AUTH_NO_RESPONSE: &str = "no response";

    /// Framing errors
    pub const ERR_INVALID_PACKET: &str = "Invalid packet structure";

    /// Hook boundary errors
    pub const ERR_MISSING_OPERATION: &str = "No function specified";
    pub const ERR_CONFIG_NOT_OBJECT: &str = "Config must be a JSON object";
}

/// ProtocolError is the primary error type for all control-plane operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection failed: {0}")]
    ConnectionError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Stream closed before frame was complete ({0} bytes buffered)")]
    TruncatedFrame(usize),

    #[error("Invalid frame header")]
    InvalidHeader,

    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    #[error("VarInt is too big")]
    InvalidVarint,

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Connection timed out after {0:?}")]
    ConnectionTimeout(std::time::Duration),

    #[error("Command error: {0}")]
    CommandError(String),

    #[error("Invalid invocation: {0}")]
    InvocationError(String),

    #[error("{0}")]
    HandlerError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProtocolError {
    /// True for errors that mean the session socket is no longer usable.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_)
                | ProtocolError::ConnectionClosed
                | ProtocolError::TruncatedFrame(_)
                | ProtocolError::InvalidHeader
                | ProtocolError::InvalidPacket(_)
                | ProtocolError::OversizedPacket(_)
                | ProtocolError::Timeout
                | ProtocolError::ConnectionTimeout(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
