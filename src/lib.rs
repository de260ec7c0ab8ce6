//! # gamectl
//!
//! Control-plane protocols for managed game servers.
//!
//! A supervising daemon talks to running servers over RCON and the Minecraft
//! Server List Ping, and delegates game- and engine-specific work to plugin
//! processes speaking a one-shot JSON protocol over stdin/stdout. This crate
//! provides both sides of that picture: the network clients and the plugin
//! process itself (`gamectl-hook`).
//!
//! ## Layers
//! - [`core`]: varints, length-prefixed framing, RCON and SLP codecs
//! - [`protocol`]: RCON, SLP and REST clients plus the control channel fallback
//! - [`hook`]: the plugin process protocol (dispatch, progress, results)
//! - [`provision`]: resumable provisioning pipelines
//! - [`docker`]: compose-managed instances (extension hooks)
//! - [`lifecycle`]: Java game server instances (module hooks)
//!
//! ## Example
//! ```no_run
//! use gamectl::protocol::rcon::RconClient;
//!
//! # async fn run() {
//! let mut client = RconClient::new("127.0.0.1", 25575, "secret");
//! if let Some(players) = client.command("list").await {
//!     println!("{players}");
//! }
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod core;
pub mod docker;
pub mod error;
pub mod hook;
pub mod lifecycle;
pub mod protocol;
pub mod provision;
pub mod utils;

pub use config::ControlConfig;
pub use error::{ProtocolError, Result};
pub use hook::{Dispatcher, HookContext, HookKind, Invocation};
pub use protocol::rcon::RconClient;
pub use protocol::slp::{ServerListPing, SlpStatus};
