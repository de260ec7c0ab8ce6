//! # Control Protocols
//!
//! Clients for the channels a game server can be driven through.
//!
//! - [`rcon`]: authenticated Source RCON sessions
//! - [`slp`]: Minecraft Server List Ping status query
//! - [`rest`]: HTTP admin APIs
//! - [`channel`]: ordered fallback across the above

pub mod channel;
pub mod rcon;
pub mod rest;
pub mod slp;

pub use channel::{AcknowledgeOnly, ChannelOutcome, ControlChannel, Delivery, FallbackChain, RconChannel, RestChannel};
pub use rcon::{rcon_command, RconClient, RconState};
pub use rest::{RestClient, RestResponse};
pub use slp::{ServerListPing, SlpStatus};
