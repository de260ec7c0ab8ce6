//! # Game Server Lifecycle
//!
//! Hooks for a supervised Java game server: validation, launch command,
//! status, graceful stop, console commands, server.properties and install.
//!
//! ## Components
//! - **Hooks**: the operation handlers and their dispatcher
//! - **Properties**: comment-preserving server.properties and eula.txt
//! - **Process**: pid liveness and termination
//! - **Java**: runtime discovery
//! - **Diagnose**: known failure signatures in server logs

pub mod diagnose;
pub mod hooks;
pub mod java;
pub mod process;
pub mod properties;

pub use hooks::{format_command, lifecycle_dispatcher};
pub use properties::{RconSettings, ServerProperties};
