//! # Utility Modules
//!
//! Supporting utilities shared across the protocol and hook layers.
//!
//! ## Components
//! - **Timeout**: async timeout wrappers and the default bounds
//! - **Logging**: `tracing-subscriber` setup that never touches stdout

pub mod logging;
pub mod timeout;
