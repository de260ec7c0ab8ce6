//! # Hook Process Protocol
//!
//! A hook is one process invocation: the operation name arrives on the
//! command line, one JSON object on stdin, one JSON object leaves on stdout.
//! Standard error carries logs and `PROGRESS:` lines.
//!
//! ## Components
//! - **Dispatcher**: sealed name to handler table and the invocation rules
//! - **Context**: request-scoped settings, exec mode, runner and progress
//! - **Progress**: sentinel line writer and parser
//! - **Result**: failure shapes and exit codes

pub mod context;
pub mod dispatcher;
pub mod progress;
pub mod result;

pub use context::HookContext;
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use progress::{parse_progress_line, ProgressEvent, ProgressReporter, PROGRESS_SENTINEL};
pub use result::{HookKind, Invocation, EXIT_HANDLER_RAN, EXIT_INVOCATION_FAILED};
