//! # Hook Dispatcher
//!
//! Sealed operation registry for a hook process. One invocation resolves one
//! operation name, decodes the JSON config into the handler's input type and
//! runs the handler, turning every failure into a well-formed result document.
//!
//! Resolution order:
//!
//! 1. operation name present
//! 2. operation registered
//! 3. stdin parses as JSON (empty stdin counts as `{}`)
//! 4. the document is an object
//! 5. the object decodes into the handler's input type
//! 6. the handler runs; errors and panics become failure results
//!
//! Steps 1 to 5 are invocation failures (exit code 2) and no handler runs.
//! Once a handler has run the exit code is 0 regardless of its outcome.

use crate::docker::cli::ExecMode;
use crate::error::{constants, ProtocolError, Result};
use crate::hook::context::HookContext;
use crate::hook::result::{failure, into_object, FailureOrigin, HookKind, Invocation};
use futures::future::{FutureExt, LocalBoxFuture};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, info, warn};

type HandlerFuture = LocalBoxFuture<'static, Result<Value>>;

/// Decodes the config and starts the handler, or reports the decode error
type HandlerFn = dyn Fn(HookContext, Value) -> std::result::Result<HandlerFuture, serde_json::Error>;

/// Collects handlers; `build()` seals the set
pub struct DispatcherBuilder {
    kind: HookKind,
    handlers: BTreeMap<&'static str, Box<HandlerFn>>,
}

impl DispatcherBuilder {
    /// Register `handler` under `name`, replacing any earlier registration.
    ///
    /// The handler receives the context and the config decoded as `I`; its
    /// output `O` is serialized as the result document.
    pub fn register<I, O, F, Fut>(mut self, name: &'static str, handler: F) -> Self
    where
        I: DeserializeOwned + 'static,
        O: Serialize + 'static,
        F: Fn(HookContext, I) -> Fut + 'static,
        Fut: Future<Output = Result<O>> + 'static,
    {
        let wrapped = move |ctx: HookContext,
                            config: Value|
              -> std::result::Result<HandlerFuture, serde_json::Error> {
            let input: I = serde_json::from_value(config)?;
            let fut = handler(ctx, input);
            Ok(async move {
                let output = fut.await?;
                serde_json::to_value(output).map_err(ProtocolError::from)
            }
            .boxed_local())
        };

        if self.handlers.insert(name, Box::new(wrapped)).is_some() {
            warn!(operation = name, "Hook registered twice, keeping the last handler");
        }
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            kind: self.kind,
            handlers: self.handlers,
        }
    }
}

/// Immutable operation table for one hook process
pub struct Dispatcher {
    kind: HookKind,
    handlers: BTreeMap<&'static str, Box<HandlerFn>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kind", &self.kind)
            .field("operations", &self.operations())
            .finish()
    }
}

impl Dispatcher {
    pub fn builder(kind: HookKind) -> DispatcherBuilder {
        DispatcherBuilder {
            kind,
            handlers: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> HookKind {
        self.kind
    }

    /// Registered operation names, sorted
    pub fn operations(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    pub fn contains(&self, operation: &str) -> bool {
        self.handlers.contains_key(operation)
    }

    /// Run one invocation end to end
    pub async fn dispatch(&self, operation: Option<&str>, stdin: &str, ctx: HookContext) -> Invocation {
        let Some(operation) = operation.map(str::trim).filter(|op| !op.is_empty()) else {
            return self.reject(constants::ERR_MISSING_OPERATION.to_string());
        };

        let Some(handler) = self.handlers.get(operation) else {
            let mut output = failure(
                self.kind,
                FailureOrigin::Invocation,
                format!("Unknown function: {operation}"),
            );
            output["available"] = Value::from(self.operations());
            warn!(operation, "Unknown hook operation");
            return Invocation::rejected(output);
        };

        let config = match parse_config(stdin) {
            Ok(config) => config,
            Err(e) => return self.reject(e.to_string()),
        };

        let ctx = self.scoped_context(ctx, &config);

        info!(operation, kind = ?self.kind, "Dispatching hook");

        let started = std::panic::catch_unwind(AssertUnwindSafe(|| handler(ctx, Value::Object(config))));
        let fut = match started {
            Ok(Ok(fut)) => fut,
            Ok(Err(e)) => return self.reject(format!("Invalid config for '{operation}': {e}")),
            Err(panic) => return self.handler_failed(operation, panic_message(panic.as_ref())),
        };

        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(output)) => {
                debug!(operation, "Hook completed");
                Invocation::handler_ran(into_object(output))
            }
            Ok(Err(e)) => self.handler_failed(operation, e.to_string()),
            Err(panic) => self.handler_failed(operation, panic_message(panic.as_ref())),
        }
    }

    /// Extension configs may pin the execution mode for this invocation
    fn scoped_context(&self, ctx: HookContext, config: &Map<String, Value>) -> HookContext {
        if self.kind != HookKind::Extension {
            return ctx;
        }
        match config.get("wsl2_mode").and_then(Value::as_bool) {
            Some(wsl2) => ctx.with_exec_mode(ExecMode::from_flag(wsl2)),
            None => ctx,
        }
    }

    fn reject(&self, message: String) -> Invocation {
        warn!(error = %message, "Rejected hook invocation");
        Invocation::rejected(failure(self.kind, FailureOrigin::Invocation, message))
    }

    fn handler_failed(&self, operation: &str, message: String) -> Invocation {
        error!(operation, error = %message, "Hook handler failed");
        Invocation::handler_ran(failure(self.kind, FailureOrigin::Handler, message))
    }
}

/// Parse stdin into the config object
fn parse_config(stdin: &str) -> Result<Map<String, Value>> {
    if stdin.trim().is_empty() {
        return Ok(Map::new());
    }

    let value: Value = serde_json::from_str(stdin)
        .map_err(|e| ProtocolError::InvocationError(format!("Invalid JSON config: {e}")))?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ProtocolError::InvocationError(
            constants::ERR_CONFIG_NOT_OBJECT.to_string(),
        )),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Handler panicked: {detail}")
}
