//! Result documents and exit codes at the hook process boundary.

use serde::Serialize;
use serde_json::{json, Map, Value};

/// The handler ran, whatever it returned
pub const EXIT_HANDLER_RAN: i32 = 0;

/// The invocation was rejected before any handler ran
pub const EXIT_INVOCATION_FAILED: i32 = 2;

/// Which result convention a hook process follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    /// Game module hooks: `{"success": bool, "message": ...}`
    Lifecycle,
    /// Extension hooks that may decline: `{"handled": bool, "success": bool, ...}`
    Extension,
}

/// Where a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOrigin {
    Invocation,
    Handler,
}

/// Outcome of one dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub output: Value,
    pub exit_code: i32,
}

impl Invocation {
    pub fn handler_ran(output: Value) -> Self {
        Self {
            output,
            exit_code: EXIT_HANDLER_RAN,
        }
    }

    pub fn rejected(output: Value) -> Self {
        Self {
            output,
            exit_code: EXIT_INVOCATION_FAILED,
        }
    }

    pub fn is_success(&self) -> bool {
        self.output.get("success").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Serialized result document; always a single JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.output)
            .unwrap_or_else(|_| String::from(r#"{"success":false,"message":"Unserializable result"}"#))
    }
}

/// Failure document in the shape `kind` expects
pub fn failure(kind: HookKind, origin: FailureOrigin, message: impl Into<String>) -> Value {
    let message = message.into();
    match kind {
        HookKind::Lifecycle => json!({
            "success": false,
            "message": message,
        }),
        HookKind::Extension => json!({
            "handled": origin == FailureOrigin::Handler,
            "success": false,
            "message": message,
            "error": message,
        }),
    }
}

/// Make sure a handler's output is a JSON object
pub fn into_object(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        Value::Null => Value::Object(Map::new()),
        other => json!({ "success": true, "result": other }),
    }
}
