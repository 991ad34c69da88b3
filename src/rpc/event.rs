//! Generic named events carrying a JSON payload.

use crate::core::{CallEvent, Fault, Identity};
use crate::jsonrpc::types::ErrorCode;
use serde_json::{json, Value};

/// An event whose request and response bodies are arbitrary JSON values.
pub type RpcEvent = CallEvent<Value, Value>;

/// A statically known kind of event.
pub trait RpcEventKind: 'static {
    const SHORT_NAME: &'static str;

    fn identity() -> Identity {
        Identity::new(Self::SHORT_NAME)
    }

    fn build(payload: Value) -> RpcEvent {
        RpcEvent::new(Self::identity(), payload)
    }
}

impl CallEvent<Value, Value> {
    /// The request payload.
    pub fn payload(&self) -> Value {
        self.request()
    }

    /// Complete the event with a response payload.
    pub fn respond(&self, payload: Value) -> bool {
        self.complete(payload)
    }

    /// Record `fault` and complete the event with an error payload.
    pub fn fail(&self, fault: Fault) -> bool {
        let mut error = json!({
            "code": ErrorCode::InternalError.code(),
            "message": fault.message,
        });
        if let Some(details) = &fault.details {
            error["details"] = Value::String(details.clone());
        }
        self.record_error(fault);
        self.complete(json!({ "error": error }))
    }
}
