use crate::error::{RpcError, RpcResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const VERSION: &str = "2.0";

fn version() -> String {
    VERSION.to_string()
}

/// JSONRPC 2.0 Request message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    /// JSONRPC version, "2.0" when absent on input
    #[serde(default = "version")]
    pub jsonrpc: String,

    /// Request identifier (absent for one-way requests)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    /// Method name to be invoked. Filled in from the call identity before
    /// the request leaves the process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Parameters for the method (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSONRPC 2.0 Response message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// JSONRPC version, "2.0" when absent on input
    #[serde(default = "version")]
    pub jsonrpc: String,

    /// Identifier of the request this response answers
    #[serde(default)]
    pub id: Option<Value>,

    /// Result value (present on success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error object (present on error)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

/// JSONRPC 2.0 Error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorObject {
    /// Error type indicator
    pub code: i32,

    /// Short error description
    pub message: String,

    /// Diagnostic detail, e.g. the cause chain of a handler fault
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Reserved error codes
///
/// The routing layer itself only produces `MethodNotFound` and
/// `InternalError`. `RequestCancelled` and `TransportClosed` complete
/// outbound calls that are dropped from the pending table without an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
    TransportClosed = -32099,
    RequestCancelled = -32800,
}

impl ErrorCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid Request",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InvalidParams => "Invalid params",
            ErrorCode::InternalError => "Internal error",
            ErrorCode::TransportClosed => "Transport closed",
            ErrorCode::RequestCancelled => "Request cancelled",
        }
    }
}

/// A parsed wire message, classified by shape
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    /// Parse a serialized message.
    ///
    /// An object carrying `method` is a request; one carrying `result` or
    /// `error` is a response. Anything else is rejected.
    pub fn parse(text: &str) -> RpcResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> RpcResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| RpcError::InvalidMessage("JSON must be an object".to_string()))?;

        if obj.contains_key("method") {
            return Ok(Message::Request(serde_json::from_value(value)?));
        }
        if obj.contains_key("result") || obj.contains_key("error") {
            return Ok(Message::Response(serde_json::from_value(value)?));
        }

        Err(RpcError::InvalidMessage(
            "Invalid JSON-RPC payload structure".to_string(),
        ))
    }

    pub fn to_json(&self) -> RpcResult<String> {
        let json = match self {
            Message::Request(request) => serde_json::to_string(request)?,
            Message::Response(response) => serde_json::to_string(response)?,
        };
        Ok(json)
    }
}

impl Request {
    /// Create a new request
    pub fn new(id: Option<Value>, method: Option<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: version(),
            id,
            method,
            params,
        }
    }

    /// Check if this is a one-way request (no id)
    pub fn is_notification(&self) -> bool {
        matches!(self.id, None | Some(Value::Null))
    }
}

impl Response {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, error: ErrorObject) -> Self {
        Self {
            jsonrpc: version(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Result value of the response, or its error as [`RpcError::Rpc`].
    /// A success without a result yields `null`.
    pub fn into_result(self) -> RpcResult<Value> {
        match self.error {
            Some(error) => Err(error.into()),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

impl ErrorObject {
    /// Create an error object carrying the standard message of `code`
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.message().to_string(),
            details: None,
        }
    }

    /// Create a custom error
    pub fn custom(code: i32, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details,
        }
    }

    pub fn method_not_found() -> Self {
        Self::new(ErrorCode::MethodNotFound)
    }

    pub fn internal_error(message: impl Into<String>, details: Option<String>) -> Self {
        Self::custom(ErrorCode::InternalError.code(), message, details)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
