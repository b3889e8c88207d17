//! Wirefall Response Types
//!
//! This module defines the RPC response envelope and the structured error
//! body it can carry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::RequestId;

// Standard error codes carried by structured errors
/// Invalid JSON was received by the server
pub const PARSE_ERROR: i32 = -32700;
/// The method does not exist / is not available
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameter(s)
pub const INVALID_PARAMS: i32 = -32602;
/// Internal server error
pub const INTERNAL_ERROR: i32 = -32603;

/// A machine-readable application error returned inside a well-formed
/// response, as opposed to a raw transport failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcErrorBody {
    /// Error code (standard codes are negative integers)
    pub code: i32,
    /// Short description of the error
    pub message: String,
    /// Additional data (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorBody {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Create a method not found error (-32601)
    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method '{}' not found", method))
    }

    /// Create an invalid params error (-32602)
    pub fn invalid_params(msg: &str) -> Self {
        Self::new(INVALID_PARAMS, msg)
    }

    /// Create an internal error (-32603)
    pub fn internal_error(msg: &str) -> Self {
        Self::new(INTERNAL_ERROR, msg)
    }
}

impl std::fmt::Display for RpcErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// An RPC response as it crosses the wire.
///
/// Exactly one of `result` and `error` is expected to be present. The `id`
/// matches the request's correlation id on the persistent channel; the
/// fallback channel is a paired request/response exchange, so a body without
/// an `id` is accepted there.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

impl ResponseEnvelope {
    /// Creates a successful response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    pub fn error(id: RequestId, error: RpcErrorBody) -> Self {
        Self {
            id: Some(id),
            result: None,
            error: Some(error),
        }
    }
}
