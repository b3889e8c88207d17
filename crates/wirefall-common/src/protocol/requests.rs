use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

pub type RequestId = u64;
pub type MethodName = String;

/// A single remote method invocation as it crosses the wire.
///
/// The `id` correlates the request with its eventual response, which is what
/// allows many calls to be multiplexed over one persistent connection. The
/// `params` list is serialized by value: no closures, handles, or live
/// references ever cross the boundary. An absent optional argument
/// (`Option::None` serialized into a slot) degrades to JSON `null`; this is
/// accepted, observable behavior of the positional argument encoding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestEnvelope {
    pub id: RequestId,
    pub method: MethodName,
    pub params: Vec<Value>,
}

/// Builds request envelopes for one client instance.
///
/// Each codec owns its own counter, so correlation ids are unique within the
/// client instance and monotonically increasing. Encoding has no other state
/// and performs no I/O.
#[derive(Debug)]
pub struct EnvelopeCodec {
    next_id: AtomicU64,
}

impl EnvelopeCodec {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    /// Packages a method name and positional arguments into an envelope,
    /// assigning the next correlation id.
    pub fn encode(&self, method: impl Into<String>, params: Vec<Value>) -> RequestEnvelope {
        RequestEnvelope {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: method.into(),
            params,
        }
    }

    /// Unwraps a response envelope into its result, or the structured error
    /// it carries.
    ///
    /// A response holding an `error` member rejects with
    /// [`WirefallError::Rpc`](crate::WirefallError::Rpc), the only error
    /// class this layer produces. A success response with no `result` member
    /// decodes as JSON `null`.
    pub fn decode(response: super::ResponseEnvelope) -> crate::Result<Value> {
        if let Some(error) = response.error {
            return Err(crate::WirefallError::Rpc(error));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}
