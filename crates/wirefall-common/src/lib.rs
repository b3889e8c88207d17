//! Wirefall Common Types and Protocol
//!
//! This crate provides the protocol definitions shared by every wirefall
//! transport: the request/response envelopes that cross the wire, the error
//! taxonomy, and the SQL template transform.
//!
//! # Overview
//!
//! Wirefall is a resilient RPC client: callers invoke arbitrarily-named
//! remote methods over a persistent WebSocket channel, falling back to
//! one-shot HTTP exchanges when the channel is unavailable. Both transports
//! speak the same wire protocol defined here:
//!
//! - **Protocol Layer**: `RequestEnvelope`/`ResponseEnvelope` types, the
//!   correlation-id codec, and structured errors
//! - **Query Layer**: the template transform that turns templated SQL text
//!   into a serializable `{query, bindings}` pair
//!
//! # Wire Format
//!
//! Envelopes are JSON on both transports:
//! - Request: `{"id": 1, "method": "...", "params": [...]}`
//! - Response: `{"id": 1, "result": ...}` or
//!   `{"id": 1, "error": {"code": ..., "message": "...", "data": ...}}`
//!
//! # Example
//!
//! ```
//! use wirefall_common::protocol::{EnvelopeCodec, ResponseEnvelope};
//! use serde_json::json;
//!
//! let codec = EnvelopeCodec::new();
//! let request = codec.encode("compute", vec![json!(100)]);
//!
//! let response = ResponseEnvelope::success(request.id, json!(42));
//! assert_eq!(EnvelopeCodec::decode(response).unwrap(), json!(42));
//! ```

pub mod protocol;
pub mod sql;

pub use protocol::error::{Result, WirefallError};
pub use protocol::{EnvelopeCodec, RequestEnvelope, ResponseEnvelope, RpcErrorBody};
pub use sql::{sql, NamedTemplate, Statement};
