use thiserror::Error;

use super::responses::RpcErrorBody;

#[derive(Error, Debug)]
pub enum WirefallError {
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Client error (HTTP {status}): {message}")]
    Client { status: u16, message: String },

    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("RPC error: {0}")]
    Rpc(RpcErrorBody),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid template: {0}")]
    Template(String),

    #[error("Reserved method name: {0}")]
    ReservedMethod(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WirefallError {
    /// Whether retrying the same call could possibly succeed.
    ///
    /// Only transient transport classes qualify: a failed or timed-out
    /// exchange, or a 5xx response. Application errors, 4xx responses, and
    /// malformed bodies are permanent: the request itself is at fault.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WirefallError::Connectivity(_)
                | WirefallError::Timeout(_)
                | WirefallError::Server { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, WirefallError>;
