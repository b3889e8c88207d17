//! Caller-facing client surface.
//!
//! Any method name dispatches remotely: [`WirefallClient::call`] is the
//! generic invoke-by-name path, and [`WirefallClient::method`] returns a
//! bound invoker for repeated use. Dispatch is an explicit capability: the
//! lifecycle operations (`disconnect`, `close`, `is_connected`,
//! `set_transport`) are inherent methods, rejected as remote method names
//! before anything reaches the wire.
//!
//! A [`MethodHandle`] is deliberately not a future: awaiting the handle
//! itself (rather than an invocation) does not compile, so "awaiting the
//! proxy" fails loudly instead of silently misbehaving.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::config::{ClientConfig, ClientOptions, RetryConfig, TransportMode};
use crate::manager::{ActiveTransport, TransportChange, TransportManager};
use wirefall_common::{Result, Statement, WirefallError};

/// Method names that never dispatch remotely. Both the upstream spellings
/// and the Rust ones are reserved.
const RESERVED_METHODS: &[&str] = &[
    "disconnect",
    "close",
    "isConnected",
    "is_connected",
    "setTransport",
    "set_transport",
];

/// Wirefall RPC client.
///
/// Construction resolves the configuration once and performs no I/O; the
/// persistent channel is established lazily by the first call that needs it.
/// Cloning is cheap and clones share the connection, the correlation-id
/// counter, and the backoff state.
#[derive(Clone)]
pub struct WirefallClient {
    manager: Arc<TransportManager>,
}

impl WirefallClient {
    /// Creates a client from caller options, resolving configuration
    /// (base URL precedence, credential lookup) against the process env.
    pub fn new(options: ClientOptions) -> Result<Self> {
        Ok(Self::with_config(ClientConfig::resolve(options)?))
    }

    /// Creates a client from an already-resolved configuration.
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            manager: TransportManager::new(config),
        }
    }

    /// Replaces the retry policy, builder style.
    pub fn with_retry(self, retry: RetryConfig) -> Self {
        let mut config = self.manager.config().clone();
        config.retry = retry;
        Self::with_config(config)
    }

    /// Invokes a remote method with positional arguments.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        if RESERVED_METHODS.contains(&method) {
            return Err(WirefallError::ReservedMethod(method.to_string()));
        }
        self.manager.call(method, params).await
    }

    /// Returns a bound invoker for a method name.
    pub fn method(&self, name: impl Into<String>) -> MethodHandle {
        MethodHandle {
            manager: Arc::clone(&self.manager),
            name: name.into(),
        }
    }

    /// Executes a parsed query statement remotely.
    ///
    /// The statement crosses the boundary as an ordinary call to the remote
    /// `query` method with `[query, bindings]` params: text and values
    /// only, never executable fragments.
    pub async fn query(&self, statement: Statement) -> Result<Value> {
        self.manager
            .call(
                "query",
                vec![Value::String(statement.query), Value::Array(statement.bindings)],
            )
            .await
    }

    /// Whether the persistent channel is currently open.
    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    /// Closes the persistent channel and rejects its in-flight calls.
    /// Subsequent calls may reconnect (or use the fallback, per mode).
    pub fn disconnect(&self) {
        self.manager.disconnect();
    }

    /// Alias for [`disconnect`](Self::disconnect).
    pub fn close(&self) {
        self.disconnect();
    }

    /// Forces the transport mode for all subsequent calls.
    pub fn set_transport(&self, mode: TransportMode) {
        self.manager.set_transport(mode);
    }

    /// The effective transport right now (`ws`/`http`/`auto`/`connecting`).
    pub fn current_transport(&self) -> ActiveTransport {
        self.manager.current_transport()
    }

    /// Subscribes to transport-change notifications.
    pub fn subscribe_transport_changes(&self) -> broadcast::Receiver<TransportChange> {
        self.manager.subscribe()
    }
}

/// A remote method bound to its client.
#[derive(Clone)]
pub struct MethodHandle {
    manager: Arc<TransportManager>,
    name: String,
}

impl MethodHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the bound method with positional arguments.
    pub async fn invoke(&self, params: Vec<Value>) -> Result<Value> {
        if RESERVED_METHODS.contains(&self.name.as_str()) {
            return Err(WirefallError::ReservedMethod(self.name.clone()));
        }
        self.manager.call(&self.name, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn client() -> WirefallClient {
        let config = ClientConfig::resolve_with_env(
            ClientOptions::new().base_url("http://127.0.0.1:1"),
            &HashMap::new(),
        )
        .unwrap();
        WirefallClient::with_config(config)
    }

    #[tokio::test]
    async fn test_reserved_method_names_never_dispatch() {
        let client = client();
        for name in ["disconnect", "close", "isConnected", "setTransport"] {
            let err = client.call(name, vec![]).await.unwrap_err();
            assert!(
                matches!(err, WirefallError::ReservedMethod(_)),
                "{} should be reserved",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_bound_handle_rejects_reserved_names() {
        let handle = client().method("set_transport");
        let err = handle.invoke(vec![json!(1)]).await.unwrap_err();
        assert!(matches!(err, WirefallError::ReservedMethod(_)));
    }

    #[test]
    fn test_handle_reports_its_name() {
        assert_eq!(client().method("listDocuments").name(), "listDocuments");
    }

    #[test]
    fn test_client_is_clonable_and_shares_state() {
        let client = client();
        let clone = client.clone();
        client.set_transport(TransportMode::Http);
        assert_eq!(clone.current_transport(), ActiveTransport::Http);
    }

    #[test]
    fn test_not_connected_before_any_call() {
        assert!(!client().is_connected());
    }
}
