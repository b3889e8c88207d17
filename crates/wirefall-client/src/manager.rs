//! Transport manager.
//!
//! Decides, per call, whether to use the persistent channel or the fallback
//! channel, and owns the reconnection/backoff bookkeeping across calls. All
//! shared mutable state (channel state, pending calls, backoff timestamps)
//! lives here and in the drivers it owns; callers never touch it directly.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::backoff::BackoffController;
use crate::channel::{ChannelState, WsChannel};
use crate::config::{ClientConfig, TransportMode};
use crate::http::HttpChannel;
use wirefall_common::{EnvelopeCodec, Result, WirefallError};

/// Emitted when an `Auto` call abandons the persistent channel mid-call.
#[derive(Debug, Clone)]
pub struct TransportChange {
    pub from: &'static str,
    pub to: &'static str,
    pub reason: String,
}

/// What the client is effectively using right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveTransport {
    Ws,
    Http,
    Auto,
    Connecting,
}

impl std::fmt::Display for ActiveTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActiveTransport::Ws => "ws",
            ActiveTransport::Http => "http",
            ActiveTransport::Auto => "auto",
            ActiveTransport::Connecting => "connecting",
        };
        f.write_str(name)
    }
}

pub struct TransportManager {
    config: ClientConfig,
    codec: EnvelopeCodec,
    ws: WsChannel,
    http: HttpChannel,
    mode: Mutex<TransportMode>,
    backoff: Mutex<BackoffController>,
    events: broadcast::Sender<TransportChange>,
}

impl TransportManager {
    pub fn new(config: ClientConfig) -> Arc<Self> {
        let ws = WsChannel::new(config.ws_url(), config.timeout);
        let http = HttpChannel::new(
            config.http_url(),
            config.credential.clone(),
            config.timeout,
            config.retry.clone(),
        );
        let (events, _) = broadcast::channel(16);

        Arc::new(Self {
            codec: EnvelopeCodec::new(),
            ws,
            http,
            mode: Mutex::new(config.transport),
            backoff: Mutex::new(BackoffController::new(config.reconnect_backoff)),
            events,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Encodes and dispatches one call on the current transport mode.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let envelope = self.codec.encode(method, params);
        match self.mode() {
            TransportMode::Http => self.http.call(&envelope).await,
            TransportMode::Ws => {
                self.ws.ensure_open().await?;
                self.ws.call(envelope, self.config.timeout).await
            }
            TransportMode::Auto => {
                // Inside the backoff window the channel is not even attempted
                if !self.backoff.lock().unwrap().is_eligible(Instant::now()) {
                    debug!("persistent channel inside backoff window, using fallback");
                    return self.http.call(&envelope).await;
                }

                let ws_result = match self.ws.ensure_open().await {
                    Ok(()) => self.ws.call(envelope.clone(), self.config.timeout).await,
                    Err(e) => Err(e),
                };

                match ws_result {
                    Ok(value) => {
                        self.backoff.lock().unwrap().record_success();
                        Ok(value)
                    }
                    Err(e)
                        if matches!(
                            e,
                            WirefallError::Connectivity(_) | WirefallError::Timeout(_)
                        ) =>
                    {
                        // One-time, same-call fallback, not a loop
                        self.backoff.lock().unwrap().record_failure(Instant::now());
                        warn!(error = %e, "persistent channel failed, falling back to http");
                        let _ = self.events.send(TransportChange {
                            from: "ws",
                            to: "http",
                            reason: e.to_string(),
                        });
                        self.http.call(&envelope).await
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    pub fn mode(&self) -> TransportMode {
        *self.mode.lock().unwrap()
    }

    /// Forced transport override; the only mutation allowed after creation.
    pub fn set_transport(&self, mode: TransportMode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// Effective transport: forced modes report themselves; `Auto` reports
    /// what the channel is actually doing.
    pub fn current_transport(&self) -> ActiveTransport {
        match self.mode() {
            TransportMode::Ws => ActiveTransport::Ws,
            TransportMode::Http => ActiveTransport::Http,
            TransportMode::Auto => match self.ws.state() {
                ChannelState::Open => ActiveTransport::Ws,
                ChannelState::Connecting => ActiveTransport::Connecting,
                _ => ActiveTransport::Auto,
            },
        }
    }

    pub fn is_connected(&self) -> bool {
        self.ws.is_open()
    }

    pub fn disconnect(&self) {
        self.ws.disconnect();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransportChange> {
        self.events.subscribe()
    }
}
