//! Persistent-channel driver.
//!
//! Owns at most one WebSocket connection per client instance and multiplexes
//! all in-flight calls over it: every request carries a correlation id, a
//! reader task settles the matching pending entry as responses arrive, and
//! out-of-order delivery is tolerated by construction.
//!
//! Connection establishment is serialized: callers that arrive while an
//! attempt is in flight await that same attempt instead of opening duplicate
//! connections. A call's timeout cancels only that call's pending entry; the
//! shared connection is torn down only when the connection itself fails or
//! is explicitly disconnected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use wirefall_common::{EnvelopeCodec, RequestEnvelope, ResponseEnvelope, Result, WirefallError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection lifecycle of the persistent channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Open,
    Failed,
}

struct Shared {
    state: Mutex<ChannelState>,
    pending: Mutex<HashMap<u64, oneshot::Sender<ResponseEnvelope>>>,
    writer: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    /// Bumped on every install/disconnect so a stale reader task cannot
    /// tear down a newer connection's state.
    generation: AtomicU64,
}

pub struct WsChannel {
    url: String,
    connect_timeout: Duration,
    shared: Arc<Shared>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl WsChannel {
    pub fn new(url: String, connect_timeout: Duration) -> Self {
        Self {
            url,
            connect_timeout,
            shared: Arc::new(Shared {
                state: Mutex::new(ChannelState::Disconnected),
                pending: Mutex::new(HashMap::new()),
                writer: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.lock().unwrap()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Opens the connection if it is not open already.
    ///
    /// Attempts are serialized: a caller arriving during `Connecting` awaits
    /// the in-flight attempt and observes its outcome. A failed or timed-out
    /// attempt transitions the channel to `Failed`.
    pub async fn ensure_open(&self) -> Result<()> {
        // A caller arriving while an attempt is in flight awaits that same
        // attempt (the lock) and adopts its outcome below; it never dials.
        let arrived_during_attempt = self.state() == ChannelState::Connecting;

        let _guard = self.connect_lock.lock().await;
        if self.is_open() {
            return Ok(());
        }
        if arrived_during_attempt && self.state() == ChannelState::Failed {
            return Err(WirefallError::Connectivity(format!(
                "websocket connect to {} failed",
                self.url
            )));
        }

        *self.shared.state.lock().unwrap() = ChannelState::Connecting;
        debug!(url = %self.url, "opening persistent channel");

        match tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str())).await {
            Ok(Ok((ws, _response))) => {
                self.install(ws);
                debug!(url = %self.url, "persistent channel open");
                Ok(())
            }
            Ok(Err(e)) => {
                *self.shared.state.lock().unwrap() = ChannelState::Failed;
                Err(WirefallError::Connectivity(format!(
                    "websocket connect to {} failed: {}",
                    self.url, e
                )))
            }
            Err(_) => {
                *self.shared.state.lock().unwrap() = ChannelState::Failed;
                Err(WirefallError::Timeout(self.connect_timeout.as_millis() as u64))
            }
        }
    }

    /// Sends one envelope over the open channel and awaits its response.
    ///
    /// Requires `Open` state. The correlation id is registered before the
    /// write so a fast response cannot race the registration. On timeout,
    /// only this call's pending entry is removed.
    pub async fn call(&self, envelope: RequestEnvelope, timeout: Duration) -> Result<Value> {
        let writer = match &*self.shared.writer.lock().unwrap() {
            Some(writer) => writer.clone(),
            None => {
                return Err(WirefallError::Connectivity(
                    "persistent channel is not open".to_string(),
                ))
            }
        };

        let id = envelope.id;
        let text = serde_json::to_string(&envelope)?;

        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().unwrap().insert(id, tx);

        if writer.send(Message::Text(text)).is_err() {
            self.shared.pending.lock().unwrap().remove(&id);
            return Err(WirefallError::Connectivity(
                "persistent channel closed".to_string(),
            ));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => EnvelopeCodec::decode(response),
            Ok(Err(_)) => Err(WirefallError::Connectivity(
                "connection closed before the response arrived".to_string(),
            )),
            Err(_) => {
                self.shared.pending.lock().unwrap().remove(&id);
                Err(WirefallError::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Closes the connection and rejects everything still pending.
    pub fn disconnect(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        let writer = self.shared.writer.lock().unwrap().take();
        if let Some(writer) = writer {
            let _ = writer.send(Message::Close(None));
        }
        *self.shared.state.lock().unwrap() = ChannelState::Disconnected;
        self.shared.pending.lock().unwrap().clear();
    }

    fn install(&self, ws: WsStream) {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (sink, stream) = ws.split();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();

        *self.shared.writer.lock().unwrap() = Some(writer_tx.clone());
        *self.shared.state.lock().unwrap() = ChannelState::Open;

        tokio::spawn(write_loop(sink, writer_rx));
        tokio::spawn(read_loop(
            Arc::clone(&self.shared),
            generation,
            stream,
            writer_tx,
        ));
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = rx.recv().await {
        let closing = matches!(message, Message::Close(_));
        if sink.send(message).await.is_err() || closing {
            break;
        }
    }
}

async fn read_loop(
    shared: Arc<Shared>,
    generation: u64,
    mut stream: SplitStream<WsStream>,
    writer: mpsc::UnboundedSender<Message>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ResponseEnvelope>(&text) {
                Ok(response) => settle(&shared, response),
                Err(e) => warn!(error = %e, "discarding undecodable channel message"),
            },
            Ok(Message::Binary(data)) => match serde_json::from_slice::<ResponseEnvelope>(&data) {
                Ok(response) => settle(&shared, response),
                Err(e) => warn!(error = %e, "discarding undecodable channel message"),
            },
            Ok(Message::Ping(payload)) => {
                let _ = writer.send(Message::Pong(payload));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "persistent channel read failed");
                break;
            }
        }
    }

    // Unexpected close: reject everything pending and mark the channel
    // failed, unless a newer connection or an explicit disconnect already
    // superseded this one.
    if shared.generation.load(Ordering::SeqCst) == generation {
        *shared.writer.lock().unwrap() = None;
        *shared.state.lock().unwrap() = ChannelState::Failed;
        let mut pending = shared.pending.lock().unwrap();
        if !pending.is_empty() {
            warn!(
                pending = pending.len(),
                "persistent channel closed with calls in flight"
            );
        }
        pending.clear();
    }
}

/// Resolves the pending entry matching the response's correlation id.
/// A response with no matching entry (stray or duplicate) is discarded.
fn settle(shared: &Shared, response: ResponseEnvelope) {
    let id = match response.id {
        Some(id) => id,
        None => {
            debug!("discarding channel response without an id");
            return;
        }
    };
    let sender = shared.pending.lock().unwrap().remove(&id);
    match sender {
        Some(tx) => {
            let _ = tx.send(response);
        }
        None => debug!(id, "discarding response with no pending call"),
    }
}
