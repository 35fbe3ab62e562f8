//! Wire Client (§4.1): a single Pusher protocol v7 WebSocket connection with
//! handshake, keepalive, reconnect-with-backoff, and channel demux.
//!
//! Grounded on the forwarder's `uplink.rs` connect/send/recv shape, adapted
//! from a request/response session to a long-lived actor: a background task
//! owns the socket exclusively (§5 "the Wire Client owns the WebSocket
//! exclusively") and is driven by `tokio::select!` over inbound frames,
//! outbound sends, and the periodic ping check described in upstream's
//! `_periodic_ping` (asyncpusher/connection.py).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pnw_protocol::wire::{ConnectionEstablishedEvent, PusherEvent};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::backoff::wait_seconds;
use crate::channel::ChannelRegistry;
use crate::error::WireError;

const PONG_TIMEOUT: Duration = Duration::from_secs(30);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connected,
    Failed,
    Closed,
}

/// A handle to a running Wire Client connection. Cloning shares the same
/// underlying socket task.
#[derive(Clone)]
pub struct WireClient {
    outbound_tx: mpsc::UnboundedSender<PusherEvent>,
    state_rx: watch::Receiver<ConnectionState>,
    socket_id: Arc<Mutex<Option<String>>>,
    stop_tx: mpsc::UnboundedSender<()>,
}

impl WireClient {
    /// Connects and blocks (up to 5 seconds, §4.1 "send path") until the
    /// handshake completes or the handshake window elapses.
    pub async fn connect(url: String, registry: Arc<ChannelRegistry>) -> Result<Self, WireError> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let socket_id = Arc::new(Mutex::new(None));

        tokio::spawn(run_connection_loop(
            url,
            registry,
            outbound_rx,
            stop_rx,
            state_tx,
            socket_id.clone(),
        ));

        let client = Self { outbound_tx, state_rx, socket_id, stop_tx };
        client.await_connected().await?;
        Ok(client)
    }

    async fn await_connected(&self) -> Result<(), WireError> {
        let mut state_rx = self.state_rx.clone();
        tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            loop {
                if *state_rx.borrow() == ConnectionState::Connected {
                    return;
                }
                if state_rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await
        .map_err(|_| WireError::HandshakeTimeout)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub async fn socket_id(&self) -> Option<String> {
        self.socket_id.lock().await.clone()
    }

    /// Queues a frame for the background task to send. Buffered: does not
    /// itself block on CONNECTED state (the caller already waited for it in
    /// `connect`).
    pub fn send(&self, event: PusherEvent) -> Result<(), WireError> {
        self.outbound_tx
            .send(event)
            .map_err(|_| WireError::Disconnected)
    }

    pub fn close(&self) {
        let _ = self.stop_tx.send(());
    }
}

async fn run_connection_loop(
    url: String,
    registry: Arc<ChannelRegistry>,
    mut outbound_rx: mpsc::UnboundedReceiver<PusherEvent>,
    mut stop_rx: mpsc::UnboundedReceiver<()>,
    state_tx: watch::Sender<ConnectionState>,
    socket_id: Arc<Mutex<Option<String>>>,
) {
    let attempts = AtomicU32::new(0);

    loop {
        if stop_rx.try_recv().is_ok() {
            let _ = state_tx.send(ConnectionState::Closed);
            return;
        }

        let wait = wait_seconds(attempts.load(Ordering::SeqCst));
        if wait > 0 {
            tokio::time::sleep(Duration::from_secs(wait)).await;
        }

        let ws = match open_socket(&url).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(error = %e, "wire client failed to connect, retrying");
                attempts.fetch_add(1, Ordering::SeqCst);
                continue;
            }
        };

        match dispatch_loop(ws, &registry, &mut outbound_rx, &mut stop_rx, &state_tx, &socket_id)
            .await
        {
            LoopExit::Stop => {
                let _ = state_tx.send(ConnectionState::Closed);
                return;
            }
            LoopExit::Terminal => {
                let _ = state_tx.send(ConnectionState::Failed);
                return;
            }
            LoopExit::BackoffReconnect => {
                attempts.fetch_add(1, Ordering::SeqCst);
            }
            LoopExit::ImmediateReconnect => {
                attempts.store(0, Ordering::SeqCst);
            }
        }
    }
}

async fn open_socket(url: &str) -> Result<WsStream, WireError> {
    let request = url
        .into_client_request()
        .map_err(|e| WireError::Connect(format!("invalid URL '{url}': {e}")))?;
    let (ws, _response) = connect_async(request).await?;
    Ok(ws)
}

enum LoopExit {
    Stop,
    Terminal,
    BackoffReconnect,
    ImmediateReconnect,
}

async fn dispatch_loop(
    mut ws: WsStream,
    registry: &Arc<ChannelRegistry>,
    outbound_rx: &mut mpsc::UnboundedReceiver<PusherEvent>,
    stop_rx: &mut mpsc::UnboundedReceiver<()>,
    state_tx: &watch::Sender<ConnectionState>,
    socket_id: &Arc<Mutex<Option<String>>>,
) -> LoopExit {
    let mut activity_timeout = Duration::from_secs(120);
    let mut awaiting_pong = false;
    let mut last_activity = tokio::time::Instant::now();
    let mut ping_sent_at = tokio::time::Instant::now();
    let mut ping_check = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                let _ = ws.close(None).await;
                return LoopExit::Stop;
            }
            outbound = outbound_rx.recv() => {
                let Some(event) = outbound else { return LoopExit::Stop };
                if let Ok(json) = serde_json::to_string(&event) {
                    if ws.send(Message::Text(json.into())).await.is_err() {
                        return LoopExit::ImmediateReconnect;
                    }
                }
            }
            _ = ping_check.tick() => {
                if awaiting_pong {
                    if ping_sent_at.elapsed() >= PONG_TIMEOUT {
                        warn!("pong not received within window, reconnecting");
                        let _ = ws.close(None).await;
                        return LoopExit::ImmediateReconnect;
                    }
                } else if last_activity.elapsed() >= activity_timeout {
                    debug!("sending pusher:ping, no activity within activity_timeout");
                    if ws.send(Message::Text(
                        serde_json::to_string(&PusherEvent::ping()).unwrap().into(),
                    )).await.is_err() {
                        return LoopExit::ImmediateReconnect;
                    }
                    awaiting_pong = true;
                    ping_sent_at = tokio::time::Instant::now();
                }
            }
            frame = ws.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = tokio::time::Instant::now();
                        let Ok(event) = serde_json::from_str::<PusherEvent>(&text) else {
                            warn!(%text, "malformed pusher frame, ignoring");
                            continue;
                        };
                        handle_event(
                            &event, registry, state_tx, socket_id, &mut activity_timeout, &mut awaiting_pong,
                        ).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        last_activity = tokio::time::Instant::now();
                        let _ = ws.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.as_ref().map(|f| u16::from(f.code));
                        debug!(?code, "wire connection closed");
                        return classify_close(code);
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "wire connection error");
                        return LoopExit::ImmediateReconnect;
                    }
                    None => return LoopExit::ImmediateReconnect,
                }
            }
        }
    }
}

fn classify_close(code: Option<u16>) -> LoopExit {
    match code {
        Some(c) if (4000..4100).contains(&c) => LoopExit::Terminal,
        Some(c) if (4100..4200).contains(&c) => LoopExit::BackoffReconnect,
        Some(c) if (4200..4300).contains(&c) => LoopExit::ImmediateReconnect,
        _ => LoopExit::ImmediateReconnect,
    }
}

async fn handle_event(
    event: &PusherEvent,
    registry: &Arc<ChannelRegistry>,
    state_tx: &watch::Sender<ConnectionState>,
    socket_id: &Arc<Mutex<Option<String>>>,
    activity_timeout: &mut Duration,
    awaiting_pong: &mut bool,
) {
    if let Some(channel) = &event.channel {
        if event.event == "pusher_internal:subscription_succeeded" {
            registry.mark_subscribed(channel).await;
        }
        let data = event.data.clone().unwrap_or(serde_json::Value::Null);
        registry.dispatch(channel, &event.event, data).await;
        return;
    }

    match event.event.as_str() {
        "pusher:connection_established" => {
            match event.parse_data::<ConnectionEstablishedEvent>() {
                Ok(established) => {
                    *socket_id.lock().await = Some(established.socket_id.clone());
                    *activity_timeout = Duration::from_secs(established.activity_timeout);
                    let _ = state_tx.send(ConnectionState::Connected);
                    info!(socket_id = %established.socket_id, "pusher connection established");
                }
                Err(e) => warn!(error = %e, "malformed connection_established payload"),
            }
        }
        "pusher:pong" => {
            *awaiting_pong = false;
            debug!("received pong");
        }
        "pusher:ping" => {
            debug!("received ping");
        }
        "pusher:error" => {
            warn!(?event.data, "pusher error event");
        }
        other => {
            debug!(event = other, "unhandled connection-level event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_code_ranges_classify_per_spec() {
        assert!(matches!(classify_close(Some(4050)), LoopExit::Terminal));
        assert!(matches!(classify_close(Some(4150)), LoopExit::BackoffReconnect));
        assert!(matches!(classify_close(Some(4250)), LoopExit::ImmediateReconnect));
        assert!(matches!(classify_close(Some(1006)), LoopExit::ImmediateReconnect));
        assert!(matches!(classify_close(None), LoopExit::ImmediateReconnect));
    }
}
