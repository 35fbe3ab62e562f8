//! A mock Pusher protocol v7 server for integration-testing the Wire Client
//! without a real upstream connection. Grounded on the teacher's
//! `MockWsServer`: binds a random local port, accepts connections in a
//! background task, and drives a small state machine per connection.
//!
//! # Protocol behavior
//! - On connect, immediately sends `pusher:connection_established` with a
//!   fresh `socket_id` and the configured `activity_timeout`.
//! - `pusher:subscribe` is acked with `pusher_internal:subscription_succeeded`
//!   on the same channel.
//! - `pusher:ping` is answered with `pusher:pong`.
//! - `pusher:unsubscribe` is not acked (upstream doesn't always ack it
//!   either, per §5 cancellation semantics).

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use pnw_protocol::wire::PusherEvent;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;

pub struct MockPusherServer {
    addr: SocketAddr,
    /// Used by tests to push a record/bulk/metadata frame to the most
    /// recently connected client.
    inject_tx: mpsc::UnboundedSender<PusherEvent>,
    _task: tokio::task::JoinHandle<()>,
}

impl MockPusherServer {
    pub async fn start(activity_timeout_secs: u64) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (inject_tx, inject_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(Self::accept_loop(listener, activity_timeout_secs, inject_rx));

        Ok(Self { addr, inject_tx, _task: task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("ws://{}/app/test-key?client=test&version=0.2.0&protocol=7", self.addr)
    }

    /// Pushes a frame directly to the (single) connected client, bypassing
    /// any subscribe bookkeeping — tests use this to simulate data/metadata
    /// frames arriving on an already-subscribed channel.
    pub fn inject(&self, event: PusherEvent) {
        let _ = self.inject_tx.send(event);
    }

    async fn accept_loop(
        listener: TcpListener,
        activity_timeout_secs: u64,
        mut inject_rx: mpsc::UnboundedReceiver<PusherEvent>,
    ) {
        if let Ok((stream, _peer)) = listener.accept().await {
            let ws = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(_) => return,
            };
            let (mut write, mut read) = ws.split();

            let established = PusherEvent {
                event: "pusher:connection_established".to_owned(),
                data: Some(serde_json::json!({
                    "socket_id": uuid::Uuid::new_v4().to_string(),
                    "activity_timeout": activity_timeout_secs,
                })),
                channel: None,
            };
            let _ = write
                .send(Message::Text(serde_json::to_string(&established).unwrap().into()))
                .await;

            loop {
                tokio::select! {
                    injected = inject_rx.recv() => {
                        let Some(event) = injected else { break };
                        let _ = write.send(Message::Text(serde_json::to_string(&event).unwrap().into())).await;
                    }
                    frame = read.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                let Ok(event) = serde_json::from_str::<PusherEvent>(&text) else { continue };
                                match event.event.as_str() {
                                    "pusher:ping" => {
                                        let pong = PusherEvent { event: "pusher:pong".to_owned(), data: None, channel: None };
                                        let _ = write.send(Message::Text(serde_json::to_string(&pong).unwrap().into())).await;
                                    }
                                    "pusher:subscribe" => {
                                        if let Some(channel) = event.data.as_ref().and_then(|d| d.get("channel")).and_then(|c| c.as_str()) {
                                            let ack = PusherEvent {
                                                event: "pusher_internal:subscription_succeeded".to_owned(),
                                                data: Some(serde_json::json!({})),
                                                channel: Some(channel.to_owned()),
                                            };
                                            let _ = write.send(Message::Text(serde_json::to_string(&ack).unwrap().into())).await;
                                        }
                                    }
                                    _ => {}
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => continue,
                            Some(Err(_)) => break,
                        }
                    }
                }
            }
        }
    }
}
