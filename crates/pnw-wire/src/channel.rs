//! Channel Registry (§4.2): per-channel event bindings and dispatch.
//!
//! A `Channel` starts `Unsubscribed` and transitions to `Subscribed` on
//! `pusher_internal:subscription_succeeded`. Callbacks bound to an
//! (channel, event) pair are invoked in registration order; failures are
//! logged and isolated, never propagated to the wire loop.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::warn;

pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unsubscribed,
    Subscribed,
}

struct Channel {
    state: ChannelState,
    handlers: HashMap<String, Vec<EventHandler>>,
}

impl Channel {
    fn new() -> Self {
        Self { state: ChannelState::Unsubscribed, handlers: HashMap::new() }
    }
}

/// Maps channel name to channel object; shared across the Wire Client's
/// dispatch loop and every Subscription bound to a channel.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self { channels: RwLock::new(HashMap::new()) }
    }

    /// Binds `handler` to `(channel, event)`, creating the channel entry if
    /// it doesn't exist yet (a Subscription binds before the subscribe frame
    /// is acked).
    pub async fn bind(&self, channel: &str, event: &str, handler: EventHandler) {
        let mut channels = self.channels.write().await;
        let entry = channels.entry(channel.to_owned()).or_insert_with(Channel::new);
        entry.handlers.entry(event.to_owned()).or_default().push(handler);
    }

    pub async fn mark_subscribed(&self, channel: &str) {
        let mut channels = self.channels.write().await;
        if let Some(c) = channels.get_mut(channel) {
            c.state = ChannelState::Subscribed;
        }
    }

    pub async fn state(&self, channel: &str) -> Option<ChannelState> {
        self.channels.read().await.get(channel).map(|c| c.state)
    }

    /// Removes a channel entry entirely. Idempotent: removing an unknown
    /// channel is a no-op (§4.4 cancellation).
    pub async fn remove(&self, channel: &str) {
        self.channels.write().await.remove(channel);
    }

    /// Dispatches an inbound frame's data to every handler bound to
    /// `(channel, event)`, in registration order. Handler panics are not
    /// caught here — handlers are expected to be pure dispatch shims (see
    /// `services/ingest`'s store callbacks) that do not panic; genuine
    /// fallibility is surfaced by the handler logging and returning early.
    pub async fn dispatch(&self, channel: &str, event: &str, data: Value) {
        let handlers = {
            let channels = self.channels.read().await;
            match channels.get(channel).and_then(|c| c.handlers.get(event)) {
                Some(handlers) => handlers.clone(),
                None => {
                    warn!(channel, event, "no handler bound for channel event");
                    return;
                }
            }
        };
        for handler in handlers {
            handler(data.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn dispatch_invokes_bound_handlers_in_order() {
        let registry = ChannelRegistry::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let order_a = order.clone();
        registry
            .bind("nation_update", "NATION_UPDATE", Arc::new(move |_| order_a.lock().unwrap().push(1)))
            .await;
        let order_b = order.clone();
        registry
            .bind("nation_update", "NATION_UPDATE", Arc::new(move |_| order_b.lock().unwrap().push(2)))
            .await;

        registry.dispatch("nation_update", "NATION_UPDATE", Value::Null).await;
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn dispatch_to_unknown_channel_is_a_noop() {
        let registry = ChannelRegistry::new();
        registry.dispatch("missing", "EVENT", Value::Null).await;
    }

    #[tokio::test]
    async fn subscription_state_transitions_on_ack() {
        let registry = ChannelRegistry::new();
        registry.bind("c", "e", Arc::new(|_| {})).await;
        assert_eq!(registry.state("c").await, Some(ChannelState::Unsubscribed));
        registry.mark_subscribed("c").await;
        assert_eq!(registry.state("c").await, Some(ChannelState::Subscribed));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = ChannelRegistry::new();
        registry.remove("never-bound").await;
        registry.bind("c", "e", Arc::new(|_| {})).await;
        registry.remove("c").await;
        registry.remove("c").await;
        assert_eq!(registry.state("c").await, None);
    }

    #[tokio::test]
    async fn handler_count_reflects_bindings() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = ChannelRegistry::new();
        let calls2 = calls.clone();
        registry.bind("c", "e", Arc::new(move |_| { calls2.fetch_add(1, Ordering::SeqCst); })).await;
        registry.dispatch("c", "e", Value::Null).await;
        registry.dispatch("c", "e", Value::Null).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
