//! Event Bus (§4.8): in-process named publish/subscribe for downstream
//! integrations. FIFO within a single event name; no ordering guarantee
//! across distinct names. Handler failures are logged and isolated — they
//! never interrupt the feed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::error;

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
pub type Handler = Arc<dyn Fn(serde_json::Value) -> HandlerResult + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { handlers: RwLock::new(HashMap::new()) }
    }

    pub async fn subscribe(&self, name: &str, handler: Handler) {
        self.handlers.write().await.entry(name.to_owned()).or_default().push(handler);
    }

    /// Invokes every handler bound to `name`, in registration order. A
    /// handler returning `Err` is logged with full context and does not
    /// stop the remaining handlers or the caller.
    pub async fn publish(&self, name: &str, payload: serde_json::Value) {
        let handlers = {
            let handlers = self.handlers.read().await;
            match handlers.get(name) {
                Some(h) => h.clone(),
                None => return,
            }
        };
        for handler in handlers {
            if let Err(e) = handler(payload.clone()) {
                error!(event = name, error = %e, "event bus handler failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn handlers_fire_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let o1 = order.clone();
        bus.subscribe("nation_score_update", Arc::new(move |_| { o1.lock().unwrap().push(1); Ok(()) })).await;
        let o2 = order.clone();
        bus.subscribe("nation_score_update", Arc::new(move |_| { o2.lock().unwrap().push(2); Ok(()) })).await;

        bus.publish("nation_score_update", serde_json::Value::Null).await;
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn a_failing_handler_does_not_block_the_next_one() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        bus.subscribe("x", Arc::new(|_| Err("boom".into()))).await;
        let calls2 = calls.clone();
        bus.subscribe("x", Arc::new(move |_| { calls2.fetch_add(1, Ordering::SeqCst); Ok(()) })).await;

        bus.publish("x", serde_json::Value::Null).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.publish("nobody_listening", serde_json::Value::Null).await;
    }
}
