//! Orchestrator (§5): start-up and shutdown sequencing. Connects the Wire
//! Client first so no live record is missed while the Reconciler's initial
//! sync runs, runs that sync, then boots every configured subscription.
//!
//! Grounded on the teacher's `services/server/src/main.rs` supervision style:
//! one function owns the whole lifecycle and is driven by a caller-supplied
//! shutdown signal rather than polling anything itself.

use std::sync::Arc;

use pnw_rest::{RestClient, RestClientConfig};
use pnw_wire::{ChannelRegistry, WireClient};
use tracing::info;

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::event_bus::EventBus;
use crate::reconciler;
use crate::store::EntityStore;
use crate::subscription_manager::SubscriptionManager;

pub struct Orchestrator {
    pub store: Arc<EntityStore>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub wire: WireClient,
}

impl Orchestrator {
    /// Brings the ingest pipeline fully online: connect, reconcile, then
    /// subscribe (§5). Returns once every configured subscription is open.
    pub async fn start(config: &IngestConfig, pool: sqlx::PgPool) -> Result<Self, IngestError> {
        let bus = Arc::new(EventBus::new());
        let rest = Arc::new(RestClient::new(RestClientConfig {
            base_url: config.upstream.graphql_base_url.clone(),
            api_key: config.upstream.api_key.clone(),
            rate_limit_quota: config.rest.rate_limit_quota,
            rate_limit_window: config.rest.rate_limit_window,
        }));
        let store = Arc::new(EntityStore::new(pool, bus.clone(), rest.clone()));

        let registry = Arc::new(ChannelRegistry::new());
        let wire = WireClient::connect(config.upstream.websocket_url.clone(), registry.clone()).await?;

        info!("running initial reconciler sync");
        let summaries = reconciler::reconcile_all(&store, config.reconciler.cities_delay).await?;
        for summary in &summaries {
            info!(kind = ?summary.kind, synced = summary.synced, deleted = summary.deleted, "initial sync done");
        }

        let subscriptions =
            Arc::new(SubscriptionManager::new(wire.clone(), registry, rest, store.clone()));
        subscriptions.boot(&config.subscriptions.models).await?;
        info!("all subscriptions booted");

        Ok(Self { store, subscriptions, wire })
    }

    /// Closes the Wire Client's socket. Subscriptions are not individually
    /// cancelled — the socket going down takes every channel with it.
    pub fn shutdown(&self) {
        self.wire.close();
    }
}
