//! Subscription Manager (§4.4, §4.7): owns the `(kind, event) -> Subscription`
//! map, serializes record processing per kind through a dedicated worker
//! task so diff-then-write updates for the same kind never race each other,
//! and drives the boot sequence (open every configured subscription
//! concurrently once the Reconciler's initial sync has landed).

use std::collections::HashMap;
use std::sync::Arc;

use pnw_protocol::entities::{Account, Alliance, AlliancePosition, City, Nation};
use pnw_protocol::{fields, EntityKind, EventKind};
use pnw_rest::RestClient;
use pnw_wire::{ChannelRegistry, WireClient};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, warn};

use crate::error::IngestError;
use crate::store::{alliance, alliance_position, city, nation, EntityStore};
use crate::subscription::{RecordHandler, Subscription};

pub struct SubscriptionManager {
    wire: WireClient,
    registry: Arc<ChannelRegistry>,
    rest: Arc<RestClient>,
    store: Arc<EntityStore>,
    subscriptions: Mutex<HashMap<(EntityKind, EventKind), Subscription>>,
}

impl SubscriptionManager {
    pub fn new(wire: WireClient, registry: Arc<ChannelRegistry>, rest: Arc<RestClient>, store: Arc<EntityStore>) -> Self {
        Self { wire, registry, rest, store, subscriptions: Mutex::new(HashMap::new()) }
    }

    /// Opens every `(kind, event)` pair in `models` concurrently. Called once
    /// at boot, after the Reconciler's first full sync (§5 start sequence).
    pub async fn boot(&self, models: &HashMap<EntityKind, Vec<EventKind>>) -> Result<(), IngestError> {
        let mut opens = Vec::new();
        for (&kind, events) in models {
            for &event in events {
                opens.push(self.subscribe(kind, event));
            }
        }
        futures_util::future::try_join_all(opens).await?;
        Ok(())
    }

    /// Idempotent: a second call for an already-open `(kind, event)` is a
    /// no-op (§4.4).
    pub async fn subscribe(&self, kind: EntityKind, event: EventKind) -> Result<(), IngestError> {
        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.contains_key(&(kind, event)) {
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel::<Value>();
        spawn_worker(kind, event, rx, self.store.clone());
        let handler: RecordHandler = Arc::new(move |value| {
            if tx.send(value).is_err() {
                warn!(?kind, ?event, "subscription worker channel closed, dropping record");
            }
        });

        let include = include_fields(kind);
        let subscription =
            Subscription::open(&self.wire, &self.registry, &self.rest, kind, event, &include, handler).await?;
        subscriptions.insert((kind, event), subscription);
        Ok(())
    }

    pub async fn cancel(&self, kind: EntityKind, event: EventKind) {
        let mut subscriptions = self.subscriptions.lock().await;
        if let Some(subscription) = subscriptions.remove(&(kind, event)) {
            subscription.cancel(&self.wire, &self.registry).await;
        }
    }
}

fn include_fields(kind: EntityKind) -> Vec<&'static str> {
    let joined = match kind {
        EntityKind::Alliance => fields::ALLIANCE,
        EntityKind::AlliancePosition => fields::ALLIANCE_POSITION,
        EntityKind::Nation => fields::NATION,
        EntityKind::City => fields::CITY,
        EntityKind::Account => fields::ACCOUNT,
        EntityKind::War => fields::WAR,
    };
    joined.split_whitespace().collect()
}

/// One worker per `(kind, event)`, processing records strictly in arrival
/// order so a diff-then-write update never races its own predecessor.
fn spawn_worker(kind: EntityKind, event: EventKind, mut rx: mpsc::UnboundedReceiver<Value>, store: Arc<EntityStore>) {
    tokio::spawn(async move {
        while let Some(value) = rx.recv().await {
            if let Err(e) = process(kind, event, value, &store).await {
                error!(?kind, ?event, error = %e, "failed to apply subscription record");
            }
        }
    });
}

#[derive(serde::Deserialize)]
struct DeleteRecord {
    id: i64,
}

/// Dispatches one record to its Entity Store operation. A record that fails
/// to deserialize is logged and dropped rather than propagated — one
/// malformed record must never sink the rest of the live feed (§4.4).
async fn process(kind: EntityKind, event: EventKind, value: Value, store: &EntityStore) -> Result<(), IngestError> {
    macro_rules! parse_or_drop {
        ($ty:ty) => {
            match serde_json::from_value::<$ty>(value) {
                Ok(rec) => rec,
                Err(e) => {
                    warn!(?kind, ?event, error = %e, "dropping malformed record");
                    return Ok(());
                }
            }
        };
    }

    match (kind, event) {
        (EntityKind::Alliance, EventKind::Create) => alliance::apply_create(store, &parse_or_drop!(Alliance)).await?,
        (EntityKind::Alliance, EventKind::Update) => alliance::apply_update(store, &parse_or_drop!(Alliance)).await?,
        (EntityKind::Alliance, EventKind::Delete) => alliance::apply_delete(store, parse_or_drop!(DeleteRecord).id).await?,

        (EntityKind::AlliancePosition, EventKind::Create) => {
            alliance_position::apply_create(store, &parse_or_drop!(AlliancePosition)).await?
        }
        (EntityKind::AlliancePosition, EventKind::Update) => {
            alliance_position::apply_update(store, &parse_or_drop!(AlliancePosition)).await?
        }
        (EntityKind::AlliancePosition, EventKind::Delete) => {
            alliance_position::apply_delete(store, parse_or_drop!(DeleteRecord).id).await?
        }

        (EntityKind::Nation, EventKind::Create) => nation::apply_create(store, &parse_or_drop!(Nation)).await?,
        (EntityKind::Nation, EventKind::Update) => nation::apply_update(store, &parse_or_drop!(Nation)).await?,
        (EntityKind::Nation, EventKind::Delete) => nation::apply_delete(store, parse_or_drop!(DeleteRecord).id).await?,

        (EntityKind::City, EventKind::Create) => city::apply_create(store, &parse_or_drop!(City)).await?,
        (EntityKind::City, EventKind::Update) => city::apply_update(store, &parse_or_drop!(City)).await?,
        (EntityKind::City, EventKind::Delete) => city::apply_delete(store, parse_or_drop!(DeleteRecord).id).await?,

        (EntityKind::Account, EventKind::Update) => {
            nation::apply_account_update(store, &parse_or_drop!(Account)).await?
        }

        (kind, event) => warn!(?kind, ?event, "no live handler wired for this kind/event pair"),
    }
    Ok(())
}
