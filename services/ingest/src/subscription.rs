//! Subscription (§4.4): one upstream `{kind}/{event}` live feed bound onto
//! the Wire Client's channel registry, with upstream's metadata-driven gap
//! detection and `since`-based re-subscription.
//!
//! Grounded on the forwarder's `uplink.rs` request/response shape for the
//! REST leg, and on asyncpusher's `channel.bind` for the record dispatch —
//! rebuilt here around `pnw_wire::ChannelRegistry` instead of a callback map.

use std::sync::Arc;

use pnw_protocol::wire::{event_names, MetadataEvent, MetadataTime, PusherEvent};
use pnw_protocol::{EntityKind, EventKind};
use pnw_rest::RestClient;
use pnw_wire::{ChannelRegistry, WireClient};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::IngestError;

pub type RecordHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// State a Subscription's bound handlers and its gap-recovery task both
/// reach into. Recovery runs on a spawned task (the metadata handler itself
/// is synchronous, per `pnw_wire::EventHandler`), so the live channel name
/// and the last-seen METADATA live behind locks rather than as plain fields.
struct Shared {
    wire: WireClient,
    registry: Arc<ChannelRegistry>,
    rest: Arc<RestClient>,
    kind: EntityKind,
    event: EventKind,
    include: Vec<String>,
    on_record: RecordHandler,
    channel: Mutex<String>,
    cached: Mutex<Option<MetadataTime>>,
}

/// An open live subscription. Holding onto this keeps the channel bound;
/// dropping it does not unsubscribe — call `cancel` explicitly (§4.4
/// "idempotent cancellation"). The bound channel may change underneath this
/// handle as gap recovery re-subscribes it.
pub struct Subscription {
    kind: EntityKind,
    event: EventKind,
    shared: Arc<Shared>,
}

impl Subscription {
    /// Opens a subscription: fetches the channel name from
    /// `GET /subscribe/{kind}/{event}`, binds the record/bulk/metadata event
    /// names on `registry`, and sends the Pusher `subscribe` frame.
    pub async fn open(
        wire: &WireClient,
        registry: &Arc<ChannelRegistry>,
        rest: &Arc<RestClient>,
        kind: EntityKind,
        event: EventKind,
        include: &[&str],
        on_record: RecordHandler,
    ) -> Result<Self, IngestError> {
        let shared = Arc::new(Shared {
            wire: wire.clone(),
            registry: registry.clone(),
            rest: rest.clone(),
            kind,
            event,
            include: include.iter().map(|s| (*s).to_owned()).collect(),
            on_record,
            channel: Mutex::new(String::new()),
            cached: Mutex::new(None),
        });

        bind_channel(&shared, None).await?;

        Ok(Self { kind, event, shared })
    }

    pub async fn channel(&self) -> String {
        self.shared.channel.lock().await.clone()
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn event(&self) -> EventKind {
        self.event
    }

    /// Idempotent: cancelling a subscription whose channel was already
    /// removed (e.g. by a previous cancel, or mid-recovery) is a no-op
    /// (§4.4).
    pub async fn cancel(&self, wire: &WireClient, registry: &ChannelRegistry) {
        let channel = self.shared.channel.lock().await.clone();
        let _ = wire.send(PusherEvent::unsubscribe(&channel));
        registry.remove(&channel).await;
    }
}

/// Opens (or re-opens, for recovery) the upstream subscribe call, binds
/// record/bulk/metadata handlers on the resulting channel, and sends the
/// Pusher subscribe frame. `since` carries the gap-recovery catch-up cursor;
/// `None` for a fresh open.
async fn bind_channel(shared: &Arc<Shared>, since: Option<MetadataTime>) -> Result<(), IngestError> {
    let include: Vec<&str> = shared.include.iter().map(String::as_str).collect();
    let path = pnw_rest::queries::subscribe_path(
        shared.kind,
        shared.event.as_path_segment(),
        &include,
        since.map(|t| (t.millis, t.nanos)),
    );
    let response = shared.rest.subscribe(&path).await?;
    let channel = response.channel;

    let kind_upper = shared.kind.as_path_segment().to_uppercase();
    let event_upper = shared.event.as_path_segment().to_uppercase();
    let record_name = event_names::record(&kind_upper, &event_upper);
    let bulk_name = event_names::bulk(&kind_upper, &event_upper);
    let metadata_name = event_names::metadata(&kind_upper, &event_upper);

    let record_handler = shared.on_record.clone();
    shared.registry.bind(&channel, &record_name, Arc::new(move |data: Value| record_handler(data))).await;

    let bulk_handler = shared.on_record.clone();
    shared
        .registry
        .bind(
            &channel,
            &bulk_name,
            Arc::new(move |data: Value| {
                if let Value::Array(records) = data {
                    for record in records {
                        bulk_handler(record);
                    }
                } else {
                    warn!("BULK event payload was not a JSON array");
                }
            }),
        )
        .await;

    let meta_shared = shared.clone();
    shared
        .registry
        .bind(
            &channel,
            &metadata_name,
            Arc::new(move |data: Value| {
                let meta_shared = meta_shared.clone();
                tokio::spawn(async move {
                    handle_metadata(meta_shared, data).await;
                });
            }),
        )
        .await;

    shared.wire.send(PusherEvent::subscribe(&channel, None))?;
    let kind = shared.kind;
    let event = shared.event;
    *shared.channel.lock().await = channel.clone();
    info!(%channel, ?kind, ?event, ?since, "subscription opened");

    Ok(())
}

/// Handles one `{KIND}_{EVENT}_METADATA` frame (§4.4): detects a gap against
/// the cached METADATA and, if found, unsubscribes the stale channel and
/// re-subscribes with `since` set just before the cached max, so upstream
/// replays the missed backlog (§8 property 3, scenario S4).
async fn handle_metadata(shared: Arc<Shared>, data: Value) {
    let meta = match serde_json::from_value::<MetadataEvent>(data) {
        Ok(meta) => meta,
        Err(e) => {
            warn!(error = %e, "malformed metadata frame");
            return;
        }
    };

    let mut cached = shared.cached.lock().await;
    let gap = matches!(*cached, Some(previous_max) if previous_max < meta.after);

    if !gap {
        *cached = Some(meta.max);
        return;
    }

    let previous_max = cached.expect("gap is only true when cached is Some");
    drop(cached);
    warn!(
        kind = ?shared.kind,
        event = ?shared.event,
        cached_max = ?previous_max,
        new_after = ?meta.after,
        "metadata gap detected; re-subscribing with since"
    );

    let stale_channel = shared.channel.lock().await.clone();
    let _ = shared.wire.send(PusherEvent::unsubscribe(&stale_channel));
    shared.registry.remove(&stale_channel).await;

    let since = MetadataTime { millis: previous_max.millis, nanos: previous_max.nanos - 1 };
    if let Err(e) = bind_channel(&shared, Some(since)).await {
        error!(kind = ?shared.kind, event = ?shared.event, error = %e, "gap recovery re-subscribe failed");
        return;
    }
    *shared.cached.lock().await = Some(meta.max);
}
