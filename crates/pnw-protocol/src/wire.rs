//! Pusher protocol v7 frame types and subscribe/snapshot HTTP response
//! shapes.
//!
//! Mirrors the upstream bot's `asyncpusher/models.py`: a single `PusherEvent`
//! envelope carries everything, with `data` left as a raw `serde_json::Value`
//! since it may arrive as a JSON string needing a second parse, or as an
//! already-structured object (§4.1 framing).

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A single inbound or outbound Pusher protocol frame.
///
/// `channel` is absent for connection-level frames (`pusher:ping`,
/// `pusher:connection_established`, ...); present for anything scoped to a
/// subscribed channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PusherEvent {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl PusherEvent {
    pub fn ping() -> Self {
        Self { event: "pusher:ping".to_owned(), data: None, channel: None }
    }

    pub fn subscribe(channel: &str, auth: Option<&str>) -> Self {
        let mut payload = serde_json::Map::new();
        payload.insert("channel".to_owned(), serde_json::Value::String(channel.to_owned()));
        if let Some(auth) = auth {
            payload.insert("auth".to_owned(), serde_json::Value::String(auth.to_owned()));
        }
        Self {
            event: "pusher:subscribe".to_owned(),
            data: Some(serde_json::Value::Object(payload)),
            channel: None,
        }
    }

    pub fn unsubscribe(channel: &str) -> Self {
        let mut payload = serde_json::Map::new();
        payload.insert("channel".to_owned(), serde_json::Value::String(channel.to_owned()));
        Self {
            event: "pusher:unsubscribe".to_owned(),
            data: Some(serde_json::Value::Object(payload)),
            channel: None,
        }
    }

    /// Parses `data` as the caller's target type, transparently handling the
    /// double-encoding upstream sometimes uses (a JSON string containing
    /// JSON, rather than a structured value).
    pub fn parse_data<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        match &self.data {
            Some(serde_json::Value::String(s)) => serde_json::from_str(s),
            Some(other) => serde_json::from_value(other.clone()),
            None => serde_json::from_value(serde_json::Value::Null),
        }
    }
}

/// Payload of `pusher:connection_established`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionEstablishedEvent {
    pub socket_id: String,
    pub activity_timeout: u64,
}

/// Payload of `pusher_internal:subscription_succeeded`. Upstream sends an
/// empty object; this struct exists purely to document the event's shape.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionSucceededEvent {}

/// Ordering token carried on every `{KIND}_{EVENT}_METADATA` frame.
///
/// Ordering is lexicographic on `(millis, nanos)` (§4.4, §8.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataTime {
    pub millis: i64,
    pub nanos: i64,
}

impl PartialOrd for MetadataTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MetadataTime {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.millis, self.nanos).cmp(&(other.millis, other.nanos))
    }
}

/// Payload of `{KIND}_{EVENT}_METADATA`.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataEvent {
    pub after: MetadataTime,
    pub max: MetadataTime,
    pub crc32: u32,
}

/// Response body of `GET /subscribe/{kind}/{event}`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeResponse {
    pub channel: String,
}

/// Response body of `GET /snapshot/{kind}`.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotResponse<T> {
    pub data: Vec<T>,
}

/// Pagination envelope shared by every GraphQL paged query.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginatorInfo {
    pub count: u64,
    pub has_more_pages: bool,
}

/// One page of a paginated GraphQL read.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub paginator_info: PaginatorInfo,
}

/// Builds the upstream-specific event names a Subscription binds on its
/// channel, per §4.4 step 3.
pub mod event_names {
    pub fn record(kind_upper: &str, event_upper: &str) -> String {
        format!("{kind_upper}_{event_upper}")
    }

    pub fn bulk(kind_upper: &str, event_upper: &str) -> String {
        format!("BULK_{kind_upper}_{event_upper}")
    }

    pub fn metadata(kind_upper: &str, event_upper: &str) -> String {
        format!("{kind_upper}_{event_upper}_METADATA")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_time_ordering_matches_spec_examples() {
        let a = MetadataTime { millis: 1, nanos: 999 };
        let b = MetadataTime { millis: 2, nanos: 0 };
        let c = MetadataTime { millis: 2, nanos: 1 };
        assert!(a < b);
        assert!(b < c);
        assert!(a < c);

        let d1 = MetadataTime { millis: 5, nanos: 10 };
        let d2 = MetadataTime { millis: 5, nanos: 10 };
        assert_eq!(d1, d2);
        assert!(!(d1 < d2));
    }

    #[test]
    fn metadata_time_ordering_is_antisymmetric_and_transitive() {
        let x = MetadataTime { millis: 1000, nanos: 500 };
        let y = MetadataTime { millis: 1000, nanos: 501 };
        let z = MetadataTime { millis: 1001, nanos: 0 };
        assert!(x < y);
        assert!(!(y < x));
        assert!(y < z);
        assert!(x < z);
    }

    #[test]
    fn pusher_event_parses_double_encoded_data() {
        let raw = serde_json::json!({
            "event": "nation_update",
            "channel": "nations",
            "data": "{\"id\":10,\"score\":60.0}"
        });
        let event: PusherEvent = serde_json::from_value(raw).unwrap();
        let parsed: serde_json::Value = event.parse_data().unwrap();
        assert_eq!(parsed["id"], 10);
    }

    #[test]
    fn subscribe_frame_omits_auth_when_public() {
        let frame = PusherEvent::subscribe("nation_update", None);
        let data = frame.data.unwrap();
        assert!(data.get("auth").is_none());
        assert_eq!(data["channel"], "nation_update");
    }
}
