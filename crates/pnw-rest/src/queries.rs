//! Fixed GraphQL queries and subscribe/snapshot path builders (§6 External
//! Interfaces). Upstream's five (six, with war) entity kinds each have a
//! single, hand-written paginated query — the projection is explicit rather
//! than generated, matching the "the `include` query parameter is mandatory
//! in practice" design note (§9).

use pnw_protocol::EntityKind;

/// A minimal, explicit-projection GraphQL query for a paginated entity read.
/// Real field lists live alongside each entity's wire struct in
/// `pnw-protocol::entities`; this builder only shapes the envelope upstream
/// expects (`{kind}(page: $page, first: $page_size) { data { ... } paginator_info { count
/// has_more_pages } } }`).
///
/// The query field is aliased to `result` so the client can deserialize the
/// envelope's `data` straight into `{ result: Page<T> }` instead of needing a
/// type per entity kind just to spell out the real root field name.
pub fn paginated_query(kind: EntityKind, fields: &str) -> String {
    let root = graphql_root(kind);
    format!(
        "query($page: Int!, $pageSize: Int!) {{ result: {root}(page: $page, first: $pageSize) {{ \
         data {{ {fields} }} paginator_info {{ count has_more_pages }} }} }}"
    )
}

fn graphql_root(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Nation => "nations",
        EntityKind::Alliance => "alliances",
        EntityKind::AlliancePosition => "alliance_positions",
        EntityKind::City => "cities",
        EntityKind::Account => "accounts",
        EntityKind::War => "wars",
    }
}

/// A single-record-by-id GraphQL query, used by the Entity Store to fetch a
/// missing parent row when a required foreign key is violated (§4.7, §7).
pub fn by_id_query(kind: EntityKind, fields: &str) -> String {
    let root = graphql_root(kind);
    format!("query($id: [Int!]) {{ result: {root}(id: $id) {{ data {{ {fields} }} }} }}")
}

/// `GET /subscribe/{kind}/{event}` path, per §4.4 step 1. `since` carries the
/// optional `&since={millis}&nanos={nanos}` catch-up parameters used by gap
/// recovery to replay backlog from a known point.
pub fn subscribe_path(kind: EntityKind, event_segment: &str, include: &[&str], since: Option<(i64, i64)>) -> String {
    let fields = include.join(",");
    let mut path = format!("subscribe/{}/{event_segment}?include={fields}", kind.as_path_segment());
    if let Some((millis, nanos)) = since {
        path.push_str(&format!("&since={millis}&nanos={nanos}"));
    }
    path
}

/// `GET /snapshot/{kind}` path, per §4.5.
pub fn snapshot_path(kind: EntityKind) -> String {
    format!("snapshot/{}", kind.as_path_segment())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_path_includes_projection() {
        let path = subscribe_path(EntityKind::Nation, "update", &["id", "score"], None);
        assert_eq!(path, "subscribe/nation/update?include=id,score");
    }

    #[test]
    fn subscribe_path_carries_since_for_gap_recovery() {
        let path = subscribe_path(EntityKind::Nation, "update", &["id", "score"], Some((1001, 999)));
        assert_eq!(path, "subscribe/nation/update?include=id,score&since=1001&nanos=999");
    }

    #[test]
    fn snapshot_path_uses_path_segment() {
        assert_eq!(snapshot_path(EntityKind::AlliancePosition), "snapshot/alliance_position");
    }
}
