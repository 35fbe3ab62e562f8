//! AlliancePosition Entity Store (§4.7). `alliance_id` is a required FK
//! (`ON DELETE CASCADE`): a violation here fetches the parent alliance via
//! REST, inserts it, and retries, backing off linearly (1s/2s/3s/4s) before
//! giving up and dropping the record.

use pnw_protocol::diff::{diff_fields, FieldChange};
use pnw_protocol::entities::AlliancePosition;
use pnw_protocol::EntityKind;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use super::{fetch_parent, is_fk_violation, log_dropped_record, EntityStore, StoreResult, PARENT_FETCH_RETRY_DELAYS};
use crate::store::alliance;

async fn fetch(pool: &PgPool, id: i64) -> StoreResult<Option<AlliancePosition>> {
    let row = sqlx::query(
        "SELECT id, name, date_created, date_modified, position_level, permission_bits, \
         creator_id, last_editor_id, alliance_id FROM alliance_position WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| AlliancePosition {
        id: row.get("id"),
        name: row.get("name"),
        date_created: row.get("date_created"),
        date_modified: row.get("date_modified"),
        position_level: row.get("position_level"),
        permission_bits: row.get("permission_bits"),
        creator_id: row.get("creator_id"),
        last_editor_id: row.get("last_editor_id"),
        alliance_id: row.get("alliance_id"),
    }))
}

async fn insert_row(pool: &PgPool, rec: &AlliancePosition) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO alliance_position (id, name, date_created, date_modified, position_level, \
         permission_bits, creator_id, last_editor_id, alliance_id) \
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9) ON CONFLICT (id) DO NOTHING",
    )
    .bind(rec.id)
    .bind(&rec.name)
    .bind(rec.date_created)
    .bind(rec.date_modified)
    .bind(rec.position_level)
    .bind(rec.permission_bits)
    .bind(rec.creator_id)
    .bind(rec.last_editor_id)
    .bind(rec.alliance_id)
    .execute(pool)
    .await?;
    Ok(())
}

fn push_set_clause(qb: &mut QueryBuilder<'_, Postgres>, rec: &AlliancePosition, field: &str) {
    match field {
        "name" => qb.push("name = ").push_bind(rec.name.clone()),
        "date_created" => qb.push("date_created = ").push_bind(rec.date_created),
        "date_modified" => qb.push("date_modified = ").push_bind(rec.date_modified),
        "position_level" => qb.push("position_level = ").push_bind(rec.position_level),
        "permission_bits" => qb.push("permission_bits = ").push_bind(rec.permission_bits),
        "creator_id" => qb.push("creator_id = ").push_bind(rec.creator_id),
        "last_editor_id" => qb.push("last_editor_id = ").push_bind(rec.last_editor_id),
        "alliance_id" => qb.push("alliance_id = ").push_bind(rec.alliance_id),
        _ => qb,
    };
}

/// Builds and executes `UPDATE alliance_position SET <only the changed
/// columns> WHERE id = ...` (§4.7, §8 property 2).
async fn update_row(pool: &PgPool, rec: &AlliancePosition, changes: &[FieldChange]) -> Result<(), sqlx::Error> {
    if changes.is_empty() {
        return Ok(());
    }
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE alliance_position SET ");
    for (i, change) in changes.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_set_clause(&mut qb, rec, &change.field);
    }
    qb.push(" WHERE id = ").push_bind(rec.id);
    qb.build().execute(pool).await?;
    Ok(())
}

/// Idempotent create with required-parent resolution: on a foreign key
/// violation, fetch and materialize the parent alliance via REST, then
/// retry with a short linear backoff before dropping the record.
pub async fn apply_create(store: &EntityStore, rec: &AlliancePosition) -> StoreResult<()> {
    match insert_row(&store.pool, rec).await {
        Ok(()) => return Ok(()),
        Err(e) if !is_fk_violation(&e) => return Err(e.into()),
        Err(_) => {}
    }

    if let Some(parent) =
        fetch_parent::<pnw_protocol::entities::Alliance>(store, EntityKind::Alliance, pnw_protocol::fields::ALLIANCE, rec.alliance_id).await
    {
        alliance::apply_create(store, &parent).await?;
    }

    for delay in PARENT_FETCH_RETRY_DELAYS {
        tokio::time::sleep(delay).await;
        match insert_row(&store.pool, rec).await {
            Ok(()) => return Ok(()),
            Err(e) if is_fk_violation(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    log_dropped_record("alliance_position", rec.id, "parent alliance never became available");
    Ok(())
}

pub async fn apply_update(store: &EntityStore, rec: &AlliancePosition) -> StoreResult<()> {
    let Some(stored) = fetch(&store.pool, rec.id).await? else {
        return apply_create(store, rec).await;
    };

    let changes = diff_fields(&stored, rec);
    if changes.is_empty() {
        return Ok(());
    }

    match update_row(&store.pool, rec, &changes).await {
        Ok(()) => {}
        Err(e) if is_fk_violation(&e) => {
            if let Some(parent) = fetch_parent::<pnw_protocol::entities::Alliance>(
                store,
                EntityKind::Alliance,
                pnw_protocol::fields::ALLIANCE,
                rec.alliance_id,
            )
            .await
            {
                alliance::apply_create(store, &parent).await?;
            }
            update_row(&store.pool, rec, &changes).await?;
        }
        Err(e) => return Err(e.into()),
    }

    let before = serde_json::to_value(&stored).expect("alliance position always serializes to an object");
    for change in changes {
        store.bus.publish(&format!("alliance_position_{}_update", change.field), before.clone()).await;
    }
    Ok(())
}

pub async fn apply_delete(store: &EntityStore, id: i64) -> StoreResult<()> {
    sqlx::query("DELETE FROM alliance_position WHERE id = $1 RETURNING id")
        .bind(id)
        .fetch_optional(&store.pool)
        .await?;
    Ok(())
}
