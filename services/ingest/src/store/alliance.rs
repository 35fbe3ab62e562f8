//! Alliance Entity Store (§4.7). Alliance carries no foreign keys, so
//! create/update never have an FK violation to handle.

use pnw_protocol::diff::{diff_fields, FieldChange};
use pnw_protocol::entities::Alliance;
use pnw_protocol::enums::Color;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use super::{EntityStore, StoreResult};

fn parse_color(s: String) -> Color {
    serde_json::from_value(serde_json::Value::String(s)).expect("open enums deserialize any string")
}

async fn fetch(pool: &PgPool, id: i64) -> StoreResult<Option<Alliance>> {
    let row = sqlx::query(
        "SELECT id, name, acronym, score, color, date_created, accepts_members, flag_url, rank \
         FROM alliance WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| Alliance {
        id: row.get("id"),
        name: row.get("name"),
        acronym: row.get("acronym"),
        score: row.get("score"),
        color: parse_color(row.get("color")),
        date_created: row.get("date_created"),
        accepts_members: row.get("accepts_members"),
        flag_url: row.get("flag_url"),
        rank: row.get("rank"),
    }))
}

async fn insert_row(pool: &PgPool, rec: &Alliance) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO alliance (id, name, acronym, score, color, date_created, accepts_members, \
         flag_url, rank) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9) ON CONFLICT (id) DO NOTHING",
    )
    .bind(rec.id)
    .bind(&rec.name)
    .bind(&rec.acronym)
    .bind(rec.score)
    .bind(rec.color.to_string())
    .bind(rec.date_created)
    .bind(rec.accepts_members)
    .bind(&rec.flag_url)
    .bind(rec.rank)
    .execute(pool)
    .await?;
    Ok(())
}

fn push_set_clause(qb: &mut QueryBuilder<'_, Postgres>, rec: &Alliance, field: &str) {
    match field {
        "name" => qb.push("name = ").push_bind(rec.name.clone()),
        "acronym" => qb.push("acronym = ").push_bind(rec.acronym.clone()),
        "score" => qb.push("score = ").push_bind(rec.score),
        "color" => qb.push("color = ").push_bind(rec.color.to_string()),
        "date_created" => qb.push("date_created = ").push_bind(rec.date_created),
        "accepts_members" => qb.push("accepts_members = ").push_bind(rec.accepts_members),
        "flag_url" => qb.push("flag_url = ").push_bind(rec.flag_url.clone()),
        "rank" => qb.push("rank = ").push_bind(rec.rank),
        _ => qb,
    };
}

/// Builds and executes `UPDATE alliance SET <only the changed columns> WHERE
/// id = ...` (§4.7, §8 property 2).
async fn update_row(pool: &PgPool, rec: &Alliance, changes: &[FieldChange]) -> Result<(), sqlx::Error> {
    if changes.is_empty() {
        return Ok(());
    }
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE alliance SET ");
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

pub async fn apply_create(store: &EntityStore, rec: &Alliance) -> StoreResult<()> {
    insert_row(&store.pool, rec).await?;
    Ok(())
}

pub async fn apply_update(store: &EntityStore, rec: &Alliance) -> StoreResult<()> {
    let Some(stored) = fetch(&store.pool, rec.id).await? else {
        return apply_create(store, rec).await;
    };

    let changes = diff_fields(&stored, rec);
    if changes.is_empty() {
        return Ok(());
    }

    update_row(&store.pool, rec, &changes).await?;

    let before = serde_json::to_value(&stored).expect("alliance always serializes to an object");
    for change in changes {
        store.bus.publish(&format!("alliance_{}_update", change.field), before.clone()).await;
    }
    Ok(())
}

pub async fn apply_delete(store: &EntityStore, id: i64) -> StoreResult<()> {
    sqlx::query("DELETE FROM alliance WHERE id = $1 RETURNING id").bind(id).fetch_optional(&store.pool).await?;
    Ok(())
}
