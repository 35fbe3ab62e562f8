//! War Entity Store (§4.7, §9). War is reconciler-only — upstream's live
//! feed carries no `war/{create,update,delete}` subscription family (§9 open
//! question), so wars only ever change through the Reconciler's batched
//! upsert. `attacker_id`/`defender_id` and the four participant-id columns
//! mirror the original bot's schema: plain integer references with no
//! declared foreign key, so there is no FK-violation path to handle here.

use pnw_protocol::diff::{diff_fields, FieldChange};
use pnw_protocol::entities::War;
use pnw_protocol::enums::WarType;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use super::{EntityStore, StoreResult};

/// Static identity columns the original bot's schema never rewrites on
/// update, even when a field-level diff would otherwise flag them.
const STATIC_COLUMNS: &[&str] = &["start_date", "war_type", "attacker_id", "defender_id"];

fn parse_war_type(s: String) -> WarType {
    serde_json::from_value(serde_json::Value::String(s)).expect("open enums deserialize any string")
}

pub(crate) async fn fetch(pool: &PgPool, id: i64) -> StoreResult<Option<War>> {
    let row = sqlx::query(
        "SELECT id, start_date, end_date, reason, war_type, turns_left, \
         attacker_action_points, defender_action_points, attacker_offering_peace, \
         defender_offering_peace, attacker_resistance, defender_resistance, \
         attacker_fortified, defender_fortified, attacker_gasoline_used, \
         defender_gasoline_used, attacker_munitions_used, defender_munitions_used, \
         attacker_aluminum_used, defender_aluminum_used, attacker_steel_used, \
         defender_steel_used, attacker_infra_destroyed, defender_infra_destroyed, \
         attacker_money_looted, defender_money_looted, attacker_soldiers_lost, \
         defender_soldiers_lost, attacker_tanks_lost, defender_tanks_lost, \
         attacker_aircraft_lost, defender_aircraft_lost, attacker_ships_lost, \
         defender_ships_lost, attacker_missiles_used, defender_missiles_used, \
         attacker_nukes_used, defender_nukes_used, attacker_infra_destroyed_value, \
         defender_infra_destroyed_value, attacker_id, defender_id, ground_control_id, \
         air_superiority_id, naval_blockade_id, winner_id FROM war WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| War {
        id: row.get("id"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        reason: row.get("reason"),
        war_type: parse_war_type(row.get("war_type")),
        turns_left: row.get("turns_left"),
        attacker_action_points: row.get("attacker_action_points"),
        defender_action_points: row.get("defender_action_points"),
        attacker_offering_peace: row.get("attacker_offering_peace"),
        defender_offering_peace: row.get("defender_offering_peace"),
        attacker_resistance: row.get("attacker_resistance"),
        defender_resistance: row.get("defender_resistance"),
        attacker_fortified: row.get("attacker_fortified"),
        defender_fortified: row.get("defender_fortified"),
        attacker_gasoline_used: row.get("attacker_gasoline_used"),
        defender_gasoline_used: row.get("defender_gasoline_used"),
        attacker_munitions_used: row.get("attacker_munitions_used"),
        defender_munitions_used: row.get("defender_munitions_used"),
        attacker_aluminum_used: row.get("attacker_aluminum_used"),
        defender_aluminum_used: row.get("defender_aluminum_used"),
        attacker_steel_used: row.get("attacker_steel_used"),
        defender_steel_used: row.get("defender_steel_used"),
        attacker_infra_destroyed: row.get("attacker_infra_destroyed"),
        defender_infra_destroyed: row.get("defender_infra_destroyed"),
        attacker_money_looted: row.get("attacker_money_looted"),
        defender_money_looted: row.get("defender_money_looted"),
        attacker_soldiers_lost: row.get("attacker_soldiers_lost"),
        defender_soldiers_lost: row.get("defender_soldiers_lost"),
        attacker_tanks_lost: row.get("attacker_tanks_lost"),
        defender_tanks_lost: row.get("defender_tanks_lost"),
        attacker_aircraft_lost: row.get("attacker_aircraft_lost"),
        defender_aircraft_lost: row.get("defender_aircraft_lost"),
        attacker_ships_lost: row.get("attacker_ships_lost"),
        defender_ships_lost: row.get("defender_ships_lost"),
        attacker_missiles_used: row.get("attacker_missiles_used"),
        defender_missiles_used: row.get("defender_missiles_used"),
        attacker_nukes_used: row.get("attacker_nukes_used"),
        defender_nukes_used: row.get("defender_nukes_used"),
        attacker_infra_destroyed_value: row.get("attacker_infra_destroyed_value"),
        defender_infra_destroyed_value: row.get("defender_infra_destroyed_value"),
        attacker_id: row.get("attacker_id"),
        defender_id: row.get("defender_id"),
        ground_control_id: row.get("ground_control_id"),
        air_superiority_id: row.get("air_superiority_id"),
        naval_blockade_id: row.get("naval_blockade_id"),
        winner_id: row.get("winner_id"),
    }))
}

pub(crate) async fn insert_row(pool: &PgPool, rec: &War) -> Result<(), sqlx::Error> {
    let sql =
        "INSERT INTO war (id, start_date, end_date, reason, war_type, turns_left, \
         attacker_action_points, defender_action_points, attacker_offering_peace, \
         defender_offering_peace, attacker_resistance, defender_resistance, \
         attacker_fortified, defender_fortified, attacker_gasoline_used, \
         defender_gasoline_used, attacker_munitions_used, defender_munitions_used, \
         attacker_aluminum_used, defender_aluminum_used, attacker_steel_used, \
         defender_steel_used, attacker_infra_destroyed, defender_infra_destroyed, \
         attacker_money_looted, defender_money_looted, attacker_soldiers_lost, \
         defender_soldiers_lost, attacker_tanks_lost, defender_tanks_lost, \
         attacker_aircraft_lost, defender_aircraft_lost, attacker_ships_lost, \
         defender_ships_lost, attacker_missiles_used, defender_missiles_used, \
         attacker_nukes_used, defender_nukes_used, attacker_infra_destroyed_value, \
         defender_infra_destroyed_value, attacker_id, defender_id, ground_control_id, \
         air_superiority_id, naval_blockade_id, winner_id) \
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,\
         $22,$23,$24,$25,$26,$27,$28,$29,$30,$31,$32,$33,$34,$35,$36,$37,$38,$39,$40,$41,$42,\
         $43,$44,$45) \
         ON CONFLICT (id) DO UPDATE SET \
         end_date=EXCLUDED.end_date, reason=EXCLUDED.reason, turns_left=EXCLUDED.turns_left, \
         attacker_action_points=EXCLUDED.attacker_action_points, \
         defender_action_points=EXCLUDED.defender_action_points, \
         attacker_offering_peace=EXCLUDED.attacker_offering_peace, \
         defender_offering_peace=EXCLUDED.defender_offering_peace, \
         attacker_resistance=EXCLUDED.attacker_resistance, \
         defender_resistance=EXCLUDED.defender_resistance, \
         attacker_fortified=EXCLUDED.attacker_fortified, \
         defender_fortified=EXCLUDED.defender_fortified, \
         attacker_gasoline_used=EXCLUDED.attacker_gasoline_used, \
         defender_gasoline_used=EXCLUDED.defender_gasoline_used, \
         attacker_munitions_used=EXCLUDED.attacker_munitions_used, \
         defender_munitions_used=EXCLUDED.defender_munitions_used, \
         attacker_aluminum_used=EXCLUDED.attacker_aluminum_used, \
         defender_aluminum_used=EXCLUDED.defender_aluminum_used, \
         attacker_steel_used=EXCLUDED.attacker_steel_used, \
         defender_steel_used=EXCLUDED.defender_steel_used, \
         attacker_infra_destroyed=EXCLUDED.attacker_infra_destroyed, \
         defender_infra_destroyed=EXCLUDED.defender_infra_destroyed, \
         attacker_money_looted=EXCLUDED.attacker_money_looted, \
         defender_money_looted=EXCLUDED.defender_money_looted, \
         attacker_soldiers_lost=EXCLUDED.attacker_soldiers_lost, \
         defender_soldiers_lost=EXCLUDED.defender_soldiers_lost, \
         attacker_tanks_lost=EXCLUDED.attacker_tanks_lost, \
         defender_tanks_lost=EXCLUDED.defender_tanks_lost, \
         attacker_aircraft_lost=EXCLUDED.attacker_aircraft_lost, \
         defender_aircraft_lost=EXCLUDED.defender_aircraft_lost, \
         attacker_ships_lost=EXCLUDED.attacker_ships_lost, \
         defender_ships_lost=EXCLUDED.defender_ships_lost, \
         attacker_missiles_used=EXCLUDED.attacker_missiles_used, \
         defender_missiles_used=EXCLUDED.defender_missiles_used, \
         attacker_nukes_used=EXCLUDED.attacker_nukes_used, \
         defender_nukes_used=EXCLUDED.defender_nukes_used, \
         attacker_infra_destroyed_value=EXCLUDED.attacker_infra_destroyed_value, \
         defender_infra_destroyed_value=EXCLUDED.defender_infra_destroyed_value, \
         ground_control_id=EXCLUDED.ground_control_id, \
         air_superiority_id=EXCLUDED.air_superiority_id, \
         naval_blockade_id=EXCLUDED.naval_blockade_id, winner_id=EXCLUDED.winner_id";
    sqlx::query(sql)
        .bind(rec.id)
        .bind(rec.start_date)
        .bind(rec.end_date)
        .bind(&rec.reason)
        .bind(rec.war_type.to_string())
        .bind(rec.turns_left)
        .bind(rec.attacker_action_points)
        .bind(rec.defender_action_points)
        .bind(rec.attacker_offering_peace)
        .bind(rec.defender_offering_peace)
        .bind(rec.attacker_resistance)
        .bind(rec.defender_resistance)
        .bind(rec.attacker_fortified)
        .bind(rec.defender_fortified)
        .bind(rec.attacker_gasoline_used)
        .bind(rec.defender_gasoline_used)
        .bind(rec.attacker_munitions_used)
        .bind(rec.defender_munitions_used)
        .bind(rec.attacker_aluminum_used)
        .bind(rec.defender_aluminum_used)
        .bind(rec.attacker_steel_used)
        .bind(rec.defender_steel_used)
        .bind(rec.attacker_infra_destroyed)
        .bind(rec.defender_infra_destroyed)
        .bind(rec.attacker_money_looted)
        .bind(rec.defender_money_looted)
        .bind(rec.attacker_soldiers_lost)
        .bind(rec.defender_soldiers_lost)
        .bind(rec.attacker_tanks_lost)
        .bind(rec.defender_tanks_lost)
        .bind(rec.attacker_aircraft_lost)
        .bind(rec.defender_aircraft_lost)
        .bind(rec.attacker_ships_lost)
        .bind(rec.defender_ships_lost)
        .bind(rec.attacker_missiles_used)
        .bind(rec.defender_missiles_used)
        .bind(rec.attacker_nukes_used)
        .bind(rec.defender_nukes_used)
        .bind(rec.attacker_infra_destroyed_value)
        .bind(rec.defender_infra_destroyed_value)
        .bind(rec.attacker_id)
        .bind(rec.defender_id)
        .bind(rec.ground_control_id)
        .bind(rec.air_superiority_id)
        .bind(rec.naval_blockade_id)
        .bind(rec.winner_id)
        .execute(pool)
        .await?;
    Ok(())
}

fn push_set_clause(qb: &mut QueryBuilder<'_, Postgres>, rec: &War, field: &str) {
    match field {
        "end_date" => qb.push("end_date = ").push_bind(rec.end_date),
        "reason" => qb.push("reason = ").push_bind(rec.reason.clone()),
        "turns_left" => qb.push("turns_left = ").push_bind(rec.turns_left),
        "attacker_action_points" => qb.push("attacker_action_points = ").push_bind(rec.attacker_action_points),
        "defender_action_points" => qb.push("defender_action_points = ").push_bind(rec.defender_action_points),
        "attacker_offering_peace" => qb.push("attacker_offering_peace = ").push_bind(rec.attacker_offering_peace),
        "defender_offering_peace" => qb.push("defender_offering_peace = ").push_bind(rec.defender_offering_peace),
        "attacker_resistance" => qb.push("attacker_resistance = ").push_bind(rec.attacker_resistance),
        "defender_resistance" => qb.push("defender_resistance = ").push_bind(rec.defender_resistance),
        "attacker_fortified" => qb.push("attacker_fortified = ").push_bind(rec.attacker_fortified),
        "defender_fortified" => qb.push("defender_fortified = ").push_bind(rec.defender_fortified),
        "attacker_gasoline_used" => qb.push("attacker_gasoline_used = ").push_bind(rec.attacker_gasoline_used),
        "defender_gasoline_used" => qb.push("defender_gasoline_used = ").push_bind(rec.defender_gasoline_used),
        "attacker_munitions_used" => qb.push("attacker_munitions_used = ").push_bind(rec.attacker_munitions_used),
        "defender_munitions_used" => qb.push("defender_munitions_used = ").push_bind(rec.defender_munitions_used),
        "attacker_aluminum_used" => qb.push("attacker_aluminum_used = ").push_bind(rec.attacker_aluminum_used),
        "defender_aluminum_used" => qb.push("defender_aluminum_used = ").push_bind(rec.defender_aluminum_used),
        "attacker_steel_used" => qb.push("attacker_steel_used = ").push_bind(rec.attacker_steel_used),
        "defender_steel_used" => qb.push("defender_steel_used = ").push_bind(rec.defender_steel_used),
        "attacker_infra_destroyed" => qb.push("attacker_infra_destroyed = ").push_bind(rec.attacker_infra_destroyed),
        "defender_infra_destroyed" => qb.push("defender_infra_destroyed = ").push_bind(rec.defender_infra_destroyed),
        "attacker_money_looted" => qb.push("attacker_money_looted = ").push_bind(rec.attacker_money_looted),
        "defender_money_looted" => qb.push("defender_money_looted = ").push_bind(rec.defender_money_looted),
        "attacker_soldiers_lost" => qb.push("attacker_soldiers_lost = ").push_bind(rec.attacker_soldiers_lost),
        "defender_soldiers_lost" => qb.push("defender_soldiers_lost = ").push_bind(rec.defender_soldiers_lost),
        "attacker_tanks_lost" => qb.push("attacker_tanks_lost = ").push_bind(rec.attacker_tanks_lost),
        "defender_tanks_lost" => qb.push("defender_tanks_lost = ").push_bind(rec.defender_tanks_lost),
        "attacker_aircraft_lost" => qb.push("attacker_aircraft_lost = ").push_bind(rec.attacker_aircraft_lost),
        "defender_aircraft_lost" => qb.push("defender_aircraft_lost = ").push_bind(rec.defender_aircraft_lost),
        "attacker_ships_lost" => qb.push("attacker_ships_lost = ").push_bind(rec.attacker_ships_lost),
        "defender_ships_lost" => qb.push("defender_ships_lost = ").push_bind(rec.defender_ships_lost),
        "attacker_missiles_used" => qb.push("attacker_missiles_used = ").push_bind(rec.attacker_missiles_used),
        "defender_missiles_used" => qb.push("defender_missiles_used = ").push_bind(rec.defender_missiles_used),
        "attacker_nukes_used" => qb.push("attacker_nukes_used = ").push_bind(rec.attacker_nukes_used),
        "defender_nukes_used" => qb.push("defender_nukes_used = ").push_bind(rec.defender_nukes_used),
        "attacker_infra_destroyed_value" => {
            qb.push("attacker_infra_destroyed_value = ").push_bind(rec.attacker_infra_destroyed_value)
        }
        "defender_infra_destroyed_value" => {
            qb.push("defender_infra_destroyed_value = ").push_bind(rec.defender_infra_destroyed_value)
        }
        "ground_control_id" => qb.push("ground_control_id = ").push_bind(rec.ground_control_id),
        "air_superiority_id" => qb.push("air_superiority_id = ").push_bind(rec.air_superiority_id),
        "naval_blockade_id" => qb.push("naval_blockade_id = ").push_bind(rec.naval_blockade_id),
        "winner_id" => qb.push("winner_id = ").push_bind(rec.winner_id),
        _ => qb,
    };
}

/// Builds and executes `UPDATE war SET <only the changed columns, excluding
/// `STATIC_COLUMNS`> WHERE id = ...` (§4.7, §8 property 2). The original
/// bot's schema never rewrites `start_date`/`war_type`/`attacker_id`/
/// `defender_id` once a war row exists.
async fn update_row(pool: &PgPool, rec: &War, changes: &[FieldChange]) -> Result<(), sqlx::Error> {
    let columns: Vec<&str> =
        changes.iter().map(|c| c.field.as_str()).filter(|f| !STATIC_COLUMNS.contains(f)).collect();
    if columns.is_empty() {
        return Ok(());
    }

    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE war SET ");
    for (i, field) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_set_clause(&mut qb, rec, field);
    }
    qb.push(" WHERE id = ").push_bind(rec.id);
    qb.build().execute(pool).await?;
    Ok(())
}

/// Used only by the Reconciler's batched upsert path; not wired to any live
/// subscription (§9).
pub async fn apply_update(store: &EntityStore, rec: &War) -> StoreResult<()> {
    let Some(stored) = fetch(&store.pool, rec.id).await? else {
        insert_row(&store.pool, rec).await?;
        return Ok(());
    };

    let changes = diff_fields(&stored, rec);
    if changes.is_empty() {
        return Ok(());
    }

    update_row(&store.pool, rec, &changes).await?;

    let before = serde_json::to_value(&stored).expect("war always serializes to an object");
    for change in changes {
        store.bus.publish(&format!("war_{}_update", change.field), before.clone()).await;
    }
    Ok(())
}

pub async fn apply_delete(store: &EntityStore, id: i64) -> StoreResult<()> {
    sqlx::query("DELETE FROM war WHERE id = $1 RETURNING id").bind(id).fetch_optional(&store.pool).await?;
    Ok(())
}
