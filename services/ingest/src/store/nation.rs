//! Nation Entity Store (§4.7). Both of Nation's foreign keys
//! (`alliance_id`, `alliance_position_id`) are nullable with `ON DELETE SET
//! NULL`, so a violation here is always resolved by nulling the offending
//! column and retrying once — there is no required-parent-fetch path for
//! nations.

use pnw_protocol::diff::{diff_fields, FieldChange};
use pnw_protocol::entities::{Account, Nation};
use pnw_protocol::enums::{Color, Continent, DomesticPolicy, WarPolicy};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use super::{is_fk_violation, EntityStore, StoreResult};

/// Parses a column's raw text back into one of the open wire enums. These
/// never fail to parse (unknown values fall back to `Other`), so this never
/// panics on data this store itself wrote.
fn parse_enum<T: serde::de::DeserializeOwned>(s: String) -> T {
    serde_json::from_value(serde_json::Value::String(s)).expect("open enums deserialize any string")
}

async fn fetch(pool: &PgPool, id: i64) -> StoreResult<Option<Nation>> {
    let row = sqlx::query(
        "SELECT id, name, leader_name, continent, war_policy, war_policy_turns, \
         domestic_policy, domestic_policy_turns, num_cities, color, score, update_timezone, \
         population, flag_url, vacation_mode_turns, beige_turns, espionage_available, \
         last_active, date_created, soldiers, tanks, aircraft, ships, missiles, nukes, spies, \
         discord_id, turns_since_last_city, turns_since_last_project, num_projects, \
         project_bits, wars_won, wars_lost, alliance_seniority_days, alliance_id, \
         alliance_position_id FROM nation WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| Nation {
        id: row.get("id"),
        name: row.get("name"),
        leader_name: row.get("leader_name"),
        continent: parse_enum::<Continent>(row.get("continent")),
        war_policy: parse_enum::<WarPolicy>(row.get("war_policy")),
        war_policy_turns: row.get("war_policy_turns"),
        domestic_policy: parse_enum::<DomesticPolicy>(row.get("domestic_policy")),
        domestic_policy_turns: row.get("domestic_policy_turns"),
        num_cities: row.get("num_cities"),
        color: parse_enum::<Color>(row.get("color")),
        score: row.get("score"),
        update_timezone: row.get("update_timezone"),
        population: row.get("population"),
        flag_url: row.get("flag_url"),
        vacation_mode_turns: row.get("vacation_mode_turns"),
        beige_turns: row.get("beige_turns"),
        espionage_available: row.get("espionage_available"),
        last_active: row.get("last_active"),
        date_created: row.get("date_created"),
        soldiers: row.get("soldiers"),
        tanks: row.get("tanks"),
        aircraft: row.get("aircraft"),
        ships: row.get("ships"),
        missiles: row.get("missiles"),
        nukes: row.get("nukes"),
        spies: row.get("spies"),
        discord_id: row.get("discord_id"),
        turns_since_last_city: row.get("turns_since_last_city"),
        turns_since_last_project: row.get("turns_since_last_project"),
        num_projects: row.get("num_projects"),
        project_bits: row.get("project_bits"),
        wars_won: row.get("wars_won"),
        wars_lost: row.get("wars_lost"),
        alliance_seniority_days: row.get("alliance_seniority_days"),
        alliance_id: row.get("alliance_id"),
        alliance_position_id: row.get("alliance_position_id"),
    }))
}

async fn insert(pool: &PgPool, rec: &Nation, null_alliance: bool, null_position: bool) -> Result<(), sqlx::Error> {
    let alliance_id = if null_alliance { None } else { rec.alliance_id };
    let alliance_position_id = if null_position { None } else { rec.alliance_position_id };

    sqlx::query(
        "INSERT INTO nation (id, name, leader_name, continent, war_policy, war_policy_turns, \
         domestic_policy, domestic_policy_turns, num_cities, color, score, update_timezone, \
         population, flag_url, vacation_mode_turns, beige_turns, espionage_available, \
         last_active, date_created, soldiers, tanks, aircraft, ships, missiles, nukes, spies, \
         discord_id, turns_since_last_city, turns_since_last_project, num_projects, \
         project_bits, wars_won, wars_lost, alliance_seniority_days, alliance_id, \
         alliance_position_id) \
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,\
         $22,$23,$24,$25,$26,$27,$28,$29,$30,$31,$32,$33,$34,$35) \
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(rec.id)
    .bind(&rec.name)
    .bind(&rec.leader_name)
    .bind(rec.continent.to_string())
    .bind(rec.war_policy.to_string())
    .bind(rec.war_policy_turns)
    .bind(rec.domestic_policy.to_string())
    .bind(rec.domestic_policy_turns)
    .bind(rec.num_cities)
    .bind(rec.color.to_string())
    .bind(rec.score)
    .bind(rec.update_timezone)
    .bind(rec.population)
    .bind(&rec.flag_url)
    .bind(rec.vacation_mode_turns)
    .bind(rec.beige_turns)
    .bind(rec.espionage_available)
    .bind(rec.last_active)
    .bind(rec.date_created)
    .bind(rec.soldiers)
    .bind(rec.tanks)
    .bind(rec.aircraft)
    .bind(rec.ships)
    .bind(rec.missiles)
    .bind(rec.nukes)
    .bind(rec.spies)
    .bind(rec.discord_id)
    .bind(rec.turns_since_last_city)
    .bind(rec.turns_since_last_project)
    .bind(rec.num_projects)
    .bind(rec.project_bits)
    .bind(rec.wars_won)
    .bind(rec.wars_lost)
    .bind(rec.alliance_seniority_days)
    .bind(alliance_id)
    .bind(alliance_position_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Idempotent create: a record for an id that already exists is a no-op.
pub async fn apply_create(store: &EntityStore, rec: &Nation) -> StoreResult<()> {
    match insert(&store.pool, rec, false, false).await {
        Ok(()) => Ok(()),
        Err(e) if is_fk_violation(&e) => {
            // Both of nation's FKs are nullable (ON DELETE SET NULL); null
            // whichever is dangling and retry once.
            insert(&store.pool, rec, true, true).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Pushes `column = <bound value>` for one changed field onto an in-progress
/// `UPDATE nation SET` builder. `alliance_id`/`alliance_position_id` honor
/// the null-override flags used by the FK-violation retry path.
fn push_set_clause(qb: &mut QueryBuilder<'_, Postgres>, rec: &Nation, field: &str, null_alliance: bool, null_position: bool) {
    match field {
        "name" => qb.push("name = ").push_bind(rec.name.clone()),
        "leader_name" => qb.push("leader_name = ").push_bind(rec.leader_name.clone()),
        "continent" => qb.push("continent = ").push_bind(rec.continent.to_string()),
        "war_policy" => qb.push("war_policy = ").push_bind(rec.war_policy.to_string()),
        "war_policy_turns" => qb.push("war_policy_turns = ").push_bind(rec.war_policy_turns),
        "domestic_policy" => qb.push("domestic_policy = ").push_bind(rec.domestic_policy.to_string()),
        "domestic_policy_turns" => qb.push("domestic_policy_turns = ").push_bind(rec.domestic_policy_turns),
        "num_cities" => qb.push("num_cities = ").push_bind(rec.num_cities),
        "color" => qb.push("color = ").push_bind(rec.color.to_string()),
        "score" => qb.push("score = ").push_bind(rec.score),
        "update_timezone" => qb.push("update_timezone = ").push_bind(rec.update_timezone),
        "population" => qb.push("population = ").push_bind(rec.population),
        "flag_url" => qb.push("flag_url = ").push_bind(rec.flag_url.clone()),
        "vacation_mode_turns" => qb.push("vacation_mode_turns = ").push_bind(rec.vacation_mode_turns),
        "beige_turns" => qb.push("beige_turns = ").push_bind(rec.beige_turns),
        "espionage_available" => qb.push("espionage_available = ").push_bind(rec.espionage_available),
        "last_active" => qb.push("last_active = ").push_bind(rec.last_active),
        "date_created" => qb.push("date_created = ").push_bind(rec.date_created),
        "soldiers" => qb.push("soldiers = ").push_bind(rec.soldiers),
        "tanks" => qb.push("tanks = ").push_bind(rec.tanks),
        "aircraft" => qb.push("aircraft = ").push_bind(rec.aircraft),
        "ships" => qb.push("ships = ").push_bind(rec.ships),
        "missiles" => qb.push("missiles = ").push_bind(rec.missiles),
        "nukes" => qb.push("nukes = ").push_bind(rec.nukes),
        "spies" => qb.push("spies = ").push_bind(rec.spies),
        "discord_id" => qb.push("discord_id = ").push_bind(rec.discord_id),
        "turns_since_last_city" => qb.push("turns_since_last_city = ").push_bind(rec.turns_since_last_city),
        "turns_since_last_project" => qb.push("turns_since_last_project = ").push_bind(rec.turns_since_last_project),
        "num_projects" => qb.push("num_projects = ").push_bind(rec.num_projects),
        "project_bits" => qb.push("project_bits = ").push_bind(rec.project_bits),
        "wars_won" => qb.push("wars_won = ").push_bind(rec.wars_won),
        "wars_lost" => qb.push("wars_lost = ").push_bind(rec.wars_lost),
        "alliance_seniority_days" => qb.push("alliance_seniority_days = ").push_bind(rec.alliance_seniority_days),
        "alliance_id" => {
            qb.push("alliance_id = ").push_bind(if null_alliance { None } else { rec.alliance_id })
        }
        "alliance_position_id" => {
            qb.push("alliance_position_id = ").push_bind(if null_position { None } else { rec.alliance_position_id })
        }
        _ => qb,
    };
}

/// Builds and executes `UPDATE nation SET <only the changed columns> WHERE
/// id = ...` (§4.7, §8 property 2). The FK-violation retry path adds
/// `alliance_id`/`alliance_position_id` to the touched columns even when
/// they didn't change, since nulling them is the entire point of the retry.
async fn write_row(
    pool: &PgPool,
    rec: &Nation,
    changes: &[FieldChange],
    null_alliance: bool,
    null_position: bool,
) -> Result<(), sqlx::Error> {
    let mut columns: Vec<&str> = changes.iter().map(|c| c.field.as_str()).collect();
    if null_alliance && !columns.contains(&"alliance_id") {
        columns.push("alliance_id");
    }
    if null_position && !columns.contains(&"alliance_position_id") {
        columns.push("alliance_position_id");
    }
    if columns.is_empty() {
        return Ok(());
    }

    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE nation SET ");
    for (i, field) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_set_clause(&mut qb, rec, field, null_alliance, null_position);
    }
    qb.push(" WHERE id = ").push_bind(rec.id);
    qb.build().execute(pool).await?;
    Ok(())
}

/// Diff-driven update: fetches the stored row, computes the changed fields,
/// writes only those columns, then publishes one `nation_{field}_update`
/// event per changed field with the full pre-update row as payload (§4.7). A
/// record with no stored counterpart is treated as a late create.
pub async fn apply_update(store: &EntityStore, rec: &Nation) -> StoreResult<()> {
    let Some(stored) = fetch(&store.pool, rec.id).await? else {
        return apply_create(store, rec).await;
    };

    let changes = diff_fields(&stored, rec);
    if changes.is_empty() {
        return Ok(());
    }

    match write_row(&store.pool, rec, &changes, false, false).await {
        Ok(()) => {}
        Err(e) if is_fk_violation(&e) => write_row(&store.pool, rec, &changes, true, true).await?,
        Err(e) => return Err(e.into()),
    }

    let before = serde_json::to_value(&stored).expect("nation always serializes to an object");
    for change in changes {
        store.bus.publish(&format!("nation_{}_update", change.field), before.clone()).await;
    }
    Ok(())
}

pub async fn apply_delete(store: &EntityStore, id: i64) -> StoreResult<()> {
    sqlx::query("DELETE FROM nation WHERE id = $1 RETURNING id").bind(id).fetch_optional(&store.pool).await?;
    Ok(())
}

/// The account-update special case (§4.7): the live account feed is not
/// persisted on its own, it mutates `Nation.discord_id` and
/// `Nation.last_active` directly, emitting `account_discord_id_update` when
/// `discord_id` actually changes.
pub async fn apply_account_update(store: &EntityStore, rec: &Account) -> StoreResult<()> {
    let Some(stored) = fetch(&store.pool, rec.id).await? else {
        // Upstream sent an account update for a nation we haven't synced
        // yet; the reconciler or a nation_create will catch up.
        return Ok(());
    };

    let discord_id_changed = stored.discord_id != Some(rec.discord_id);

    sqlx::query("UPDATE nation SET discord_id = $2, last_active = $3 WHERE id = $1")
        .bind(rec.id)
        .bind(rec.discord_id)
        .bind(rec.last_active)
        .execute(&store.pool)
        .await?;

    if discord_id_changed {
        let nation_before = serde_json::to_value(&stored).expect("nation always serializes to an object");
        let payload = serde_json::json!({ "nation": nation_before, "old": stored.discord_id, "new": rec.discord_id });
        store.bus.publish("account_discord_id_update", payload).await;
    }
    Ok(())
}
