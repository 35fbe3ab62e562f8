//! City Entity Store (§4.7). `nation_id` is a required FK (`ON DELETE
//! CASCADE`) — the same fetch-and-retry policy as `alliance_position.rs`,
//! resolving against Nation instead of Alliance.

use pnw_protocol::diff::{diff_fields, FieldChange};
use pnw_protocol::entities::City;
use pnw_protocol::EntityKind;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use super::{fetch_parent, is_fk_violation, log_dropped_record, EntityStore, StoreResult, PARENT_FETCH_RETRY_DELAYS};
use crate::store::nation;

async fn fetch(pool: &PgPool, id: i64) -> StoreResult<Option<City>> {
    let row = sqlx::query(
        "SELECT id, name, date_created, infrastructure, land, last_nuke_in_game_date, \
         oil_power_plants, wind_power_plants, coal_power_plants, nuclear_power_plants, \
         coal_mines, oil_wells, uranium_mines, bauxite_mines, lead_mines, iron_mines, farms, \
         oil_refineries, aluminum_refineries, steel_mills, munitions_factories, \
         police_stations, hospitals, recycling_centers, subways, supermarkets, banks, \
         shopping_malls, stadiums, barracks, factories, hangars, drydocks, nation_id \
         FROM city WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| City {
        id: row.get("id"),
        name: row.get("name"),
        date_created: row.get("date_created"),
        infrastructure: row.get("infrastructure"),
        land: row.get("land"),
        last_nuke_in_game_date: row.get("last_nuke_in_game_date"),
        oil_power_plants: row.get("oil_power_plants"),
        wind_power_plants: row.get("wind_power_plants"),
        coal_power_plants: row.get("coal_power_plants"),
        nuclear_power_plants: row.get("nuclear_power_plants"),
        coal_mines: row.get("coal_mines"),
        oil_wells: row.get("oil_wells"),
        uranium_mines: row.get("uranium_mines"),
        bauxite_mines: row.get("bauxite_mines"),
        lead_mines: row.get("lead_mines"),
        iron_mines: row.get("iron_mines"),
        farms: row.get("farms"),
        oil_refineries: row.get("oil_refineries"),
        aluminum_refineries: row.get("aluminum_refineries"),
        steel_mills: row.get("steel_mills"),
        munitions_factories: row.get("munitions_factories"),
        police_stations: row.get("police_stations"),
        hospitals: row.get("hospitals"),
        recycling_centers: row.get("recycling_centers"),
        subways: row.get("subways"),
        supermarkets: row.get("supermarkets"),
        banks: row.get("banks"),
        shopping_malls: row.get("shopping_malls"),
        stadiums: row.get("stadiums"),
        barracks: row.get("barracks"),
        factories: row.get("factories"),
        hangars: row.get("hangars"),
        drydocks: row.get("drydocks"),
        nation_id: row.get("nation_id"),
    }))
}

async fn insert_row(pool: &PgPool, rec: &City) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO city (id, name, date_created, infrastructure, land, \
         last_nuke_in_game_date, oil_power_plants, wind_power_plants, coal_power_plants, \
         nuclear_power_plants, coal_mines, oil_wells, uranium_mines, bauxite_mines, \
         lead_mines, iron_mines, farms, oil_refineries, aluminum_refineries, steel_mills, \
         munitions_factories, police_stations, hospitals, recycling_centers, subways, \
         supermarkets, banks, shopping_malls, stadiums, barracks, factories, hangars, \
         drydocks, nation_id) \
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,\
         $22,$23,$24,$25,$26,$27,$28,$29,$30,$31,$32,$33,$34) ON CONFLICT (id) DO NOTHING",
    )
    .bind(rec.id)
    .bind(&rec.name)
    .bind(rec.date_created)
    .bind(rec.infrastructure)
    .bind(rec.land)
    .bind(rec.last_nuke_in_game_date)
    .bind(rec.oil_power_plants)
    .bind(rec.wind_power_plants)
    .bind(rec.coal_power_plants)
    .bind(rec.nuclear_power_plants)
    .bind(rec.coal_mines)
    .bind(rec.oil_wells)
    .bind(rec.uranium_mines)
    .bind(rec.bauxite_mines)
    .bind(rec.lead_mines)
    .bind(rec.iron_mines)
    .bind(rec.farms)
    .bind(rec.oil_refineries)
    .bind(rec.aluminum_refineries)
    .bind(rec.steel_mills)
    .bind(rec.munitions_factories)
    .bind(rec.police_stations)
    .bind(rec.hospitals)
    .bind(rec.recycling_centers)
    .bind(rec.subways)
    .bind(rec.supermarkets)
    .bind(rec.banks)
    .bind(rec.shopping_malls)
    .bind(rec.stadiums)
    .bind(rec.barracks)
    .bind(rec.factories)
    .bind(rec.hangars)
    .bind(rec.drydocks)
    .bind(rec.nation_id)
    .execute(pool)
    .await?;
    Ok(())
}

fn push_set_clause(qb: &mut QueryBuilder<'_, Postgres>, rec: &City, field: &str) {
    match field {
        "name" => qb.push("name = ").push_bind(rec.name.clone()),
        "date_created" => qb.push("date_created = ").push_bind(rec.date_created),
        "infrastructure" => qb.push("infrastructure = ").push_bind(rec.infrastructure),
        "land" => qb.push("land = ").push_bind(rec.land),
        "last_nuke_in_game_date" => qb.push("last_nuke_in_game_date = ").push_bind(rec.last_nuke_in_game_date),
        "oil_power_plants" => qb.push("oil_power_plants = ").push_bind(rec.oil_power_plants),
        "wind_power_plants" => qb.push("wind_power_plants = ").push_bind(rec.wind_power_plants),
        "coal_power_plants" => qb.push("coal_power_plants = ").push_bind(rec.coal_power_plants),
        "nuclear_power_plants" => qb.push("nuclear_power_plants = ").push_bind(rec.nuclear_power_plants),
        "coal_mines" => qb.push("coal_mines = ").push_bind(rec.coal_mines),
        "oil_wells" => qb.push("oil_wells = ").push_bind(rec.oil_wells),
        "uranium_mines" => qb.push("uranium_mines = ").push_bind(rec.uranium_mines),
        "bauxite_mines" => qb.push("bauxite_mines = ").push_bind(rec.bauxite_mines),
        "lead_mines" => qb.push("lead_mines = ").push_bind(rec.lead_mines),
        "iron_mines" => qb.push("iron_mines = ").push_bind(rec.iron_mines),
        "farms" => qb.push("farms = ").push_bind(rec.farms),
        "oil_refineries" => qb.push("oil_refineries = ").push_bind(rec.oil_refineries),
        "aluminum_refineries" => qb.push("aluminum_refineries = ").push_bind(rec.aluminum_refineries),
        "steel_mills" => qb.push("steel_mills = ").push_bind(rec.steel_mills),
        "munitions_factories" => qb.push("munitions_factories = ").push_bind(rec.munitions_factories),
        "police_stations" => qb.push("police_stations = ").push_bind(rec.police_stations),
        "hospitals" => qb.push("hospitals = ").push_bind(rec.hospitals),
        "recycling_centers" => qb.push("recycling_centers = ").push_bind(rec.recycling_centers),
        "subways" => qb.push("subways = ").push_bind(rec.subways),
        "supermarkets" => qb.push("supermarkets = ").push_bind(rec.supermarkets),
        "banks" => qb.push("banks = ").push_bind(rec.banks),
        "shopping_malls" => qb.push("shopping_malls = ").push_bind(rec.shopping_malls),
        "stadiums" => qb.push("stadiums = ").push_bind(rec.stadiums),
        "barracks" => qb.push("barracks = ").push_bind(rec.barracks),
        "factories" => qb.push("factories = ").push_bind(rec.factories),
        "hangars" => qb.push("hangars = ").push_bind(rec.hangars),
        "drydocks" => qb.push("drydocks = ").push_bind(rec.drydocks),
        "nation_id" => qb.push("nation_id = ").push_bind(rec.nation_id),
        _ => qb,
    };
}

/// Builds and executes `UPDATE city SET <only the changed columns> WHERE id
/// = ...` (§4.7, §8 property 2).
async fn update_row(pool: &PgPool, rec: &City, changes: &[FieldChange]) -> Result<(), sqlx::Error> {
    if changes.is_empty() {
        return Ok(());
    }
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE city SET ");
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

pub async fn apply_create(store: &EntityStore, rec: &City) -> StoreResult<()> {
    match insert_row(&store.pool, rec).await {
        Ok(()) => return Ok(()),
        Err(e) if !is_fk_violation(&e) => return Err(e.into()),
        Err(_) => {}
    }

    if let Some(parent) = fetch_parent::<pnw_protocol::entities::Nation>(
        store,
        EntityKind::Nation,
        pnw_protocol::fields::NATION,
        rec.nation_id,
    )
    .await
    {
        nation::apply_create(store, &parent).await?;
    }

    for delay in PARENT_FETCH_RETRY_DELAYS {
        tokio::time::sleep(delay).await;
        match insert_row(&store.pool, rec).await {
            Ok(()) => return Ok(()),
            Err(e) if is_fk_violation(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    log_dropped_record("city", rec.id, "parent nation never became available");
    Ok(())
}

pub async fn apply_update(store: &EntityStore, rec: &City) -> StoreResult<()> {
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
            if let Some(parent) = fetch_parent::<pnw_protocol::entities::Nation>(
                store,
                EntityKind::Nation,
                pnw_protocol::fields::NATION,
                rec.nation_id,
            )
            .await
            {
                nation::apply_create(store, &parent).await?;
            }
            update_row(&store.pool, rec, &changes).await?;
        }
        Err(e) => return Err(e.into()),
    }

    let before = serde_json::to_value(&stored).expect("city always serializes to an object");
    for change in changes {
        store.bus.publish(&format!("city_{}_update", change.field), before.clone()).await;
    }
    Ok(())
}

pub async fn apply_delete(store: &EntityStore, id: i64) -> StoreResult<()> {
    sqlx::query("DELETE FROM city WHERE id = $1 RETURNING id").bind(id).fetch_optional(&store.pool).await?;
    Ok(())
}
