//! Reconciler (§4.6, §9): periodic full-sync reconciliation against upstream
//! snapshots — batched upsert of everything upstream reports, deletion of
//! anything stored locally that upstream no longer reports, and bisection
//! retry when a batch upsert hits a dangling foreign key.
//!
//! Grounded on `update.py`'s `timeit`-wrapped sync routines (one summary log
//! line per kind: synced count, deleted count, elapsed) and on the teacher's
//! free-function repo style. Multi-row batched upserts use `sqlx::QueryBuilder`
//! — the ecosystem's dynamic-row-count answer to the positional-placeholder
//! limit `repo/races.rs`'s fixed-arity `query().bind()` calls don't need to
//! solve, since every query there binds a single row.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use pnw_protocol::entities::{Alliance, AlliancePosition, City, Nation, War};
use pnw_protocol::EntityKind;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;

use crate::error::ReconcileError;
use crate::store::{log_dropped_record, war, EntityStore};

/// Postgres binds a query to at most 65535 parameters; `32767` keeps a wide
/// safety margin under that for a single batched `INSERT`.
const MAX_PARAMS: usize = 32767;

/// First bisection fallback width after a full batch fails.
const BISECTION_WIDTH: usize = 50;

pub struct SyncSummary {
    pub kind: EntityKind,
    pub synced: usize,
    pub deleted: usize,
    pub elapsed: Duration,
}

fn log_summary(summary: &SyncSummary) {
    info!(
        kind = ?summary.kind,
        synced = summary.synced,
        deleted = summary.deleted,
        elapsed_ms = summary.elapsed.as_millis(),
        "reconciler sync complete"
    );
}

/// Runs a full sync of every reconciled kind, deferring the city snapshot
/// `cities_delay` after the nation snapshot lands (§4.6: cities reference
/// nations, so giving the nation sync a head start avoids a burst of
/// avoidable dangling-FK bisection on first boot).
pub async fn reconcile_all(store: &EntityStore, cities_delay: Duration) -> Result<Vec<SyncSummary>, ReconcileError> {
    let mut summaries = Vec::new();
    summaries.push(reconcile_alliance(store).await?);
    summaries.push(reconcile_alliance_position(store).await?);
    summaries.push(reconcile_nation(store).await?);
    summaries.push(reconcile_account(store).await?);
    summaries.push(reconcile_war(store).await?);

    tokio::time::sleep(cities_delay).await;
    summaries.push(reconcile_city(store).await?);

    Ok(summaries)
}

async fn local_ids(pool: &PgPool, table: &str) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar(&format!("SELECT id FROM {table}")).fetch_all(pool).await
}

async fn delete_stragglers(pool: &PgPool, table: &str, upstream_ids: &HashSet<i64>) -> Result<usize, sqlx::Error> {
    let stragglers: Vec<i64> =
        local_ids(pool, table).await?.into_iter().filter(|id| !upstream_ids.contains(id)).collect();
    for id in &stragglers {
        sqlx::query(&format!("DELETE FROM {table} WHERE id = $1")).bind(id).execute(pool).await?;
    }
    Ok(stragglers.len())
}

// ---------------------------------------------------------------------------
// Alliance — no foreign keys, so no bisection path is reachable.
// ---------------------------------------------------------------------------

const ALLIANCE_COLUMNS: usize = 9;

fn push_alliance_row<'a>(mut b: sqlx::query_builder::Separated<'_, 'a, Postgres, &'static str>, rec: &'a Alliance) {
    b.push_bind(rec.id)
        .push_bind(&rec.name)
        .push_bind(&rec.acronym)
        .push_bind(rec.score)
        .push_bind(rec.color.to_string())
        .push_bind(rec.date_created)
        .push_bind(rec.accepts_members)
        .push_bind(&rec.flag_url)
        .push_bind(rec.rank);
}

async fn upsert_alliance_chunk(pool: &PgPool, chunk: &[Alliance]) -> Result<(), sqlx::Error> {
    if chunk.is_empty() {
        return Ok(());
    }
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO alliance (id, name, acronym, score, color, date_created, accepts_members, flag_url, rank) ",
    );
    qb.push_values(chunk, |b, rec| push_alliance_row(b, rec));
    qb.push(
        " ON CONFLICT (id) DO UPDATE SET name=EXCLUDED.name, acronym=EXCLUDED.acronym, \
         score=EXCLUDED.score, color=EXCLUDED.color, date_created=EXCLUDED.date_created, \
         accepts_members=EXCLUDED.accepts_members, flag_url=EXCLUDED.flag_url, rank=EXCLUDED.rank",
    );
    qb.build().execute(pool).await?;
    Ok(())
}

async fn reconcile_alliance(store: &EntityStore) -> Result<SyncSummary, ReconcileError> {
    let start = Instant::now();
    let snapshot = store.rest.snapshot::<Alliance>(&pnw_rest::queries::snapshot_path(EntityKind::Alliance)).await?;
    let upstream_ids: HashSet<i64> = snapshot.data.iter().map(|r| r.id).collect();

    let batch_size = (MAX_PARAMS / ALLIANCE_COLUMNS).max(1);
    for chunk in snapshot.data.chunks(batch_size) {
        upsert_alliance_chunk(&store.pool, chunk).await?;
    }

    let deleted = delete_stragglers(&store.pool, "alliance", &upstream_ids).await?;
    let summary = SyncSummary { kind: EntityKind::Alliance, synced: snapshot.data.len(), deleted, elapsed: start.elapsed() };
    log_summary(&summary);
    Ok(summary)
}

// ---------------------------------------------------------------------------
// AlliancePosition — required FK on alliance_id; dangling rows are dropped.
// ---------------------------------------------------------------------------

const ALLIANCE_POSITION_COLUMNS: usize = 9;

fn push_alliance_position_row<'a>(
    mut b: sqlx::query_builder::Separated<'_, 'a, Postgres, &'static str>,
    rec: &'a AlliancePosition,
) {
    b.push_bind(rec.id)
        .push_bind(&rec.name)
        .push_bind(rec.date_created)
        .push_bind(rec.date_modified)
        .push_bind(rec.position_level)
        .push_bind(rec.permission_bits)
        .push_bind(rec.creator_id)
        .push_bind(rec.last_editor_id)
        .push_bind(rec.alliance_id);
}

async fn upsert_alliance_position_chunk(pool: &PgPool, chunk: &[AlliancePosition]) -> Result<(), sqlx::Error> {
    if chunk.is_empty() {
        return Ok(());
    }
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO alliance_position (id, name, date_created, date_modified, position_level, \
         permission_bits, creator_id, last_editor_id, alliance_id) ",
    );
    qb.push_values(chunk, |b, rec| push_alliance_position_row(b, rec));
    qb.push(
        " ON CONFLICT (id) DO UPDATE SET name=EXCLUDED.name, date_created=EXCLUDED.date_created, \
         date_modified=EXCLUDED.date_modified, position_level=EXCLUDED.position_level, \
         permission_bits=EXCLUDED.permission_bits, creator_id=EXCLUDED.creator_id, \
         last_editor_id=EXCLUDED.last_editor_id, alliance_id=EXCLUDED.alliance_id",
    );
    qb.build().execute(pool).await?;
    Ok(())
}

async fn reconcile_alliance_position(store: &EntityStore) -> Result<SyncSummary, ReconcileError> {
    let start = Instant::now();
    let snapshot = store
        .rest
        .snapshot::<AlliancePosition>(&pnw_rest::queries::snapshot_path(EntityKind::AlliancePosition))
        .await?;
    let upstream_ids: HashSet<i64> = snapshot.data.iter().map(|r| r.id).collect();

    let batch_size = (MAX_PARAMS / ALLIANCE_POSITION_COLUMNS).max(1);
    for chunk in snapshot.data.chunks(batch_size) {
        if upsert_alliance_position_chunk(&store.pool, chunk).await.is_err() {
            bisect_required_fk(&store.pool, chunk, "alliance_position", upsert_alliance_position_chunk).await?;
        }
    }

    let deleted = delete_stragglers(&store.pool, "alliance_position", &upstream_ids).await?;
    let summary =
        SyncSummary { kind: EntityKind::AlliancePosition, synced: snapshot.data.len(), deleted, elapsed: start.elapsed() };
    log_summary(&summary);
    Ok(summary)
}

/// Bisects a failing chunk down to individual rows (full batch -> 50-row ->
/// single row), dropping any row that still violates its required foreign
/// key at single-row granularity (§4.7, §9).
async fn bisect_required_fk<T, F, Fut>(
    pool: &PgPool,
    chunk: &[T],
    kind: &str,
    upsert: F,
) -> Result<(), sqlx::Error>
where
    T: HasId,
    F: Fn(&'_ PgPool, &'_ [T]) -> Fut + Copy,
    Fut: std::future::Future<Output = Result<(), sqlx::Error>>,
{
    for sub in chunk.chunks(BISECTION_WIDTH.min(chunk.len()).max(1)) {
        if upsert(pool, sub).await.is_ok() {
            continue;
        }
        for rec in sub {
            if upsert(pool, std::slice::from_ref(rec)).await.is_err() {
                log_dropped_record(kind, rec.id(), "required foreign key never resolved in snapshot");
            }
        }
    }
    Ok(())
}

trait HasId {
    fn id(&self) -> i64;
}
impl HasId for AlliancePosition {
    fn id(&self) -> i64 {
        self.id
    }
}
impl HasId for City {
    fn id(&self) -> i64 {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Nation — both FKs nullable; dangling rows are retried with the offending
// column(s) nulled rather than dropped.
// ---------------------------------------------------------------------------

const NATION_COLUMNS: usize = 36;

fn push_nation_row<'a>(mut b: sqlx::query_builder::Separated<'_, 'a, Postgres, &'static str>, rec: &'a Nation) {
    b.push_bind(rec.id)
        .push_bind(&rec.name)
        .push_bind(&rec.leader_name)
        .push_bind(rec.continent.to_string())
        .push_bind(rec.war_policy.to_string())
        .push_bind(rec.war_policy_turns)
        .push_bind(rec.domestic_policy.to_string())
        .push_bind(rec.domestic_policy_turns)
        .push_bind(rec.num_cities)
        .push_bind(rec.color.to_string())
        .push_bind(rec.score)
        .push_bind(rec.update_timezone)
        .push_bind(rec.population)
        .push_bind(&rec.flag_url)
        .push_bind(rec.vacation_mode_turns)
        .push_bind(rec.beige_turns)
        .push_bind(rec.espionage_available)
        .push_bind(rec.last_active)
        .push_bind(rec.date_created)
        .push_bind(rec.soldiers)
        .push_bind(rec.tanks)
        .push_bind(rec.aircraft)
        .push_bind(rec.ships)
        .push_bind(rec.missiles)
        .push_bind(rec.nukes)
        .push_bind(rec.spies)
        .push_bind(rec.discord_id)
        .push_bind(rec.turns_since_last_city)
        .push_bind(rec.turns_since_last_project)
        .push_bind(rec.num_projects)
        .push_bind(rec.project_bits)
        .push_bind(rec.wars_won)
        .push_bind(rec.wars_lost)
        .push_bind(rec.alliance_seniority_days)
        .push_bind(rec.alliance_id)
        .push_bind(rec.alliance_position_id);
}

async fn upsert_nation_chunk(pool: &PgPool, chunk: &[Nation]) -> Result<(), sqlx::Error> {
    if chunk.is_empty() {
        return Ok(());
    }
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO nation (id, name, leader_name, continent, war_policy, war_policy_turns, \
         domestic_policy, domestic_policy_turns, num_cities, color, score, update_timezone, \
         population, flag_url, vacation_mode_turns, beige_turns, espionage_available, \
         last_active, date_created, soldiers, tanks, aircraft, ships, missiles, nukes, spies, \
         discord_id, turns_since_last_city, turns_since_last_project, num_projects, \
         project_bits, wars_won, wars_lost, alliance_seniority_days, alliance_id, \
         alliance_position_id) ",
    );
    qb.push_values(chunk, |b, rec| push_nation_row(b, rec));
    qb.push(
        " ON CONFLICT (id) DO UPDATE SET name=EXCLUDED.name, leader_name=EXCLUDED.leader_name, \
         continent=EXCLUDED.continent, war_policy=EXCLUDED.war_policy, \
         war_policy_turns=EXCLUDED.war_policy_turns, domestic_policy=EXCLUDED.domestic_policy, \
         domestic_policy_turns=EXCLUDED.domestic_policy_turns, num_cities=EXCLUDED.num_cities, \
         color=EXCLUDED.color, score=EXCLUDED.score, update_timezone=EXCLUDED.update_timezone, \
         population=EXCLUDED.population, flag_url=EXCLUDED.flag_url, \
         vacation_mode_turns=EXCLUDED.vacation_mode_turns, beige_turns=EXCLUDED.beige_turns, \
         espionage_available=EXCLUDED.espionage_available, last_active=EXCLUDED.last_active, \
         date_created=EXCLUDED.date_created, soldiers=EXCLUDED.soldiers, tanks=EXCLUDED.tanks, \
         aircraft=EXCLUDED.aircraft, ships=EXCLUDED.ships, missiles=EXCLUDED.missiles, \
         nukes=EXCLUDED.nukes, spies=EXCLUDED.spies, discord_id=EXCLUDED.discord_id, \
         turns_since_last_city=EXCLUDED.turns_since_last_city, \
         turns_since_last_project=EXCLUDED.turns_since_last_project, \
         num_projects=EXCLUDED.num_projects, project_bits=EXCLUDED.project_bits, \
         wars_won=EXCLUDED.wars_won, wars_lost=EXCLUDED.wars_lost, \
         alliance_seniority_days=EXCLUDED.alliance_seniority_days, \
         alliance_id=EXCLUDED.alliance_id, alliance_position_id=EXCLUDED.alliance_position_id",
    );
    qb.build().execute(pool).await?;
    Ok(())
}

async fn bisect_nullable_fk_nation(pool: &PgPool, chunk: &[Nation]) -> Result<(), sqlx::Error> {
    for sub in chunk.chunks(BISECTION_WIDTH.min(chunk.len()).max(1)) {
        if upsert_nation_chunk(pool, sub).await.is_ok() {
            continue;
        }
        for rec in sub {
            if upsert_nation_chunk(pool, std::slice::from_ref(rec)).await.is_ok() {
                continue;
            }
            let mut nulled = rec.clone();
            nulled.alliance_id = None;
            nulled.alliance_position_id = None;
            let _ = upsert_nation_chunk(pool, std::slice::from_ref(&nulled)).await;
        }
    }
    Ok(())
}

async fn reconcile_nation(store: &EntityStore) -> Result<SyncSummary, ReconcileError> {
    let start = Instant::now();
    let snapshot = store.rest.snapshot::<Nation>(&pnw_rest::queries::snapshot_path(EntityKind::Nation)).await?;
    let upstream_ids: HashSet<i64> = snapshot.data.iter().map(|r| r.id).collect();

    let batch_size = (MAX_PARAMS / NATION_COLUMNS).max(1);
    for chunk in snapshot.data.chunks(batch_size) {
        if upsert_nation_chunk(&store.pool, chunk).await.is_err() {
            bisect_nullable_fk_nation(&store.pool, chunk).await?;
        }
    }

    let deleted = delete_stragglers(&store.pool, "nation", &upstream_ids).await?;
    let summary = SyncSummary { kind: EntityKind::Nation, synced: snapshot.data.len(), deleted, elapsed: start.elapsed() };
    log_summary(&summary);
    Ok(summary)
}

// ---------------------------------------------------------------------------
// City — required FK on nation_id; dangling rows are dropped, same as
// alliance positions.
// ---------------------------------------------------------------------------

const CITY_COLUMNS: usize = 34;

fn push_city_row<'a>(mut b: sqlx::query_builder::Separated<'_, 'a, Postgres, &'static str>, rec: &'a City) {
    b.push_bind(rec.id)
        .push_bind(&rec.name)
        .push_bind(rec.date_created)
        .push_bind(rec.infrastructure)
        .push_bind(rec.land)
        .push_bind(rec.last_nuke_in_game_date)
        .push_bind(rec.oil_power_plants)
        .push_bind(rec.wind_power_plants)
        .push_bind(rec.coal_power_plants)
        .push_bind(rec.nuclear_power_plants)
        .push_bind(rec.coal_mines)
        .push_bind(rec.oil_wells)
        .push_bind(rec.uranium_mines)
        .push_bind(rec.bauxite_mines)
        .push_bind(rec.lead_mines)
        .push_bind(rec.iron_mines)
        .push_bind(rec.farms)
        .push_bind(rec.oil_refineries)
        .push_bind(rec.aluminum_refineries)
        .push_bind(rec.steel_mills)
        .push_bind(rec.munitions_factories)
        .push_bind(rec.police_stations)
        .push_bind(rec.hospitals)
        .push_bind(rec.recycling_centers)
        .push_bind(rec.subways)
        .push_bind(rec.supermarkets)
        .push_bind(rec.banks)
        .push_bind(rec.shopping_malls)
        .push_bind(rec.stadiums)
        .push_bind(rec.barracks)
        .push_bind(rec.factories)
        .push_bind(rec.hangars)
        .push_bind(rec.drydocks)
        .push_bind(rec.nation_id);
}

async fn upsert_city_chunk(pool: &PgPool, chunk: &[City]) -> Result<(), sqlx::Error> {
    if chunk.is_empty() {
        return Ok(());
    }
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO city (id, name, date_created, infrastructure, land, \
         last_nuke_in_game_date, oil_power_plants, wind_power_plants, coal_power_plants, \
         nuclear_power_plants, coal_mines, oil_wells, uranium_mines, bauxite_mines, \
         lead_mines, iron_mines, farms, oil_refineries, aluminum_refineries, steel_mills, \
         munitions_factories, police_stations, hospitals, recycling_centers, subways, \
         supermarkets, banks, shopping_malls, stadiums, barracks, factories, hangars, \
         drydocks, nation_id) ",
    );
    qb.push_values(chunk, |b, rec| push_city_row(b, rec));
    qb.push(
        " ON CONFLICT (id) DO UPDATE SET name=EXCLUDED.name, date_created=EXCLUDED.date_created, \
         infrastructure=EXCLUDED.infrastructure, land=EXCLUDED.land, \
         last_nuke_in_game_date=EXCLUDED.last_nuke_in_game_date, \
         oil_power_plants=EXCLUDED.oil_power_plants, wind_power_plants=EXCLUDED.wind_power_plants, \
         coal_power_plants=EXCLUDED.coal_power_plants, nuclear_power_plants=EXCLUDED.nuclear_power_plants, \
         coal_mines=EXCLUDED.coal_mines, oil_wells=EXCLUDED.oil_wells, uranium_mines=EXCLUDED.uranium_mines, \
         bauxite_mines=EXCLUDED.bauxite_mines, lead_mines=EXCLUDED.lead_mines, iron_mines=EXCLUDED.iron_mines, \
         farms=EXCLUDED.farms, oil_refineries=EXCLUDED.oil_refineries, \
         aluminum_refineries=EXCLUDED.aluminum_refineries, steel_mills=EXCLUDED.steel_mills, \
         munitions_factories=EXCLUDED.munitions_factories, police_stations=EXCLUDED.police_stations, \
         hospitals=EXCLUDED.hospitals, recycling_centers=EXCLUDED.recycling_centers, subways=EXCLUDED.subways, \
         supermarkets=EXCLUDED.supermarkets, banks=EXCLUDED.banks, shopping_malls=EXCLUDED.shopping_malls, \
         stadiums=EXCLUDED.stadiums, barracks=EXCLUDED.barracks, factories=EXCLUDED.factories, \
         hangars=EXCLUDED.hangars, drydocks=EXCLUDED.drydocks, nation_id=EXCLUDED.nation_id",
    );
    qb.build().execute(pool).await?;
    Ok(())
}

async fn reconcile_city(store: &EntityStore) -> Result<SyncSummary, ReconcileError> {
    let start = Instant::now();
    let snapshot = store.rest.snapshot::<City>(&pnw_rest::queries::snapshot_path(EntityKind::City)).await?;
    let upstream_ids: HashSet<i64> = snapshot.data.iter().map(|r| r.id).collect();

    let batch_size = (MAX_PARAMS / CITY_COLUMNS).max(1);
    for chunk in snapshot.data.chunks(batch_size) {
        if upsert_city_chunk(&store.pool, chunk).await.is_err() {
            bisect_required_fk(&store.pool, chunk, "city", upsert_city_chunk).await?;
        }
    }

    let deleted = delete_stragglers(&store.pool, "city", &upstream_ids).await?;
    let summary = SyncSummary { kind: EntityKind::City, synced: snapshot.data.len(), deleted, elapsed: start.elapsed() };
    log_summary(&summary);
    Ok(summary)
}

// ---------------------------------------------------------------------------
// War — no declared FK, so straight batched upsert with no bisection path.
// No deletion pass: upstream never stops reporting a war that happened.
// ---------------------------------------------------------------------------

async fn reconcile_war(store: &EntityStore) -> Result<SyncSummary, ReconcileError> {
    let start = Instant::now();
    let snapshot = store.rest.snapshot::<War>(&pnw_rest::queries::snapshot_path(EntityKind::War)).await?;
    for rec in &snapshot.data {
        war::insert_row(&store.pool, rec).await?;
    }
    let summary = SyncSummary { kind: EntityKind::War, synced: snapshot.data.len(), deleted: 0, elapsed: start.elapsed() };
    log_summary(&summary);
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Account — not its own table; a snapshot read just replays each record
// through the same live-feed mutation path (§4.7's account-update special
// case). No deletion pass: an account never un-links from its nation.
// ---------------------------------------------------------------------------

async fn reconcile_account(store: &EntityStore) -> Result<SyncSummary, ReconcileError> {
    let start = Instant::now();
    let snapshot = store
        .rest
        .snapshot::<pnw_protocol::entities::Account>(&pnw_rest::queries::snapshot_path(EntityKind::Account))
        .await?;
    let synced = snapshot.data.len();
    for rec in &snapshot.data {
        crate::store::nation::apply_account_update(store, rec).await?;
    }
    let summary = SyncSummary { kind: EntityKind::Account, synced, deleted: 0, elapsed: start.elapsed() };
    log_summary(&summary);
    Ok(summary)
}
