//! Wire-format record types for the five (six, counting `War`) upstream
//! entity kinds.
//!
//! Every struct here deserializes directly from a subscribe/snapshot record
//! (or a `BULK_*` array element) exactly as upstream sends it — `#[serde(rename
//! = "...")]` bridges the upstream's field name to this crate's name wherever
//! they differ, mirroring the `# API name: ...` annotations the original bot
//! carried on its table columns. Sentinel normalization (negative-year dates,
//! `"0"`-string FK placeholders) happens in the custom `Deserialize` impls
//! below rather than downstream in the store, so a deserialized record is
//! already storage-ready.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::enums::{Color, Continent, DomesticPolicy, WarPolicy, WarType};

/// Deserializes an optional upstream date, treating a negative-year date
/// (upstream's "never happened" sentinel, e.g. a city never nuked) as `None`.
fn deserialize_sentinel_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(s) if s.starts_with('-') => None,
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok(),
        None => None,
    })
}

/// Deserializes an optional upstream nation id that upstream represents as
/// the string `"0"` when absent (ground control, air superiority, naval
/// blockade, winner — see §8.5).
fn deserialize_sentinel_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdOrString {
        Id(i64),
        Str(String),
        Null,
    }
    let raw = Option::<IdOrString>::deserialize(deserializer)?;
    Ok(match raw {
        Some(IdOrString::Id(0)) | Some(IdOrString::Null) | None => None,
        Some(IdOrString::Str(s)) if s == "0" => None,
        Some(IdOrString::Id(n)) => Some(n),
        Some(IdOrString::Str(s)) => s.parse().ok(),
    })
}

// NB: every upstream-name bridge below uses `rename(deserialize = "...")`,
// never a plain `rename`. A plain `rename` would also rewrite the JSON key
// used when *serializing*, which would break `diff::diff_fields` — its
// column-name-keyed diff depends on `Serialize` emitting this crate's own
// field names, not upstream's.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alliance {
    pub id: i64,
    pub name: String,
    pub acronym: String,
    pub score: f64,
    pub color: Color,
    #[serde(rename(deserialize = "date"))]
    pub date_created: DateTime<Utc>,
    #[serde(rename(deserialize = "accept_members"))]
    pub accepts_members: bool,
    #[serde(rename(deserialize = "flag"))]
    pub flag_url: String,
    pub rank: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlliancePosition {
    pub id: i64,
    pub name: String,
    #[serde(rename(deserialize = "date"))]
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    pub position_level: i32,
    #[serde(rename(deserialize = "permissions"))]
    pub permission_bits: i32,
    pub creator_id: Option<i64>,
    pub last_editor_id: Option<i64>,
    pub alliance_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nation {
    pub id: i64,
    #[serde(rename(deserialize = "nation_name"))]
    pub name: String,
    pub leader_name: String,
    pub continent: Continent,
    pub war_policy: WarPolicy,
    pub war_policy_turns: i32,
    pub domestic_policy: DomesticPolicy,
    pub domestic_policy_turns: i32,
    pub num_cities: i32,
    pub color: Color,
    pub score: f64,
    #[serde(rename(deserialize = "update_tz"))]
    pub update_timezone: Option<f64>,
    pub population: i64,
    #[serde(rename(deserialize = "flag"))]
    pub flag_url: String,
    pub vacation_mode_turns: i32,
    pub beige_turns: i32,
    pub espionage_available: bool,
    pub last_active: Option<DateTime<Utc>>,
    #[serde(rename(deserialize = "date"))]
    pub date_created: DateTime<Utc>,
    pub soldiers: i64,
    pub tanks: i64,
    pub aircraft: i64,
    pub ships: i64,
    pub missiles: i64,
    pub nukes: i64,
    pub spies: i64,
    pub discord_id: Option<i64>,
    pub turns_since_last_city: i32,
    pub turns_since_last_project: i32,
    #[serde(rename(deserialize = "projects"))]
    pub num_projects: i32,
    pub project_bits: i64,
    pub wars_won: i32,
    pub wars_lost: i32,
    pub alliance_seniority_days: i32,
    pub alliance_id: Option<i64>,
    pub alliance_position_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub id: i64,
    pub name: String,
    #[serde(rename(deserialize = "date"))]
    pub date_created: NaiveDate,
    pub infrastructure: f64,
    pub land: f64,
    #[serde(rename(deserialize = "nuke_date"), deserialize_with = "deserialize_sentinel_date")]
    pub last_nuke_in_game_date: Option<NaiveDate>,

    #[serde(rename(deserialize = "oil_power"))]
    pub oil_power_plants: i32,
    #[serde(rename(deserialize = "wind_power"))]
    pub wind_power_plants: i32,
    #[serde(rename(deserialize = "coal_power"))]
    pub coal_power_plants: i32,
    #[serde(rename(deserialize = "nuclear_power"))]
    pub nuclear_power_plants: i32,

    #[serde(rename(deserialize = "coal_mine"))]
    pub coal_mines: i32,
    #[serde(rename(deserialize = "oil_well"))]
    pub oil_wells: i32,
    #[serde(rename(deserialize = "uranium_mine"))]
    pub uranium_mines: i32,
    #[serde(rename(deserialize = "bauxite_mine"))]
    pub bauxite_mines: i32,
    #[serde(rename(deserialize = "lead_mine"))]
    pub lead_mines: i32,
    #[serde(rename(deserialize = "iron_mine"))]
    pub iron_mines: i32,
    #[serde(rename(deserialize = "farm"))]
    pub farms: i32,

    #[serde(rename(deserialize = "oil_refinery"))]
    pub oil_refineries: i32,
    #[serde(rename(deserialize = "aluminum_refinery"))]
    pub aluminum_refineries: i32,
    #[serde(rename(deserialize = "steel_mill"))]
    pub steel_mills: i32,
    #[serde(rename(deserialize = "munitions_factory"))]
    pub munitions_factories: i32,

    #[serde(rename(deserialize = "police_station"))]
    pub police_stations: i32,
    pub hospitals: i32,
    #[serde(rename(deserialize = "recycling_center"))]
    pub recycling_centers: i32,
    pub subways: i32,

    pub supermarkets: i32,
    pub banks: i32,
    #[serde(rename(deserialize = "shopping_mall"))]
    pub shopping_malls: i32,
    pub stadiums: i32,

    pub barracks: i32,
    #[serde(rename(deserialize = "factory"))]
    pub factories: i32,
    #[serde(rename(deserialize = "hangar"))]
    pub hangars: i32,
    #[serde(rename(deserialize = "drydock"))]
    pub drydocks: i32,

    pub nation_id: i64,
}

/// Not a persisted entity — the live account-update feed mutates
/// `Nation.discord_id`/`Nation.last_active` directly (§4.7's account-update
/// special case). This struct only shapes the wire payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub discord_id: i64,
    pub last_active: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct War {
    pub id: i64,
    #[serde(rename(deserialize = "date"))]
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub reason: String,
    pub war_type: WarType,
    pub turns_left: i32,

    #[serde(rename(deserialize = "att_points"))]
    pub attacker_action_points: i32,
    #[serde(rename(deserialize = "def_points"))]
    pub defender_action_points: i32,
    #[serde(rename(deserialize = "att_peace"))]
    pub attacker_offering_peace: bool,
    #[serde(rename(deserialize = "def_peace"))]
    pub defender_offering_peace: bool,
    #[serde(rename(deserialize = "att_resistance"))]
    pub attacker_resistance: i32,
    #[serde(rename(deserialize = "def_resistance"))]
    pub defender_resistance: i32,
    #[serde(rename(deserialize = "att_fortify"))]
    pub attacker_fortified: bool,
    #[serde(rename(deserialize = "def_fortify"))]
    pub defender_fortified: bool,
    #[serde(rename(deserialize = "att_gas_used"))]
    pub attacker_gasoline_used: f32,
    #[serde(rename(deserialize = "def_gas_used"))]
    pub defender_gasoline_used: f32,
    #[serde(rename(deserialize = "att_mun_used"))]
    pub attacker_munitions_used: f32,
    #[serde(rename(deserialize = "def_mun_used"))]
    pub defender_munitions_used: f32,
    #[serde(rename(deserialize = "att_alum_used"))]
    pub attacker_aluminum_used: f32,
    #[serde(rename(deserialize = "def_alum_used"))]
    pub defender_aluminum_used: f32,
    #[serde(rename(deserialize = "att_steel_used"))]
    pub attacker_steel_used: f32,
    #[serde(rename(deserialize = "def_steel_used"))]
    pub defender_steel_used: f32,
    #[serde(rename(deserialize = "att_infra_destroyed"))]
    pub attacker_infra_destroyed: f32,
    #[serde(rename(deserialize = "def_infra_destroyed"))]
    pub defender_infra_destroyed: f32,
    #[serde(rename(deserialize = "att_money_looted"))]
    pub attacker_money_looted: f32,
    #[serde(rename(deserialize = "def_money_looted"))]
    pub defender_money_looted: f32,
    #[serde(rename(deserialize = "att_soldiers_lost"))]
    pub attacker_soldiers_lost: i32,
    #[serde(rename(deserialize = "def_soldiers_lost"))]
    pub defender_soldiers_lost: i32,
    #[serde(rename(deserialize = "att_tanks_lost"))]
    pub attacker_tanks_lost: i32,
    #[serde(rename(deserialize = "def_tanks_lost"))]
    pub defender_tanks_lost: i32,
    #[serde(rename(deserialize = "att_aircraft_lost"))]
    pub attacker_aircraft_lost: i32,
    #[serde(rename(deserialize = "def_aircraft_lost"))]
    pub defender_aircraft_lost: i32,
    #[serde(rename(deserialize = "att_ships_lost"))]
    pub attacker_ships_lost: i32,
    #[serde(rename(deserialize = "def_ships_lost"))]
    pub defender_ships_lost: i32,
    #[serde(rename(deserialize = "att_missiles_used"))]
    pub attacker_missiles_used: i32,
    #[serde(rename(deserialize = "def_missiles_used"))]
    pub defender_missiles_used: i32,
    #[serde(rename(deserialize = "att_nukes_used"))]
    pub attacker_nukes_used: i32,
    #[serde(rename(deserialize = "def_nukes_used"))]
    pub defender_nukes_used: i32,
    #[serde(rename(deserialize = "att_infra_destroyed_value"))]
    pub attacker_infra_destroyed_value: f32,
    #[serde(rename(deserialize = "def_infra_destroyed_value"))]
    pub defender_infra_destroyed_value: f32,

    #[serde(rename(deserialize = "att_id"))]
    pub attacker_id: i64,
    #[serde(rename(deserialize = "def_id"))]
    pub defender_id: i64,
    #[serde(rename(deserialize = "ground_control"), deserialize_with = "deserialize_sentinel_id")]
    pub ground_control_id: Option<i64>,
    #[serde(rename(deserialize = "air_superiority"), deserialize_with = "deserialize_sentinel_id")]
    pub air_superiority_id: Option<i64>,
    #[serde(rename(deserialize = "naval_blockade"), deserialize_with = "deserialize_sentinel_id")]
    pub naval_blockade_id: Option<i64>,
    #[serde(deserialize_with = "deserialize_sentinel_id")]
    pub winner_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn city_never_nuked_date_normalizes_to_null() {
        let json = serde_json::json!({
            "id": 1, "name": "x", "date": "2023-07-15", "infrastructure": 100.0,
            "land": 500.0, "nuke_date": "-2023-07-15",
            "oil_power": 0, "wind_power": 0, "coal_power": 0, "nuclear_power": 0,
            "coal_mine": 0, "oil_well": 0, "uranium_mine": 0, "bauxite_mine": 0,
            "lead_mine": 0, "iron_mine": 0, "farm": 0,
            "oil_refinery": 0, "aluminum_refinery": 0, "steel_mill": 0, "munitions_factory": 0,
            "police_station": 0, "hospitals": 0, "recycling_center": 0, "subways": 0,
            "supermarkets": 0, "banks": 0, "shopping_mall": 0, "stadiums": 0,
            "barracks": 0, "factory": 0, "hangar": 0, "drydock": 0,
            "nation_id": 42
        });
        let city: City = serde_json::from_value(json).unwrap();
        assert_eq!(city.last_nuke_in_game_date, None);
    }

    #[test]
    fn war_zero_string_sentinels_normalize_to_null() {
        let war_json = serde_json::json!({
            "id": 1, "date": "2024-01-01T00:00:00Z", "end_date": null, "reason": "r",
            "war_type": "ORDINARY", "turns_left": 5,
            "att_points": 0, "def_points": 0, "att_peace": false, "def_peace": false,
            "att_resistance": 100, "def_resistance": 100, "att_fortify": false, "def_fortify": false,
            "att_gas_used": 0.0, "def_gas_used": 0.0, "att_mun_used": 0.0, "def_mun_used": 0.0,
            "att_alum_used": 0.0, "def_alum_used": 0.0, "att_steel_used": 0.0, "def_steel_used": 0.0,
            "att_infra_destroyed": 0.0, "def_infra_destroyed": 0.0,
            "att_money_looted": 0.0, "def_money_looted": 0.0,
            "att_soldiers_lost": 0, "def_soldiers_lost": 0, "att_tanks_lost": 0, "def_tanks_lost": 0,
            "att_aircraft_lost": 0, "def_aircraft_lost": 0, "att_ships_lost": 0, "def_ships_lost": 0,
            "att_missiles_used": 0, "def_missiles_used": 0, "att_nukes_used": 0, "def_nukes_used": 0,
            "att_infra_destroyed_value": 0.0, "def_infra_destroyed_value": 0.0,
            "att_id": 1, "def_id": 2,
            "ground_control": "0", "air_superiority": "0", "naval_blockade": "0", "winner_id": "0"
        });
        let war: War = serde_json::from_value(war_json).unwrap();
        assert_eq!(war.ground_control_id, None);
        assert_eq!(war.air_superiority_id, None);
        assert_eq!(war.naval_blockade_id, None);
        assert_eq!(war.winner_id, None);
    }
}
