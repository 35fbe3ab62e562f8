//! Sample wire-format payloads for each entity kind, used by both unit and
//! integration tests so call sites don't hand-roll JSON literals.

use serde_json::{json, Value};

pub fn alliance(id: i64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "acronym": "ACR",
        "score": 1234.5,
        "color": "beige",
        "date": "2020-01-01T00:00:00Z",
        "accept_members": true,
        "flag": "https://example.test/flag.png",
        "rank": 1,
    })
}

pub fn alliance_position(id: i64, alliance_id: i64) -> Value {
    json!({
        "id": id,
        "name": "Member",
        "date": "2020-01-01T00:00:00Z",
        "date_modified": "2020-01-02T00:00:00Z",
        "position_level": 1,
        "permissions": 0,
        "creator_id": Value::Null,
        "last_editor_id": Value::Null,
        "alliance_id": alliance_id,
    })
}

pub fn nation(id: i64, alliance_id: Option<i64>) -> Value {
    json!({
        "id": id,
        "nation_name": "Testland",
        "leader_name": "Leader",
        "continent": "na",
        "war_policy": "ATTRITION",
        "war_policy_turns": 0,
        "domestic_policy": "OPEN_MARKETS",
        "domestic_policy_turns": 0,
        "num_cities": 1,
        "color": "beige",
        "score": 50.0,
        "update_tz": Value::Null,
        "population": 1000,
        "flag": "https://example.test/flag.png",
        "vacation_mode_turns": 0,
        "beige_turns": 0,
        "espionage_available": true,
        "last_active": Value::Null,
        "date": "2020-01-01T00:00:00Z",
        "soldiers": 0,
        "tanks": 0,
        "aircraft": 0,
        "ships": 0,
        "missiles": 0,
        "nukes": 0,
        "spies": 0,
        "discord_id": Value::Null,
        "turns_since_last_city": 0,
        "turns_since_last_project": 0,
        "projects": 0,
        "project_bits": 0,
        "wars_won": 0,
        "wars_lost": 0,
        "alliance_seniority_days": 0,
        "alliance_id": alliance_id,
        "alliance_position_id": Value::Null,
    })
}

pub fn city(id: i64, nation_id: i64) -> Value {
    json!({
        "id": id, "name": "Testville", "date": "2023-07-15",
        "infrastructure": 100.0, "land": 500.0, "nuke_date": Value::Null,
        "oil_power": 0, "wind_power": 0, "coal_power": 0, "nuclear_power": 0,
        "coal_mine": 0, "oil_well": 0, "uranium_mine": 0, "bauxite_mine": 0,
        "lead_mine": 0, "iron_mine": 0, "farm": 0,
        "oil_refinery": 0, "aluminum_refinery": 0, "steel_mill": 0, "munitions_factory": 0,
        "police_station": 0, "hospitals": 0, "recycling_center": 0, "subways": 0,
        "supermarkets": 0, "banks": 0, "shopping_mall": 0, "stadiums": 0,
        "barracks": 0, "factory": 0, "hangar": 0, "drydock": 0,
        "nation_id": nation_id,
    })
}

pub fn account(id: i64, discord_id: i64) -> Value {
    json!({
        "id": id,
        "discord_id": discord_id,
        "last_active": "2024-01-01T00:00:00Z",
    })
}

pub fn metadata(after_millis: i64, after_nanos: i64, max_millis: i64, max_nanos: i64) -> Value {
    json!({
        "after": { "millis": after_millis, "nanos": after_nanos },
        "max": { "millis": max_millis, "nanos": max_nanos },
        "crc32": 0,
    })
}
