//! GraphQL field-selection lists for each entity kind, spelled in upstream's
//! own field names (matching the `#[serde(rename(deserialize = "..."))]`
//! bridges in `entities.rs`) so a projection built from one of these
//! constants deserializes straight into the corresponding wire struct.

pub const ALLIANCE: &str = "id name acronym score color date accept_members flag rank";

pub const ALLIANCE_POSITION: &str =
    "id name date date_modified position_level permissions creator_id last_editor_id alliance_id";

pub const NATION: &str = "id nation_name leader_name continent war_policy war_policy_turns \
    domestic_policy domestic_policy_turns num_cities color score update_tz population flag \
    vacation_mode_turns beige_turns espionage_available last_active date soldiers tanks \
    aircraft ships missiles nukes spies discord_id turns_since_last_city \
    turns_since_last_project projects project_bits wars_won wars_lost \
    alliance_seniority_days alliance_id alliance_position_id";

pub const CITY: &str = "id name date infrastructure land nuke_date oil_power wind_power \
    coal_power nuclear_power coal_mine oil_well uranium_mine bauxite_mine lead_mine iron_mine \
    farm oil_refinery aluminum_refinery steel_mill munitions_factory police_station hospitals \
    recycling_center subways supermarkets banks shopping_mall stadiums barracks factory hangar \
    drydock nation_id";

pub const ACCOUNT: &str = "id discord_id last_active";

pub const WAR: &str = "id date end_date reason war_type turns_left att_points def_points \
    att_peace def_peace att_resistance def_resistance att_fortify def_fortify att_gas_used \
    def_gas_used att_mun_used def_mun_used att_alum_used def_alum_used att_steel_used \
    def_steel_used att_infra_destroyed def_infra_destroyed att_money_looted def_money_looted \
    att_soldiers_lost def_soldiers_lost att_tanks_lost def_tanks_lost att_aircraft_lost \
    def_aircraft_lost att_ships_lost def_ships_lost att_missiles_used def_missiles_used \
    att_nukes_used def_nukes_used att_infra_destroyed_value def_infra_destroyed_value att_id \
    def_id ground_control air_superiority naval_blockade winner_id";
