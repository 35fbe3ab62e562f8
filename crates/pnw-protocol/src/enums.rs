//! Upstream enumerations shared by every entity kind.
//!
//! These mirror the closed value sets the upstream API uses for `nation`,
//! `alliance`, `city` and `war` fields. Unknown values deserialize to
//! `Other(String)` rather than failing validation — upstream has been known
//! to add new trade-bloc colors and war types without notice, and a hard
//! parse failure here would otherwise sink the whole record (§4.4 data
//! callback: validation failures are logged and dropped, not a parse panic
//! on an enum field deep inside a larger record).

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! open_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            Other(String),
        }

        impl $name {
            fn as_wire(&self) -> &str {
                match self {
                    $(Self::$variant => $wire,)+
                    Self::Other(s) => s,
                }
            }

            fn from_wire(s: &str) -> Self {
                match s {
                    $($wire => Self::$variant,)+
                    other => Self::Other(other.to_owned()),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_wire())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_wire())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Ok(Self::from_wire(&s))
            }
        }
    };
}

open_enum! {
    /// The 16 trade-bloc colors a nation or alliance may hold.
    Color {
        Aqua => "aqua", Black => "black", Blue => "blue", Brown => "brown",
        Green => "green", Lime => "lime", Maroon => "maroon", Olive => "olive",
        Orange => "orange", Pink => "pink", Purple => "purple", Red => "red",
        White => "white", Yellow => "yellow", Beige => "beige", Gray => "gray",
    }
}

open_enum! {
    /// The 7 continents nations may be situated on.
    Continent {
        NorthAmerica => "na", SouthAmerica => "sa", Asia => "as",
        Antarctica => "an", Europe => "eu", Africa => "af", Australia => "au",
    }
}

open_enum! {
    /// The 10 war policies a nation may adopt.
    WarPolicy {
        Attrition => "ATTRITION", Turtle => "TURTLE", Blitzkrieg => "BLITZKRIEG",
        Fortress => "FORTRESS", Moneybags => "MONEYBAGS", Pirate => "PIRATE",
        Tactician => "TACTICIAN", Guardian => "GUARDIAN", Covert => "COVERT",
        Arcane => "ARCANE",
    }
}

open_enum! {
    /// The 6 domestic policies a nation may adopt.
    DomesticPolicy {
        ManifestDestiny => "MANIFEST_DESTINY", OpenMarkets => "OPEN_MARKETS",
        TechnologicalAdvancement => "TECHNOLOGICAL_ADVANCEMENT", Imperialism => "IMPERIALISM",
        Urbanization => "URBANIZATION", RapidExpansion => "RAPID_EXPANSION",
    }
}

open_enum! {
    /// War types. Upstream exposes a small, closed set.
    WarType {
        Ordinary => "ORDINARY", Attrition => "ATTRITION", Raid => "RAID", Covert => "COVERT",
    }
}

/// The five persisted entity kinds plus `war`, used to parametrize the
/// Subscription, Subscription Manager and Reconciler over upstream model
/// names. Wire-formatted in `lower_snake_case` to match the `{kind}/{event}`
/// REST path segments and the `{KIND}_{EVENT}` channel event names (upper-cased
/// separately by the caller, see `pnw_protocol::wire::event_names`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Nation,
    Alliance,
    AlliancePosition,
    City,
    Account,
    War,
}

impl EntityKind {
    /// All kinds the Reconciler full-syncs on boot and on each periodic sweep.
    pub const RECONCILED: [EntityKind; 6] = [
        EntityKind::Alliance,
        EntityKind::AlliancePosition,
        EntityKind::Nation,
        EntityKind::City,
        EntityKind::Account,
        EntityKind::War,
    ];

    /// The upstream path segment for this kind, e.g. `alliance_position`.
    pub fn as_path_segment(self) -> &'static str {
        match self {
            EntityKind::Nation => "nation",
            EntityKind::Alliance => "alliance",
            EntityKind::AlliancePosition => "alliance_position",
            EntityKind::City => "city",
            EntityKind::Account => "account",
            EntityKind::War => "war",
        }
    }
}

/// The three live-feed event kinds a Subscription can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl EventKind {
    pub fn as_path_segment(self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_round_trips() {
        let c: Color = serde_json::from_str("\"beige\"").unwrap();
        assert_eq!(c, Color::Beige);
        assert_eq!(serde_json::to_string(&Color::Beige).unwrap(), "\"beige\"");
    }

    #[test]
    fn unknown_color_falls_back_to_other() {
        let c: Color = serde_json::from_str("\"ultraviolet\"").unwrap();
        assert_eq!(c, Color::Other("ultraviolet".to_owned()));
    }

    #[test]
    fn war_policy_recognizes_all_ten() {
        let wire = [
            "ATTRITION", "TURTLE", "BLITZKRIEG", "FORTRESS", "MONEYBAGS", "PIRATE",
            "TACTICIAN", "GUARDIAN", "COVERT", "ARCANE",
        ];
        for w in wire {
            let parsed: WarPolicy = serde_json::from_str(&format!("\"{w}\"")).unwrap();
            assert!(!matches!(parsed, WarPolicy::Other(_)));
        }
    }

    #[test]
    fn entity_kind_path_segments() {
        assert_eq!(EntityKind::AlliancePosition.as_path_segment(), "alliance_position");
        assert_eq!(EntityKind::War.as_path_segment(), "war");
    }
}
