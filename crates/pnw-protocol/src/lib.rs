//! pnw-protocol: wire-format types shared by every component that speaks to
//! upstream — entity records, Pusher protocol frames, and the generic
//! field-diffing helper the Entity Store builds its update semantics on.

pub mod diff;
pub mod entities;
pub mod enums;
pub mod fields;
pub mod wire;

pub use diff::{diff_fields, FieldChange};
pub use enums::{Color, Continent, DomesticPolicy, EntityKind, EventKind, WarPolicy, WarType};
pub use wire::{MetadataEvent, MetadataTime, PusherEvent, SnapshotResponse, SubscribeResponse};
