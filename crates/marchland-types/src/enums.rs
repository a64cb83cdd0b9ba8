//! Enumeration types for the Marchland simulation.
//!
//! Every variant set here is closed: outcomes, movement kinds and movement
//! states are never carried around as free-form strings. Storage backends
//! map them to and from their `as_str` names.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// One of the four stockpiled resources of a village.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// Lumber from the woodcutter.
    Wood,
    /// Clay from the clay pit.
    Clay,
    /// Iron from the iron mine.
    Iron,
    /// Crop from the crop farm. Stored in the granary.
    Crop,
}

impl Resource {
    /// All resources in canonical order.
    pub const ALL: [Self; 4] = [Self::Wood, Self::Clay, Self::Iron, Self::Crop];

    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wood => "wood",
            Self::Clay => "clay",
            Self::Iron => "iron",
            Self::Crop => "crop",
        }
    }

    /// The storage building whose level sets this resource's capacity.
    pub const fn storage_building(self) -> BuildingType {
        match self {
            Self::Crop => BuildingType::Granary,
            Self::Wood | Self::Clay | Self::Iron => BuildingType::Warehouse,
        }
    }
}

// ---------------------------------------------------------------------------
// Buildings
// ---------------------------------------------------------------------------

/// A type of building a village can hold. A village holds at most one
/// building of each type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingType {
    /// Village centre.
    TownHall,
    /// Produces wood.
    Woodcutter,
    /// Produces clay.
    ClayPit,
    /// Produces iron.
    IronMine,
    /// Produces crop.
    CropFarm,
    /// Stores wood, clay and iron.
    Warehouse,
    /// Stores crop.
    Granary,
    /// Trains infantry.
    Barracks,
    /// Trains cavalry.
    Stable,
    /// Builds siege engines.
    Workshop,
}

impl BuildingType {
    /// The resource this building produces, if it is a production building.
    pub const fn produces(self) -> Option<Resource> {
        match self {
            Self::Woodcutter => Some(Resource::Wood),
            Self::ClayPit => Some(Resource::Clay),
            Self::IronMine => Some(Resource::Iron),
            Self::CropFarm => Some(Resource::Crop),
            Self::TownHall
            | Self::Warehouse
            | Self::Granary
            | Self::Barracks
            | Self::Stable
            | Self::Workshop => None,
        }
    }

    /// Stable `snake_case` name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TownHall => "town_hall",
            Self::Woodcutter => "woodcutter",
            Self::ClayPit => "clay_pit",
            Self::IronMine => "iron_mine",
            Self::CropFarm => "crop_farm",
            Self::Warehouse => "warehouse",
            Self::Granary => "granary",
            Self::Barracks => "barracks",
            Self::Stable => "stable",
            Self::Workshop => "workshop",
        }
    }
}

// ---------------------------------------------------------------------------
// Movements
// ---------------------------------------------------------------------------

/// What a dispatched force intends to do at its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Full attack.
    Attack,
    /// Plundering raid.
    Raid,
    /// Troops sent to stay in the destination's garrison.
    Reinforcement,
    /// Reconnaissance with reduced combat strength.
    Scout,
}

impl MovementKind {
    /// Whether the movement is fought at the destination.
    pub const fn is_hostile(self) -> bool {
        !matches!(self, Self::Reinforcement)
    }

    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Attack => "attack",
            Self::Raid => "raid",
            Self::Reinforcement => "reinforcement",
            Self::Scout => "scout",
        }
    }

    /// Parse a stored name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "attack" => Some(Self::Attack),
            "raid" => Some(Self::Raid),
            "reinforcement" => Some(Self::Reinforcement),
            "scout" => Some(Self::Scout),
            _ => None,
        }
    }
}

/// Lifecycle state of a movement.
///
/// ```text
/// Pending -> Resolving -> Completed -> Returned
///    |
///    +-> Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementState {
    /// In flight, not yet resolved.
    Pending,
    /// Claimed by a resolution step. Only ever seen outside a running
    /// resolution when that resolution failed.
    Resolving,
    /// Resolved at the destination; survivors may be on their way home.
    Completed,
    /// Survivors arrived home. Terminal.
    Returned,
    /// Recalled by its owner before resolution. Terminal.
    Canceled,
}

impl MovementState {
    /// Whether no further transition is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Returned | Self::Canceled)
    }

    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolving => "resolving",
            Self::Completed => "completed",
            Self::Returned => "returned",
            Self::Canceled => "canceled",
        }
    }

    /// Parse a stored name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "pending" => Some(Self::Pending),
            "resolving" => Some(Self::Resolving),
            "completed" => Some(Self::Completed),
            "returned" => Some(Self::Returned),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Battles
// ---------------------------------------------------------------------------

/// Result of a battle, from the attacker's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleOutcome {
    /// Attacker power strictly exceeded defender power.
    Victory,
    /// Defender power strictly exceeded attacker power.
    Defeat,
    /// Both powers were exactly equal.
    Draw,
}

impl BattleOutcome {
    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Victory => "victory",
            Self::Defeat => "defeat",
            Self::Draw => "draw",
        }
    }

    /// Parse a stored name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "victory" => Some(Self::Victory),
            "defeat" => Some(Self::Defeat),
            "draw" => Some(Self::Draw),
            _ => None,
        }
    }
}

/// Which side of a movement a report recipient was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportRole {
    /// Owner of the origin village.
    Attacker,
    /// Owner of the destination village.
    Defender,
}

impl ReportRole {
    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Attacker => "attacker",
            Self::Defender => "defender",
        }
    }

    /// Parse a stored name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "attacker" => Some(Self::Attacker),
            "defender" => Some(Self::Defender),
            _ => None,
        }
    }
}
