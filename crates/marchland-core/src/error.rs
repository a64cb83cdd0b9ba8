//! Error types for the simulation core.
//!
//! - [`ValidationError`] -- a player request was refused; nothing changed.
//! - [`StoreError`] -- the world store failed or a record is missing.
//! - [`MovementError`] -- anything the movement lifecycle can raise.
//! - [`WorldError`] -- anything the economy and inbox operations can raise.

use marchland_rules::RulesError;
use marchland_types::{
    BuildingType, MovementId, MovementState, PlayerId, ReportId, Resource, TroopType, VillageId,
};
use rust_decimal::Decimal;

/// A request rejected before any state was touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The requested force has no units.
    #[error("invalid composition: total troop quantity is zero")]
    InvalidComposition,

    /// More units were requested than the village holds.
    #[error("insufficient forces: requested {requested} {troop_type}, only {available} available")]
    InsufficientForces {
        /// The troop type that is short.
        troop_type: TroopType,
        /// Quantity requested.
        requested: u32,
        /// Quantity in the garrison.
        available: u32,
    },

    /// No village with this identity exists.
    #[error("unknown village: {village_id}")]
    UnknownVillage {
        /// The missing village.
        village_id: VillageId,
    },

    /// No movement with this identity exists.
    #[error("unknown movement: {movement_id}")]
    UnknownMovement {
        /// The missing movement.
        movement_id: MovementId,
    },

    /// No report with this identity exists in the player's inbox.
    #[error("unknown report {report_id} for player {player_id}")]
    UnknownReport {
        /// The missing report.
        report_id: ReportId,
        /// The player who asked.
        player_id: PlayerId,
    },

    /// The troop type is not in the catalog.
    #[error("unknown troop type: {troop_type}")]
    UnknownTroopType {
        /// The unrecognised type.
        troop_type: TroopType,
    },

    /// Origin and destination are the same village.
    #[error("village {village_id} cannot target itself")]
    SameVillage {
        /// The village.
        village_id: VillageId,
    },

    /// The acting player does not own the village concerned.
    #[error("player {player_id} does not own village {village_id}")]
    NotOwner {
        /// Acting player.
        player_id: PlayerId,
        /// Village concerned.
        village_id: VillageId,
    },

    /// The movement is past the point where it can be recalled.
    #[error("movement {movement_id} cannot be canceled in state {state:?}")]
    NotCancelable {
        /// The movement.
        movement_id: MovementId,
        /// Its state when the request was made.
        state: MovementState,
    },

    /// The building is already at the configured maximum level.
    #[error("{building:?} is already at maximum level {max_level}")]
    MaxLevel {
        /// Building type.
        building: BuildingType,
        /// Configured ceiling.
        max_level: u8,
    },

    /// A new village's stockpile holds more than its storage allows.
    #[error("{resource:?} stockpile {quantity} exceeds capacity {capacity}")]
    OverCapacity {
        /// The overfull resource.
        resource: Resource,
        /// Quantity supplied.
        quantity: Decimal,
        /// Capacity for the village's buildings.
        capacity: Decimal,
    },

    /// Another village already occupies these coordinates.
    #[error("coordinates ({x}, {y}) are already taken")]
    CoordinatesTaken {
        /// Column.
        x: i32,
        /// Row.
        y: i32,
    },
}

/// Failures of the world store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The village does not exist.
    #[error("village not found: {village_id}")]
    VillageNotFound {
        /// The missing village.
        village_id: VillageId,
    },

    /// The movement does not exist.
    #[error("movement not found: {movement_id}")]
    MovementNotFound {
        /// The missing movement.
        movement_id: MovementId,
    },

    /// Insert violated the unique-coordinates constraint.
    #[error("coordinates ({x}, {y}) already occupied")]
    CoordinatesTaken {
        /// Column.
        x: i32,
        /// Row.
        y: i32,
    },

    /// A conditional update found the record in a different state.
    #[error("movement {movement_id} is no longer {expected:?}")]
    StateChanged {
        /// The movement.
        movement_id: MovementId,
        /// State the update required.
        expected: MovementState,
    },

    /// The storage backend failed.
    #[error("persistence failure: {message}")]
    Backend {
        /// Description from the backend.
        message: String,
    },

    /// A stored record could not be decoded.
    #[error("corrupt record: {message}")]
    Corrupt {
        /// What was wrong with it.
        message: String,
    },
}

/// Errors from the movement lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum MovementError {
    /// The request was invalid.
    #[error("validation failed: {source}")]
    Validation {
        /// The rejection.
        #[from]
        source: ValidationError,
    },

    /// Another step won the race for this movement.
    #[error("concurrency conflict on movement {movement_id}")]
    Conflict {
        /// The contested movement.
        movement_id: MovementId,
    },

    /// The movement's arrival (or return) instant has not been reached.
    #[error("movement {movement_id} is not due yet")]
    NotDue {
        /// The movement.
        movement_id: MovementId,
    },

    /// Resolution failed after the movement was claimed. The movement is
    /// left in `Resolving`.
    #[error("resolution of movement {movement_id} failed: {reason}")]
    Resolution {
        /// The stuck movement.
        movement_id: MovementId,
        /// What went wrong.
        reason: String,
    },

    /// A rule computation failed.
    #[error("rules error: {source}")]
    Rules {
        /// The underlying error.
        #[from]
        source: RulesError,
    },

    /// The store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying error.
        #[from]
        source: StoreError,
    },
}

/// Errors from village economy and report inbox operations.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The request was invalid.
    #[error("validation failed: {source}")]
    Validation {
        /// The rejection.
        #[from]
        source: ValidationError,
    },

    /// A rule computation failed.
    #[error("rules error: {source}")]
    Rules {
        /// The underlying error.
        #[from]
        source: RulesError,
    },

    /// The store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying error.
        #[from]
        source: StoreError,
    },
}

impl From<RulesError> for ValidationError {
    /// Map catalog lookups that reject player input onto validation errors.
    fn from(err: RulesError) -> Self {
        match err {
            RulesError::UnknownTroopType { troop_type } | RulesError::ZeroSpeed { troop_type } => {
                Self::UnknownTroopType { troop_type }
            }
            RulesError::EmptyForce | RulesError::Overflow { .. } => Self::InvalidComposition,
        }
    }
}
