//! Shared type definitions for the Marchland simulation.
//!
//! This crate is the single source of truth for the records that flow
//! between the rules, the simulation core, and the storage backends.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all entity identifiers
//! - [`enums`] -- Closed variant sets (resources, buildings, movement kinds
//!   and states, battle outcomes)
//! - [`structs`] -- Core records (villages, stockpiles, movements, battle
//!   reports, notifications)

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{BattleOutcome, BuildingType, MovementKind, MovementState, ReportRole, Resource};
pub use ids::{MovementId, PlayerId, ReportId, VillageId};
pub use structs::{
    BattleReport, IncomingMovementNotice, Movement, MovementResolution, Notification,
    ReportNotice, ResourceAmounts, Shortfall, Stockpile, TroopCounts, TroopType, Village,
};
