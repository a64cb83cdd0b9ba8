//! Pure game rules for the Marchland simulation.
//!
//! Nothing in this crate performs I/O or reads the clock: every function
//! takes the instants and tables it needs as arguments, so identical inputs
//! always give identical outputs. The simulation core calls into these
//! rules from inside its atomic store updates.
//!
//! # Modules
//!
//! - [`catalog`] -- Static tables (troop stats, production and storage
//!   rates) loaded from configuration
//! - [`combat`] -- Battle resolution: power, outcome, casualties
//! - [`loot`] -- Plunder taken from a defeated stockpile
//! - [`accrual`] -- Time-proportional resource production
//! - [`travel`] -- Distance and travel time between villages
//! - [`error`] -- Shared error type

pub mod accrual;
pub mod catalog;
pub mod combat;
pub mod error;
pub mod loot;
pub mod travel;

pub use catalog::{CombatRules, EconomyRules, ProductionRate, StorageRate, TroopCatalog, TroopStats};
pub use combat::{BattleResult, resolve_battle};
pub use error::RulesError;
