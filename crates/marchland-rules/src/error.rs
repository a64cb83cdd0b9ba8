//! Error type for the rules crate.

use marchland_types::TroopType;

/// Errors raised by the pure rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RulesError {
    /// A force references a troop type missing from the catalog.
    #[error("unknown troop type: {troop_type}")]
    UnknownTroopType {
        /// The unrecognised troop type.
        troop_type: TroopType,
    },

    /// A travel computation was asked for a force with no units.
    #[error("force has no units")]
    EmptyForce,

    /// A troop type has speed zero and can never arrive.
    #[error("troop type {troop_type} has zero speed")]
    ZeroSpeed {
        /// The immobile troop type.
        troop_type: TroopType,
    },

    /// A sum or product left its integer range.
    #[error("arithmetic overflow computing {what}")]
    Overflow {
        /// Which quantity overflowed.
        what: &'static str,
    },
}
