//! Static rule tables.
//!
//! These structs deserialize straight out of the `combat` and `economy`
//! sections of `marchland-config.yaml`. Defaults match the shipped
//! configuration.

use std::collections::BTreeMap;

use marchland_types::{BuildingType, TroopType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::RulesError;

// ---------------------------------------------------------------------------
// Troops
// ---------------------------------------------------------------------------

/// Combat coefficients and speed of one troop type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroopStats {
    /// Attack contributed per unit.
    pub attack: u32,
    /// Defense contributed per unit.
    pub defense: u32,
    /// Map fields travelled per hour.
    pub speed: u32,
}

/// Every troop type the world knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TroopCatalog(BTreeMap<TroopType, TroopStats>);

impl TroopCatalog {
    /// Build a catalog from `(type, stats)` pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (TroopType, TroopStats)>) -> Self {
        Self(entries.into_iter().collect())
    }

    /// Stats of a troop type.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::UnknownTroopType`] if the type is not listed.
    pub fn stats(&self, troop_type: &TroopType) -> Result<&TroopStats, RulesError> {
        self.0.get(troop_type).ok_or_else(|| RulesError::UnknownTroopType {
            troop_type: troop_type.clone(),
        })
    }

    /// Whether the catalog lists a troop type.
    pub fn contains(&self, troop_type: &TroopType) -> bool {
        self.0.contains_key(troop_type)
    }

    /// Iterate over all entries in type order.
    pub fn iter(&self) -> impl Iterator<Item = (&TroopType, &TroopStats)> {
        self.0.iter()
    }

    /// Number of troop types.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no troop type is defined.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for TroopCatalog {
    fn default() -> Self {
        Self::from_entries([
            (
                TroopType::new("infantry"),
                TroopStats {
                    attack: 40,
                    defense: 35,
                    speed: 6,
                },
            ),
            (
                TroopType::new("spearman"),
                TroopStats {
                    attack: 10,
                    defense: 45,
                    speed: 7,
                },
            ),
            (
                TroopType::new("cavalry"),
                TroopStats {
                    attack: 120,
                    defense: 65,
                    speed: 14,
                },
            ),
            (
                TroopType::new("scout"),
                TroopStats {
                    attack: 10,
                    defense: 20,
                    speed: 16,
                },
            ),
        ])
    }
}

/// Combat section of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatRules {
    /// Troop coefficients and speeds.
    #[serde(default)]
    pub troops: TroopCatalog,

    /// Share of a defeated stockpile carried off (0 to 1).
    #[serde(default = "default_loot_fraction")]
    pub loot_fraction: Decimal,

    /// Percentage of normal attack power a scouting force fights with.
    #[serde(default = "default_scout_power_pct")]
    pub scout_power_pct: u32,
}

impl Default for CombatRules {
    fn default() -> Self {
        Self {
            troops: TroopCatalog::default(),
            loot_fraction: default_loot_fraction(),
            scout_power_pct: default_scout_power_pct(),
        }
    }
}

fn default_loot_fraction() -> Decimal {
    Decimal::new(3, 1)
}

const fn default_scout_power_pct() -> u32 {
    50
}

// ---------------------------------------------------------------------------
// Economy
// ---------------------------------------------------------------------------

/// Hourly output of a production building: `base * factor^level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRate {
    /// Units per hour at level 0.
    pub base: Decimal,
    /// Growth per level. Must be at least 1 so output never drops with level.
    pub factor: Decimal,
}

/// Capacity of a storage building: `base * factor^level`. A village
/// without the building stores `base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRate {
    /// Capacity at level 0 (and with no building).
    pub base: Decimal,
    /// Growth per level.
    pub factor: Decimal,
}

/// Economy section of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomyRules {
    /// Production rate per production building type.
    #[serde(default = "default_production")]
    pub production: BTreeMap<BuildingType, ProductionRate>,

    /// Warehouse/granary capacity by level.
    #[serde(default = "default_storage")]
    pub storage: StorageRate,

    /// Highest level any building can reach.
    #[serde(default = "default_max_building_level")]
    pub max_building_level: u8,
}

impl Default for EconomyRules {
    fn default() -> Self {
        Self {
            production: default_production(),
            storage: default_storage(),
            max_building_level: default_max_building_level(),
        }
    }
}

fn default_production() -> BTreeMap<BuildingType, ProductionRate> {
    let rate = ProductionRate {
        base: Decimal::new(5, 0),
        factor: Decimal::new(15, 1),
    };
    [
        BuildingType::Woodcutter,
        BuildingType::ClayPit,
        BuildingType::IronMine,
        BuildingType::CropFarm,
    ]
    .into_iter()
    .map(|b| (b, rate))
    .collect()
}

fn default_storage() -> StorageRate {
    StorageRate {
        base: Decimal::new(1000, 0),
        factor: Decimal::new(13, 1),
    }
}

const fn default_max_building_level() -> u8 {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_troop_type_is_an_error() {
        let catalog = TroopCatalog::default();
        let err = catalog.stats(&TroopType::new("dragon"));
        assert_eq!(
            err,
            Err(RulesError::UnknownTroopType {
                troop_type: TroopType::new("dragon"),
            })
        );
        assert!(catalog.contains(&TroopType::new("infantry")));
    }

    #[test]
    fn combat_rules_parse_from_yaml() {
        let yaml = r"
troops:
  infantry: { attack: 2, defense: 1, speed: 6 }
loot_fraction: 0.25
";
        let rules: Result<CombatRules, _> = serde_yml::from_str(yaml);
        let rules = rules.ok();
        let rules = rules.as_ref();
        assert_eq!(rules.map(|r| r.troops.len()), Some(1));
        assert_eq!(rules.map(|r| r.loot_fraction), Some(Decimal::new(25, 2)));
        assert_eq!(rules.map(|r| r.scout_power_pct), Some(50));
    }

    #[test]
    fn default_economy_covers_every_producer() {
        let economy = EconomyRules::default();
        assert_eq!(economy.production.len(), 4);
        assert!(economy.production.keys().all(|b| b.produces().is_some()));
    }
}
