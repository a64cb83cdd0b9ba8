//! Battle resolution between an arriving force and a garrison.
//!
//! ## Combat flow
//!
//! 1. Power: `attack = sum(count * attack coefficient)`, scaled down to
//!    [`CombatRules::scout_power_pct`] percent for scouting forces;
//!    `defense = sum(count * defense coefficient)`.
//! 2. Outcome: victory if attack > defense, defeat if attack < defense,
//!    draw if they are exactly equal.
//! 3. Casualties: each side loses the fraction `opposing power / own power`
//!    of every troop type, clamped to `[0, 1]` and rounded down per type.
//!    A side with zero power facing a side with positive power is wiped
//!    out; two powerless sides lose nothing.
//!
//! Powers are integers, so equality is exact and results do not depend on
//! the order troop entries were listed in.

use marchland_types::{BattleOutcome, MovementKind, TroopCounts};

use crate::catalog::{CombatRules, TroopCatalog, TroopStats};
use crate::error::RulesError;

/// Percentage denominator for power scaling.
const FULL_POWER_PCT: u64 = 100;

/// Everything a battle decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleResult {
    /// Outcome from the attacker's point of view.
    pub outcome: BattleOutcome,
    /// Attacking power after scout scaling.
    pub attacker_power: u64,
    /// Defending power.
    pub defender_power: u64,
    /// Attacker losses per troop type.
    pub attacker_casualties: TroopCounts,
    /// Defender losses per troop type.
    pub defender_casualties: TroopCounts,
    /// Attacker units left standing.
    pub attacker_survivors: TroopCounts,
    /// Defender units left standing.
    pub defender_survivors: TroopCounts,
}

/// Which coefficient a force fights with.
#[derive(Debug, Clone, Copy)]
enum Stance {
    Attack,
    Defense,
}

/// Sum `count * coefficient` over a force.
///
/// # Errors
///
/// Returns [`RulesError::UnknownTroopType`] for uncatalogued troops and
/// [`RulesError::Overflow`] if the sum leaves `u64`.
fn force_power(force: &TroopCounts, catalog: &TroopCatalog, stance: Stance) -> Result<u64, RulesError> {
    force.iter().try_fold(0_u64, |acc, (troop_type, count)| {
        let stats: &TroopStats = catalog.stats(troop_type)?;
        let coefficient = match stance {
            Stance::Attack => stats.attack,
            Stance::Defense => stats.defense,
        };
        u64::from(count)
            .checked_mul(u64::from(coefficient))
            .and_then(|p| acc.checked_add(p))
            .ok_or(RulesError::Overflow { what: "force power" })
    })
}

/// Attack power of a force, scaled for scouting movements.
///
/// # Errors
///
/// See [`force_power`].
pub fn attack_power(
    kind: MovementKind,
    force: &TroopCounts,
    rules: &CombatRules,
) -> Result<u64, RulesError> {
    let raw = force_power(force, &rules.troops, Stance::Attack)?;
    if kind != MovementKind::Scout {
        return Ok(raw);
    }
    raw.checked_mul(u64::from(rules.scout_power_pct))
        .and_then(|p| p.checked_div(FULL_POWER_PCT))
        .ok_or(RulesError::Overflow { what: "scout power" })
}

/// Defense power of a garrison.
///
/// # Errors
///
/// See [`force_power`].
pub fn defense_power(force: &TroopCounts, rules: &CombatRules) -> Result<u64, RulesError> {
    force_power(force, &rules.troops, Stance::Defense)
}

/// Compare powers.
pub const fn decide_outcome(attacker_power: u64, defender_power: u64) -> BattleOutcome {
    if attacker_power > defender_power {
        BattleOutcome::Victory
    } else if attacker_power < defender_power {
        BattleOutcome::Defeat
    } else {
        BattleOutcome::Draw
    }
}

/// Losses of a force with power `own` facing power `opposing`.
///
/// Every troop type loses `floor(count * min(opposing, own) / own)` units.
fn casualties(force: &TroopCounts, own: u64, opposing: u64) -> TroopCounts {
    if opposing == 0 {
        return TroopCounts::new();
    }
    if own == 0 {
        return force.clone();
    }
    let numerator = u128::from(opposing.min(own));
    let denominator = u128::from(own);
    force
        .iter()
        .map(|(troop_type, count)| {
            let lost = u128::from(count)
                .saturating_mul(numerator)
                .checked_div(denominator)
                .unwrap_or(0);
            // lost <= count because numerator <= denominator.
            let lost = u32::try_from(lost).unwrap_or(count);
            (troop_type.clone(), lost)
        })
        .collect()
}

/// Resolve a battle between an arriving force and the destination garrison.
///
/// # Errors
///
/// Returns [`RulesError::UnknownTroopType`] if either force contains a troop
/// type missing from the catalog, or [`RulesError::Overflow`] for absurd
/// force sizes.
pub fn resolve_battle(
    kind: MovementKind,
    attacker: &TroopCounts,
    defender: &TroopCounts,
    rules: &CombatRules,
) -> Result<BattleResult, RulesError> {
    let attacker_power = attack_power(kind, attacker, rules)?;
    let defender_power = defense_power(defender, rules)?;
    let outcome = decide_outcome(attacker_power, defender_power);

    let attacker_casualties = casualties(attacker, attacker_power, defender_power);
    let defender_casualties = casualties(defender, defender_power, attacker_power);

    Ok(BattleResult {
        outcome,
        attacker_power,
        defender_power,
        attacker_survivors: attacker.minus(&attacker_casualties),
        defender_survivors: defender.minus(&defender_casualties),
        attacker_casualties,
        defender_casualties,
    })
}
