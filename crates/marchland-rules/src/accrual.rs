//! Time-proportional resource production.
//!
//! A production building at level `n` yields `base * factor^n` units per
//! hour of the one resource it produces. Storage buildings cap each
//! resource at `base * factor^n` (warehouse for wood, clay and iron;
//! granary for crop). Accrual credits `rate * elapsed` up to capacity and
//! moves the stockpile's stamp forward by the credited time.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use marchland_types::{BuildingType, ResourceAmounts, Stockpile, Village};
use rust_decimal::Decimal;

use crate::catalog::{EconomyRules, ProductionRate, StorageRate};
use crate::error::RulesError;

/// Milliseconds per hour.
const MILLIS_PER_HOUR: i64 = 3_600_000;

/// `base * factor^level` with checked multiplication.
fn scaled(base: Decimal, factor: Decimal, level: u8, what: &'static str) -> Result<Decimal, RulesError> {
    (0..level).try_fold(base, |acc, _| {
        acc.checked_mul(factor).ok_or(RulesError::Overflow { what })
    })
}

/// Hourly output of a production building at `level`.
///
/// # Errors
///
/// Returns [`RulesError::Overflow`] if the rate leaves the decimal range.
pub fn production_rate(rate: &ProductionRate, level: u8) -> Result<Decimal, RulesError> {
    scaled(rate.base, rate.factor, level, "production rate")
}

/// Capacity granted by a storage building. `None` means the village has no
/// such building and stores the base amount.
///
/// # Errors
///
/// Returns [`RulesError::Overflow`] if the capacity leaves the decimal range.
pub fn storage_capacity(level: Option<u8>, rate: &StorageRate) -> Result<Decimal, RulesError> {
    scaled(rate.base, rate.factor, level.unwrap_or(0), "storage capacity")
}

/// Hourly production of every resource from a village's buildings.
///
/// Buildings without an entry in the production table produce nothing.
///
/// # Errors
///
/// Returns [`RulesError::Overflow`] if a rate leaves the decimal range.
pub fn village_production(
    buildings: &BTreeMap<BuildingType, u8>,
    rules: &EconomyRules,
) -> Result<ResourceAmounts, RulesError> {
    let mut hourly = ResourceAmounts::ZERO;
    for (&building, &level) in buildings {
        let (Some(resource), Some(rate)) = (building.produces(), rules.production.get(&building)) else {
            continue;
        };
        let output = production_rate(rate, level)?;
        let sum = hourly
            .get(resource)
            .checked_add(output)
            .ok_or(RulesError::Overflow { what: "village production" })?;
        hourly.set(resource, sum);
    }
    Ok(hourly)
}

/// Storage capacity of every resource.
///
/// # Errors
///
/// Returns [`RulesError::Overflow`] if a capacity leaves the decimal range.
pub fn village_capacity(
    buildings: &BTreeMap<BuildingType, u8>,
    rules: &EconomyRules,
) -> Result<ResourceAmounts, RulesError> {
    let warehouse = storage_capacity(buildings.get(&BuildingType::Warehouse).copied(), &rules.storage)?;
    let granary = storage_capacity(buildings.get(&BuildingType::Granary).copied(), &rules.storage)?;
    Ok(ResourceAmounts::from_fn(|resource| {
        if resource.storage_building() == BuildingType::Granary {
            granary
        } else {
            warehouse
        }
    }))
}

/// Accrue a stockpile up to `now`.
///
/// Each resource becomes `min(capacity, current + hourly * elapsed_hours)`.
/// A quantity above capacity is cut down to it. Only whole elapsed
/// milliseconds are credited and the stamp moves forward by exactly that
/// much, so the sub-millisecond remainder is carried to the next call.
/// When less than a millisecond has passed nothing is credited and the
/// stockpile is returned unchanged, so evaluating twice at the same instant
/// is a no-op.
///
/// # Errors
///
/// Returns [`RulesError::Overflow`] if the credited amount leaves the
/// decimal range.
pub fn accrue(
    stockpile: &Stockpile,
    hourly: &ResourceAmounts,
    capacity: &ResourceAmounts,
    now: DateTime<Utc>,
) -> Result<Stockpile, RulesError> {
    let elapsed_ms = now.signed_duration_since(stockpile.last_updated).num_milliseconds();
    if elapsed_ms <= 0 {
        return Ok(*stockpile);
    }
    let elapsed = Decimal::from(elapsed_ms);
    let per_hour = Decimal::from(MILLIS_PER_HOUR);

    let mut amounts = stockpile.amounts;
    for (resource, rate) in hourly.iter() {
        let gained = rate
            .checked_mul(elapsed)
            .and_then(|g| g.checked_div(per_hour))
            .ok_or(RulesError::Overflow { what: "accrued amount" })?;
        let cap = capacity.get(resource);
        let next = stockpile.amounts.get(resource).checked_add(gained).unwrap_or(cap).min(cap);
        amounts.set(resource, next);
    }
    let stamp = TimeDelta::try_milliseconds(elapsed_ms)
        .and_then(|credited| stockpile.last_updated.checked_add_signed(credited))
        .unwrap_or(now);
    Ok(Stockpile::new(amounts, stamp))
}

/// Accrue a village's stockpile in place up to `now`.
///
/// # Errors
///
/// See [`accrue`].
pub fn accrue_village(village: &mut Village, rules: &EconomyRules, now: DateTime<Utc>) -> Result<(), RulesError> {
    let hourly = village_production(&village.buildings, rules)?;
    let capacity = village_capacity(&village.buildings, rules)?;
    village.stockpile = accrue(&village.stockpile, &hourly, &capacity, now)?;
    Ok(())
}
