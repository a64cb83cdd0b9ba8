//! Travel time between villages.
//!
//! A force moves at the speed of its slowest unit. Speeds are map fields
//! per hour, and the duration is rounded up to the next millisecond so that
//! arrival is always strictly after departure.

use chrono::TimeDelta;
use marchland_types::TroopCounts;

use crate::catalog::TroopCatalog;
use crate::error::RulesError;

/// Milliseconds per hour, as a float.
const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Straight-line distance between two map coordinates.
#[allow(clippy::cast_precision_loss)]
pub fn distance(from: (i32, i32), to: (i32, i32)) -> f64 {
    let dx = i128::from(to.0).abs_diff(i128::from(from.0));
    let dy = i128::from(to.1).abs_diff(i128::from(from.1));
    // Each delta is below 2^33, so the squares and their sum fit in u128.
    let squared = dx
        .saturating_mul(dx)
        .saturating_add(dy.saturating_mul(dy));
    (squared as f64).sqrt()
}

/// Speed of the slowest troop type in a force.
///
/// # Errors
///
/// Returns [`RulesError::EmptyForce`] for a force with no units,
/// [`RulesError::UnknownTroopType`] for an uncatalogued type and
/// [`RulesError::ZeroSpeed`] if a type cannot move.
pub fn slowest_speed(force: &TroopCounts, catalog: &TroopCatalog) -> Result<u32, RulesError> {
    let mut slowest: Option<u32> = None;
    for troop_type in force.types() {
        let speed = catalog.stats(troop_type)?.speed;
        if speed == 0 {
            return Err(RulesError::ZeroSpeed {
                troop_type: troop_type.clone(),
            });
        }
        slowest = Some(slowest.map_or(speed, |s| s.min(speed)));
    }
    slowest.ok_or(RulesError::EmptyForce)
}

/// Time needed to cover `distance` at `speed` fields per hour.
///
/// The result is at least one millisecond.
///
/// # Errors
///
/// Returns [`RulesError::Overflow`] if the duration does not fit a
/// [`TimeDelta`].
#[allow(clippy::cast_possible_truncation)]
pub fn travel_duration(distance: f64, speed: u32) -> Result<TimeDelta, RulesError> {
    if speed == 0 || !distance.is_finite() {
        return Err(RulesError::Overflow { what: "travel duration" });
    }
    let millis = (distance.max(0.0) * MILLIS_PER_HOUR / f64::from(speed)).ceil().max(1.0);
    // i64::MAX as f64 rounds up, so compare against a bound that is exact.
    if millis >= 9.0e18 {
        return Err(RulesError::Overflow { what: "travel duration" });
    }
    TimeDelta::try_milliseconds(millis as i64).ok_or(RulesError::Overflow { what: "travel duration" })
}

/// Travel time of `force` between two coordinates.
///
/// # Errors
///
/// See [`slowest_speed`] and [`travel_duration`].
pub fn force_travel_time(
    force: &TroopCounts,
    catalog: &TroopCatalog,
    from: (i32, i32),
    to: (i32, i32),
) -> Result<TimeDelta, RulesError> {
    let speed = slowest_speed(force, catalog)?;
    travel_duration(distance(from, to), speed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::catalog::TroopStats;
    use marchland_types::TroopType;

    fn catalog() -> TroopCatalog {
        TroopCatalog::from_entries([
            (
                TroopType::new("infantry"),
                TroopStats {
                    attack: 2,
                    defense: 1,
                    speed: 6,
                },
            ),
            (
                TroopType::new("cavalry"),
                TroopStats {
                    attack: 5,
                    defense: 2,
                    speed: 14,
                },
            ),
            (
                TroopType::new("ram"),
                TroopStats {
                    attack: 1,
                    defense: 1,
                    speed: 0,
                },
            ),
        ])
    }

    fn force(entries: &[(&str, u32)]) -> TroopCounts {
        entries.iter().map(|&(t, n)| (TroopType::new(t), n)).collect()
    }

    #[test]
    fn three_four_five_triangle() {
        assert_eq!(distance((0, 0), (30, 40)), 50.0);
        assert_eq!(distance((30, 40), (0, 0)), 50.0);
        assert_eq!(distance((-3, 7), (-3, 7)), 0.0);
    }

    #[test]
    fn fifty_fields_at_speed_six() {
        let infantry = force(&[("infantry", 100)]);
        let duration = force_travel_time(&infantry, &catalog(), (0, 0), (30, 40)).unwrap();
        assert_eq!(duration.num_milliseconds(), 30_000_000);
    }

    #[test]
    fn slowest_unit_sets_the_pace() {
        let mixed = force(&[("cavalry", 10), ("infantry", 1)]);
        assert_eq!(slowest_speed(&mixed, &catalog()).unwrap(), 6);
    }

    #[test]
    fn duration_is_monotonic() {
        let near = travel_duration(10.0, 6).unwrap();
        let far = travel_duration(20.0, 6).unwrap();
        let fast = travel_duration(20.0, 14).unwrap();
        assert!(near <= far);
        assert!(fast <= far);
    }

    #[test]
    fn duration_is_never_zero() {
        assert_eq!(travel_duration(0.0, 6).unwrap().num_milliseconds(), 1);
    }

    #[test]
    fn empty_and_immobile_forces_are_rejected() {
        assert_eq!(slowest_speed(&TroopCounts::new(), &catalog()), Err(RulesError::EmptyForce));
        assert!(matches!(
            slowest_speed(&force(&[("ram", 1)]), &catalog()),
            Err(RulesError::ZeroSpeed { .. })
        ));
    }
}
