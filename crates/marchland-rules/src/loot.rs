//! Plunder taken from a defeated village.
//!
//! For every resource the attacker takes
//! `min(floor(quantity * fraction), floor(quantity), headroom)` whole
//! units. The defender's quantity can therefore never go negative, and the
//! attacker never takes more than the defender held.

use marchland_types::ResourceAmounts;
use rust_decimal::Decimal;

/// Compute the loot carried off from `stockpile`.
///
/// `fraction` is clamped to `[0, 1]`. `headroom`, when given, caps each
/// resource at the free space left in the attacker's storage. Negative or
/// fractional inputs are floored to whole, non-negative units.
pub fn calculate_loot(
    stockpile: &ResourceAmounts,
    fraction: Decimal,
    headroom: Option<&ResourceAmounts>,
) -> ResourceAmounts {
    let fraction = fraction.clamp(Decimal::ZERO, Decimal::ONE);
    ResourceAmounts::from_fn(|resource| {
        let held = stockpile.get(resource).max(Decimal::ZERO).floor();
        let share = held.checked_mul(fraction).unwrap_or(held).floor().min(held);
        match headroom {
            Some(room) => share.min(room.get(resource).max(Decimal::ZERO).floor()),
            None => share,
        }
    })
}

/// Remove `loot` from `stockpile`, flooring each resource at zero.
pub fn withdraw(stockpile: &mut ResourceAmounts, loot: &ResourceAmounts) {
    for (resource, taken) in loot.iter() {
        let left = stockpile
            .get(resource)
            .checked_sub(taken)
            .unwrap_or(Decimal::ZERO)
            .max(Decimal::ZERO);
        stockpile.set(resource, left);
    }
}

/// Add `loot` to `stockpile`, capping each resource at `capacity`.
pub fn deposit(stockpile: &mut ResourceAmounts, loot: &ResourceAmounts, capacity: &ResourceAmounts) {
    for (resource, gained) in loot.iter() {
        let current = stockpile.get(resource);
        let cap = capacity.get(resource);
        let total = current.checked_add(gained).unwrap_or(cap).min(cap.max(current));
        stockpile.set(resource, total);
    }
}

/// Free space per resource: `capacity - current`, floored at zero.
pub fn headroom(stockpile: &ResourceAmounts, capacity: &ResourceAmounts) -> ResourceAmounts {
    ResourceAmounts::from_fn(|resource| {
        capacity
            .get(resource)
            .checked_sub(stockpile.get(resource))
            .unwrap_or(Decimal::ZERO)
            .max(Decimal::ZERO)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use marchland_types::Resource;

    fn amounts(wood: i64, clay: i64, iron: i64, crop: i64) -> ResourceAmounts {
        ResourceAmounts {
            wood: Decimal::from(wood),
            clay: Decimal::from(clay),
            iron: Decimal::from(iron),
            crop: Decimal::from(crop),
        }
    }

    fn thirty_percent() -> Decimal {
        Decimal::new(3, 1)
    }

    #[test]
    fn takes_thirty_percent_rounded_down() {
        let loot = calculate_loot(&amounts(500, 333, 10, 0), thirty_percent(), None);
        assert_eq!(loot, amounts(150, 99, 3, 0));
    }

    #[test]
    fn fractional_holdings_are_floored_first() {
        let stock = ResourceAmounts {
            wood: Decimal::new(9999, 2), // 99.99
            ..ResourceAmounts::ZERO
        };
        let loot = calculate_loot(&stock, Decimal::ONE, None);
        assert_eq!(loot.wood, Decimal::from(99));
    }

    #[test]
    fn never_exceeds_holdings() {
        let stock = amounts(7, 0, 1, 1000);
        let loot = calculate_loot(&stock, Decimal::from(5), None);
        for resource in Resource::ALL {
            assert!(loot.get(resource) <= stock.get(resource));
        }
        assert_eq!(loot, stock);
    }

    #[test]
    fn negative_holdings_yield_nothing() {
        let stock = amounts(-10, 0, 0, 0);
        let loot = calculate_loot(&stock, thirty_percent(), None);
        assert_eq!(loot.wood, Decimal::ZERO);
    }

    #[test]
    fn headroom_caps_each_resource() {
        let loot = calculate_loot(
            &amounts(1000, 1000, 1000, 1000),
            thirty_percent(),
            Some(&amounts(50, 1000, 0, 299)),
        );
        assert_eq!(loot, amounts(50, 300, 0, 299));
    }

    #[test]
    fn withdraw_keeps_defender_non_negative() {
        let mut stock = amounts(100, 5, 0, 0);
        withdraw(&mut stock, &amounts(30, 10, 0, 0));
        assert_eq!(stock, amounts(70, 0, 0, 0));
    }

    #[test]
    fn deposit_respects_capacity() {
        let mut stock = amounts(900, 100, 0, 0);
        deposit(&mut stock, &amounts(300, 300, 0, 0), &amounts(1000, 1000, 1000, 1000));
        assert_eq!(stock, amounts(1000, 400, 0, 0));
    }

    #[test]
    fn headroom_is_free_space() {
        let room = headroom(&amounts(900, 1200, 0, 500), &amounts(1000, 1000, 1000, 1000));
        assert_eq!(room, amounts(100, 0, 1000, 500));
    }
}
