//! Core records for the Marchland simulation.
//!
//! Relationships between records are identity references (a movement holds
//! the [`VillageId`]s of both ends, a report holds its [`MovementId`]); the
//! store resolves them. No record embeds another record's graph.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::enums::{BattleOutcome, BuildingType, MovementKind, MovementState, ReportRole, Resource};
use crate::ids::{MovementId, PlayerId, ReportId, VillageId};

// ---------------------------------------------------------------------------
// Troops
// ---------------------------------------------------------------------------

/// Name of a troop type, as keyed in the troop catalog (e.g. `"infantry"`).
///
/// Troop types are data, not code: the set of valid names is whatever the
/// loaded configuration declares.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TroopType(String);

impl TroopType {
    /// Create a troop type name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Return the name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TroopType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TroopType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A requested quantity that exceeds what is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortfall {
    /// The troop type that is short.
    pub troop_type: TroopType,
    /// Quantity requested.
    pub requested: u32,
    /// Quantity available.
    pub available: u32,
}

/// Troop type to count mapping.
///
/// Zero counts are never stored, so two forces with the same non-zero
/// composition compare equal regardless of how they were built. Building a
/// force from `(type, count)` pairs sums duplicate entries, which makes the
/// result independent of entry order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TroopCounts(BTreeMap<TroopType, u32>);

impl<'de> Deserialize<'de> for TroopCounts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BTreeMap::<TroopType, u32>::deserialize(deserializer).map(|raw| raw.into_iter().collect())
    }
}

impl TroopCounts {
    /// An empty force.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Count for a troop type (0 when absent).
    pub fn get(&self, troop_type: &TroopType) -> u32 {
        self.0.get(troop_type).copied().unwrap_or(0)
    }

    /// Set the count for a troop type. Setting zero removes the entry.
    pub fn set(&mut self, troop_type: TroopType, count: u32) {
        if count == 0 {
            self.0.remove(&troop_type);
        } else {
            self.0.insert(troop_type, count);
        }
    }

    /// Total number of units across all types.
    pub fn total(&self) -> u64 {
        self.0
            .values()
            .fold(0_u64, |acc, &n| acc.saturating_add(u64::from(n)))
    }

    /// Whether the force has no units.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(type, count)` pairs in type order.
    pub fn iter(&self) -> impl Iterator<Item = (&TroopType, u32)> {
        self.0.iter().map(|(t, &n)| (t, n))
    }

    /// Iterate over the troop types present.
    pub fn types(&self) -> impl Iterator<Item = &TroopType> {
        self.0.keys()
    }

    /// Add another force into this one (saturating per type).
    pub fn add(&mut self, other: &Self) {
        for (troop_type, count) in other.iter() {
            let sum = self.get(troop_type).saturating_add(count);
            self.set(troop_type.clone(), sum);
        }
    }

    /// Remove another force from this one, flooring each type at zero.
    pub fn subtract(&mut self, other: &Self) {
        for (troop_type, count) in other.iter() {
            let rest = self.get(troop_type).saturating_sub(count);
            self.set(troop_type.clone(), rest);
        }
    }

    /// This force minus `other`, floored at zero per type.
    #[must_use]
    pub fn minus(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.subtract(other);
        out
    }

    /// The first troop type (in type order) for which `requested` exceeds
    /// this force, if any.
    pub fn shortfall(&self, requested: &Self) -> Option<Shortfall> {
        requested.iter().find_map(|(troop_type, wanted)| {
            let available = self.get(troop_type);
            (wanted > available).then(|| Shortfall {
                troop_type: troop_type.clone(),
                requested: wanted,
                available,
            })
        })
    }
}

impl FromIterator<(TroopType, u32)> for TroopCounts {
    fn from_iter<I: IntoIterator<Item = (TroopType, u32)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (troop_type, count) in iter {
            let sum = out.get(&troop_type).saturating_add(count);
            out.set(troop_type, sum);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// One quantity per [`Resource`].
///
/// Stockpiles keep exact decimal quantities so that production smaller
/// than one unit per pass is not lost. Anything that leaves a stockpile is
/// a whole number of units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAmounts {
    /// Wood.
    pub wood: Decimal,
    /// Clay.
    pub clay: Decimal,
    /// Iron.
    pub iron: Decimal,
    /// Crop.
    pub crop: Decimal,
}

impl ResourceAmounts {
    /// All four quantities zero.
    pub const ZERO: Self = Self {
        wood: Decimal::ZERO,
        clay: Decimal::ZERO,
        iron: Decimal::ZERO,
        crop: Decimal::ZERO,
    };

    /// The same quantity of every resource.
    pub const fn uniform(quantity: Decimal) -> Self {
        Self {
            wood: quantity,
            clay: quantity,
            iron: quantity,
            crop: quantity,
        }
    }

    /// Quantity of one resource.
    pub const fn get(&self, resource: Resource) -> Decimal {
        match resource {
            Resource::Wood => self.wood,
            Resource::Clay => self.clay,
            Resource::Iron => self.iron,
            Resource::Crop => self.crop,
        }
    }

    /// Replace the quantity of one resource.
    pub const fn set(&mut self, resource: Resource, quantity: Decimal) {
        match resource {
            Resource::Wood => self.wood = quantity,
            Resource::Clay => self.clay = quantity,
            Resource::Iron => self.iron = quantity,
            Resource::Crop => self.crop = quantity,
        }
    }

    /// Build from a per-resource function.
    pub fn from_fn(mut f: impl FnMut(Resource) -> Decimal) -> Self {
        Self {
            wood: f(Resource::Wood),
            clay: f(Resource::Clay),
            iron: f(Resource::Iron),
            crop: f(Resource::Crop),
        }
    }

    /// Every quantity rounded down to whole units.
    #[must_use]
    pub fn floored(&self) -> Self {
        Self::from_fn(|r| self.get(r).floor())
    }

    /// Whole units of one resource.
    pub fn whole(&self, resource: Resource) -> Decimal {
        self.get(resource).floor()
    }

    /// Whether every quantity is zero.
    pub fn is_zero(&self) -> bool {
        Resource::ALL.iter().all(|&r| self.get(r).is_zero())
    }

    /// Iterate in canonical resource order.
    pub fn iter(&self) -> impl Iterator<Item = (Resource, Decimal)> + '_ {
        Resource::ALL.into_iter().map(|r| (r, self.get(r)))
    }
}

/// A village's resources together with the instant they were last accrued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stockpile {
    /// Current quantities.
    pub amounts: ResourceAmounts,
    /// Instant up to which production has been credited.
    pub last_updated: DateTime<Utc>,
}

impl Stockpile {
    /// A stockpile holding `amounts`, accrued up to `at`.
    pub const fn new(amounts: ResourceAmounts, at: DateTime<Utc>) -> Self {
        Self {
            amounts,
            last_updated: at,
        }
    }
}

// ---------------------------------------------------------------------------
// Villages
// ---------------------------------------------------------------------------

/// A village on the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Village {
    /// Identity.
    pub id: VillageId,
    /// Owning player.
    pub owner_id: PlayerId,
    /// Display name.
    pub name: String,
    /// Map column. `(x, y)` is unique across all villages.
    pub x: i32,
    /// Map row.
    pub y: i32,
    /// Building levels, at most one building per type.
    pub buildings: BTreeMap<BuildingType, u8>,
    /// Garrison (troops at home, including stationed reinforcements).
    pub troops: TroopCounts,
    /// Resources and their accrual stamp.
    pub stockpile: Stockpile,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

impl Village {
    /// A new village with no buildings, no troops and an empty stockpile
    /// accrued up to `now`.
    pub fn new(owner_id: PlayerId, name: impl Into<String>, x: i32, y: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: VillageId::new(),
            owner_id,
            name: name.into(),
            x,
            y,
            buildings: BTreeMap::new(),
            troops: TroopCounts::new(),
            stockpile: Stockpile::new(ResourceAmounts::ZERO, now),
            created_at: now,
        }
    }

    /// Level of a building, if the village has one of that type.
    pub fn building_level(&self, building: BuildingType) -> Option<u8> {
        self.buildings.get(&building).copied()
    }

    /// `(x, y)` map coordinates.
    pub const fn coordinates(&self) -> (i32, i32) {
        (self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Movements
// ---------------------------------------------------------------------------

/// A military force in transit between two villages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// Identity.
    pub id: MovementId,
    /// Village the force left from.
    pub origin_id: VillageId,
    /// Village the force is heading to.
    pub destination_id: VillageId,
    /// What the force does on arrival.
    pub kind: MovementKind,
    /// Units sent. Fixed at dispatch.
    pub troops: TroopCounts,
    /// Departure instant.
    pub departure_time: DateTime<Utc>,
    /// Arrival instant, strictly after departure.
    pub arrival_time: DateTime<Utc>,
    /// Instant survivors reach home. Set at resolution for hostile kinds.
    pub return_time: Option<DateTime<Utc>>,
    /// Lifecycle state.
    pub state: MovementState,
    /// Battle outcome. Set at resolution for hostile kinds.
    pub outcome: Option<BattleOutcome>,
    /// Units left after the battle. Set at resolution.
    pub survivors: Option<TroopCounts>,
    /// Resources carried off. Set only for hostile victories.
    pub loot: Option<ResourceAmounts>,
}

impl Movement {
    /// One-way travel time.
    pub fn travel_duration(&self) -> TimeDelta {
        self.arrival_time.signed_duration_since(self.departure_time)
    }

    /// Whether any unit survived resolution.
    pub fn has_survivors(&self) -> bool {
        self.survivors.as_ref().is_some_and(|s| !s.is_empty())
    }
}

/// Everything a resolution step writes back onto its movement when it
/// moves it from `Resolving` to `Completed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementResolution {
    /// Battle outcome (absent for reinforcements).
    pub outcome: Option<BattleOutcome>,
    /// Units left after the battle.
    pub survivors: TroopCounts,
    /// Resources carried off, for hostile victories.
    pub loot: Option<ResourceAmounts>,
    /// When survivors reach home (absent for reinforcements).
    pub return_time: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// A battle report in one player's inbox.
///
/// Each resolved movement produces one report per participant role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleReport {
    /// Identity.
    pub id: ReportId,
    /// The resolved movement.
    pub movement_id: MovementId,
    /// Inbox owner.
    pub recipient_id: PlayerId,
    /// Side the recipient was on.
    pub role: ReportRole,
    /// Kind of movement that was resolved.
    pub kind: MovementKind,
    /// Attacking village.
    pub origin_id: VillageId,
    /// Defending (or reinforced) village.
    pub destination_id: VillageId,
    /// Battle outcome (absent for reinforcements).
    pub outcome: Option<BattleOutcome>,
    /// Attacker combat power.
    pub attacker_power: u64,
    /// Defender combat power.
    pub defender_power: u64,
    /// Attacker losses per troop type.
    pub attacker_casualties: TroopCounts,
    /// Defender losses per troop type.
    pub defender_casualties: TroopCounts,
    /// Whole units carried off.
    pub loot: ResourceAmounts,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Whether the recipient has opened it.
    pub read: bool,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Summary of a finished battle report for push delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportNotice {
    /// Report delivered.
    pub report_id: ReportId,
    /// Recipient.
    pub recipient_id: PlayerId,
    /// Outcome (absent for reinforcements).
    pub outcome: Option<BattleOutcome>,
    /// Attacker losses.
    pub attacker_casualties: TroopCounts,
    /// Defender losses.
    pub defender_casualties: TroopCounts,
    /// Loot transferred.
    pub loot: ResourceAmounts,
}

impl From<&BattleReport> for ReportNotice {
    fn from(report: &BattleReport) -> Self {
        Self {
            report_id: report.id,
            recipient_id: report.recipient_id,
            outcome: report.outcome,
            attacker_casualties: report.attacker_casualties.clone(),
            defender_casualties: report.defender_casualties.clone(),
            loot: report.loot,
        }
    }
}

/// Warning to a village owner that a force is on its way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMovementNotice {
    /// The movement in flight.
    pub movement_id: MovementId,
    /// Owner of the destination village.
    pub recipient_id: PlayerId,
    /// What the force intends to do.
    pub kind: MovementKind,
    /// Sending village.
    pub origin_id: VillageId,
    /// Target village.
    pub destination_id: VillageId,
    /// When the force arrives.
    pub arrival_time: DateTime<Utc>,
}

/// Everything the core hands to the notification dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A battle report was filed.
    BattleReport(ReportNotice),
    /// A force was dispatched at one of the recipient's villages.
    IncomingMovement(IncomingMovementNotice),
}

impl Notification {
    /// The player this notification is addressed to.
    pub const fn recipient_id(&self) -> PlayerId {
        match self {
            Self::BattleReport(notice) => notice.recipient_id,
            Self::IncomingMovement(notice) => notice.recipient_id,
        }
    }

    /// Short stable name of the variant.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BattleReport(_) => "battle_report",
            Self::IncomingMovement(_) => "incoming_movement",
        }
    }
}
