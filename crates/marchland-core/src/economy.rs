//! Village registration, accrual refresh and building upgrades.

use chrono::{DateTime, Utc};
use marchland_rules::accrual::{accrue_village, village_capacity};
use marchland_types::{BuildingType, PlayerId, Village, VillageId};
use tracing::{debug, info};

use crate::error::{StoreError, ValidationError, WorldError};
use crate::notify::NotificationDispatcher;
use crate::store::WorldStore;
use crate::world::World;

impl<S: WorldStore, N: NotificationDispatcher> World<S, N> {
    /// Found a new village for `owner_id` at `(x, y)`.
    ///
    /// The village starts with no buildings, no troops and an empty
    /// stockpile stamped at the current instant.
    ///
    /// # Errors
    ///
    /// [`ValidationError::CoordinatesTaken`] if the field is occupied.
    pub async fn register_village(
        &self,
        owner_id: PlayerId,
        name: &str,
        x: i32,
        y: i32,
    ) -> Result<Village, WorldError> {
        let village = Village::new(owner_id, name, x, y, self.clock.now());
        self.insert_village(village).await
    }

    /// Store a fully-built village (seeding, imports, tests).
    ///
    /// # Errors
    ///
    /// - [`ValidationError::OverCapacity`] if a stockpile quantity is above
    ///   what the village's storage buildings hold.
    /// - [`ValidationError::CoordinatesTaken`] if the field is occupied.
    pub async fn insert_village(&self, village: Village) -> Result<Village, WorldError> {
        let capacity = village_capacity(&village.buildings, &self.config.economy)?;
        if let Some((resource, quantity)) = village
            .stockpile
            .amounts
            .iter()
            .find(|&(resource, quantity)| quantity > capacity.get(resource))
        {
            return Err(ValidationError::OverCapacity {
                resource,
                quantity,
                capacity: capacity.get(resource),
            }
            .into());
        }
        self.store
            .insert_village(&village)
            .await
            .map_err(|err| match err {
                StoreError::CoordinatesTaken { x, y } => {
                    WorldError::from(ValidationError::CoordinatesTaken { x, y })
                }
                other => other.into(),
            })?;
        info!(
            village_id = %village.id,
            owner_id = %village.owner_id,
            x = village.x,
            y = village.y,
            "Village registered"
        );
        Ok(village)
    }

    /// A village exactly as stored. Resources are not accrued.
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnknownVillage`] if it does not exist.
    pub async fn village(&self, village_id: VillageId) -> Result<Village, WorldError> {
        self.store
            .get_village(village_id)
            .await?
            .ok_or_else(|| ValidationError::UnknownVillage { village_id }.into())
    }

    /// Accrue a village's stockpile to the current instant and persist it.
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnknownVillage`] if it does not exist, or
    /// [`WorldError::Rules`] if the production tables overflow.
    pub async fn refresh_village(&self, village_id: VillageId) -> Result<Village, WorldError> {
        let _guard = self.locks.lock(village_id).await;
        self.accrue_now(village_id, self.clock.now()).await
    }

    /// Raise one building by a level.
    ///
    /// The stockpile is accrued first so production up to now is credited
    /// at the old rate. A building the village lacks goes to level 1.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::UnknownVillage`] if the village does not exist.
    /// - [`ValidationError::NotOwner`] if `player_id` does not own it.
    /// - [`ValidationError::MaxLevel`] at the configured ceiling.
    pub async fn upgrade_building(
        &self,
        player_id: PlayerId,
        village_id: VillageId,
        building: BuildingType,
    ) -> Result<u8, WorldError> {
        let _guard = self.locks.lock(village_id).await;
        let now = self.clock.now();
        let economy = &self.config.economy;
        let level = self
            .store
            .update_village(village_id, |village: &mut Village| -> Result<u8, WorldError> {
                if village.owner_id != player_id {
                    return Err(ValidationError::NotOwner {
                        player_id,
                        village_id,
                    }
                    .into());
                }
                let current = village.building_level(building).unwrap_or(0);
                if current >= economy.max_building_level {
                    return Err(ValidationError::MaxLevel {
                        building,
                        max_level: economy.max_building_level,
                    }
                    .into());
                }
                accrue_village(village, economy, now)?;
                let next = current.saturating_add(1);
                village.buildings.insert(building, next);
                Ok(next)
            })
            .await
            .map_err(unknown_village)?;
        info!(%village_id, building = building.as_str(), level, "Building upgraded");
        Ok(level)
    }

    /// One resource-tick step for a single village.
    pub(crate) async fn tick_village(
        &self,
        village_id: VillageId,
        now: DateTime<Utc>,
    ) -> Result<(), WorldError> {
        let _guard = self.locks.lock(village_id).await;
        let village = self.accrue_now(village_id, now).await?;
        debug!(
            %village_id,
            last_updated = %village.stockpile.last_updated,
            "Village accrued"
        );
        Ok(())
    }

    async fn accrue_now(
        &self,
        village_id: VillageId,
        now: DateTime<Utc>,
    ) -> Result<Village, WorldError> {
        let economy = &self.config.economy;
        self.store
            .update_village(village_id, |village: &mut Village| -> Result<Village, WorldError> {
                accrue_village(village, economy, now)?;
                Ok(village.clone())
            })
            .await
            .map_err(unknown_village)
    }
}

fn unknown_village(err: WorldError) -> WorldError {
    match err {
        WorldError::Store {
            source: StoreError::VillageNotFound { village_id },
        } => ValidationError::UnknownVillage { village_id }.into(),
        other => other,
    }
}
