//! Read side: report inboxes, village movement listings, stuck records.

use marchland_types::{BattleReport, Movement, MovementId, MovementState, PlayerId, ReportId, VillageId};
use tracing::debug;

use crate::error::{StoreError, ValidationError, WorldError};
use crate::notify::NotificationDispatcher;
use crate::store::WorldStore;
use crate::world::World;

impl<S: WorldStore, N: NotificationDispatcher> World<S, N> {
    /// A player's reports, newest first.
    ///
    /// # Errors
    ///
    /// Only store failures.
    pub async fn inbox(&self, player_id: PlayerId, limit: u32) -> Result<Vec<BattleReport>, WorldError> {
        Ok(self.store.reports_for(player_id, limit).await?)
    }

    /// Every report filed for one movement (attacker and defender copies).
    ///
    /// # Errors
    ///
    /// Only store failures.
    pub async fn movement_reports(&self, movement_id: MovementId) -> Result<Vec<BattleReport>, WorldError> {
        Ok(self.store.reports_for_movement(movement_id).await?)
    }

    /// Flag a report as read. Only its recipient may do so.
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnknownReport`] if the player has no such report.
    pub async fn mark_report_read(&self, player_id: PlayerId, report_id: ReportId) -> Result<(), WorldError> {
        if !self.store.mark_report_read(report_id, player_id).await? {
            return Err(ValidationError::UnknownReport { report_id, player_id }.into());
        }
        debug!(%report_id, %player_id, "Report marked read");
        Ok(())
    }

    /// Movements leaving from or heading to a village.
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnknownVillage`] if the village does not exist.
    pub async fn village_movements(&self, village_id: VillageId) -> Result<Vec<Movement>, WorldError> {
        if self.store.get_village(village_id).await?.is_none() {
            return Err(ValidationError::UnknownVillage { village_id }.into());
        }
        Ok(self.store.movements_for_village(village_id).await?)
    }

    /// Movements left in `Resolving` by a failed resolution.
    ///
    /// # Errors
    ///
    /// Only store failures.
    pub async fn stuck_movements(&self, limit: u32) -> Result<Vec<Movement>, StoreError> {
        self.store.movements_in_state(MovementState::Resolving, limit).await
    }
}
