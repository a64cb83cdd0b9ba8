//! In-process [`WorldStore`] with one async lock per record.
//!
//! Table maps are only ever held long enough to clone a record handle;
//! waiting on a record lock never happens while a table lock is held.
//! Steps that touch several records lock the movement first and then the
//! villages in identity order.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use marchland_types::{
    BattleReport, Movement, MovementId, MovementState, PlayerId, ReportId, Village, VillageId,
};
use tokio::sync::{Mutex, RwLock};

use super::{ResolutionCommit, WorldStore};
use crate::error::StoreError;

type Record<T> = Arc<Mutex<T>>;

#[derive(Debug, Default)]
struct VillageTable {
    records: HashMap<VillageId, Record<Village>>,
    occupied: HashMap<(i32, i32), VillageId>,
}

/// A [`WorldStore`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    villages: RwLock<VillageTable>,
    movements: RwLock<HashMap<MovementId, Record<Movement>>>,
    reports: RwLock<Vec<BattleReport>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn village_record(&self, village_id: VillageId) -> Result<Record<Village>, StoreError> {
        self.villages
            .read()
            .await
            .records
            .get(&village_id)
            .cloned()
            .ok_or(StoreError::VillageNotFound { village_id })
    }

    async fn movement_record(&self, movement_id: MovementId) -> Result<Record<Movement>, StoreError> {
        self.movements
            .read()
            .await
            .get(&movement_id)
            .cloned()
            .ok_or(StoreError::MovementNotFound { movement_id })
    }

    async fn all_villages(&self) -> Vec<Record<Village>> {
        self.villages.read().await.records.values().cloned().collect()
    }

    async fn all_movements(&self) -> Vec<Record<Movement>> {
        self.movements.read().await.values().cloned().collect()
    }

    /// Snapshot every movement matching `keep`, sorted by `key`.
    async fn scan_movements<K: Ord>(
        &self,
        keep: impl Fn(&Movement) -> bool,
        key: impl Fn(&Movement) -> K,
        limit: u32,
    ) -> Vec<Movement> {
        let mut out = Vec::new();
        for record in self.all_movements().await {
            let movement = record.lock().await;
            if keep(&movement) {
                out.push(movement.clone());
            }
        }
        out.sort_by_key(key);
        out.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        out
    }
}

/// Copy everything but identity and coordinates from `draft` to `stored`.
fn write_back(stored: &mut Village, draft: Village) {
    let Village {
        owner_id,
        name,
        buildings,
        troops,
        stockpile,
        ..
    } = draft;
    stored.owner_id = owner_id;
    stored.name = name;
    stored.buildings = buildings;
    stored.troops = troops;
    stored.stockpile = stockpile;
}

impl WorldStore for MemoryStore {
    async fn get_village(&self, village_id: VillageId) -> Result<Option<Village>, StoreError> {
        let Ok(record) = self.village_record(village_id).await else {
            return Ok(None);
        };
        let village = record.lock().await.clone();
        Ok(Some(village))
    }

    async fn insert_village(&self, village: &Village) -> Result<(), StoreError> {
        let mut table = self.villages.write().await;
        let (x, y) = village.coordinates();
        if table.occupied.contains_key(&(x, y)) {
            return Err(StoreError::CoordinatesTaken { x, y });
        }
        if table.records.contains_key(&village.id) {
            return Err(StoreError::Backend {
                message: format!("village {} already exists", village.id),
            });
        }
        table.occupied.insert((x, y), village.id);
        table
            .records
            .insert(village.id, Arc::new(Mutex::new(village.clone())));
        Ok(())
    }

    async fn update_village<T, E, F>(&self, village_id: VillageId, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<StoreError> + Send,
        F: FnOnce(&mut Village) -> Result<T, E> + Send,
    {
        let record = self.village_record(village_id).await?;
        let mut stored = record.lock().await;
        let mut draft = stored.clone();
        let out = f(&mut draft)?;
        write_back(&mut stored, draft);
        Ok(out)
    }

    async fn stale_villages(&self, before: DateTime<Utc>, limit: u32) -> Result<Vec<VillageId>, StoreError> {
        let mut stale = Vec::new();
        for record in self.all_villages().await {
            let village = record.lock().await;
            if village.stockpile.last_updated < before {
                stale.push((village.stockpile.last_updated, village.id));
            }
        }
        stale.sort_unstable();
        Ok(stale
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(|(_, id)| id)
            .collect())
    }

    async fn dispatch<E, F>(&self, origin_id: VillageId, f: F) -> Result<Movement, E>
    where
        E: From<StoreError> + Send,
        F: FnOnce(&mut Village) -> Result<Movement, E> + Send,
    {
        let record = self.village_record(origin_id).await?;
        let mut stored = record.lock().await;
        let mut draft = stored.clone();
        let movement = f(&mut draft)?;
        self.movements
            .write()
            .await
            .insert(movement.id, Arc::new(Mutex::new(movement.clone())));
        write_back(&mut stored, draft);
        Ok(movement)
    }

    async fn get_movement(&self, movement_id: MovementId) -> Result<Option<Movement>, StoreError> {
        let Ok(record) = self.movement_record(movement_id).await else {
            return Ok(None);
        };
        let movement = record.lock().await.clone();
        Ok(Some(movement))
    }

    async fn movements_for_village(&self, village_id: VillageId) -> Result<Vec<Movement>, StoreError> {
        Ok(self
            .scan_movements(
                |m| m.origin_id == village_id || m.destination_id == village_id,
                |m| (m.departure_time, m.id),
                u32::MAX,
            )
            .await)
    }

    async fn due_arrivals(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Movement>, StoreError> {
        Ok(self
            .scan_movements(
                |m| m.state == MovementState::Pending && m.arrival_time <= now,
                |m| (m.arrival_time, m.id),
                limit,
            )
            .await)
    }

    async fn due_returns(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Movement>, StoreError> {
        Ok(self
            .scan_movements(
                |m| m.state == MovementState::Completed && m.return_time.is_some_and(|t| t <= now),
                |m| (m.return_time, m.id),
                limit,
            )
            .await)
    }

    async fn movements_in_state(&self, state: MovementState, limit: u32) -> Result<Vec<Movement>, StoreError> {
        Ok(self
            .scan_movements(|m| m.state == state, |m| (m.arrival_time, m.id), limit)
            .await)
    }

    async fn claim_movement(
        &self,
        movement_id: MovementId,
        from: MovementState,
        to: MovementState,
    ) -> Result<bool, StoreError> {
        let record = self.movement_record(movement_id).await?;
        let mut movement = record.lock().await;
        if movement.state != from {
            return Ok(false);
        }
        movement.state = to;
        Ok(true)
    }

    async fn commit_resolution<E, F>(&self, movement: &Movement, f: F) -> Result<ResolutionCommit, E>
    where
        E: From<StoreError> + Send,
        F: FnOnce(&mut Village, &mut Village) -> Result<ResolutionCommit, E> + Send,
    {
        let record = self.movement_record(movement.id).await?;
        let mut stored_movement = record.lock().await;
        if stored_movement.state != MovementState::Resolving {
            return Err(StoreError::StateChanged {
                movement_id: movement.id,
                expected: MovementState::Resolving,
            }
            .into());
        }
        let origin_id = stored_movement.origin_id;
        let destination_id = stored_movement.destination_id;
        if origin_id == destination_id {
            return Err(StoreError::Corrupt {
                message: format!("movement {} targets its own origin", movement.id),
            }
            .into());
        }

        let origin_record = self.village_record(origin_id).await?;
        let destination_record = self.village_record(destination_id).await?;
        let (mut origin, mut destination) = if origin_id < destination_id {
            let o = origin_record.lock().await;
            let d = destination_record.lock().await;
            (o, d)
        } else {
            let d = destination_record.lock().await;
            let o = origin_record.lock().await;
            (o, d)
        };

        let mut origin_draft = origin.clone();
        let mut destination_draft = destination.clone();
        let commit = f(&mut origin_draft, &mut destination_draft)?;

        write_back(&mut origin, origin_draft);
        write_back(&mut destination, destination_draft);
        let resolution = commit.resolution.clone();
        stored_movement.state = MovementState::Completed;
        stored_movement.outcome = resolution.outcome;
        stored_movement.survivors = Some(resolution.survivors);
        stored_movement.loot = resolution.loot;
        stored_movement.return_time = resolution.return_time;

        let mut reports = self.reports.write().await;
        for report in &commit.reports {
            let duplicate = reports
                .iter()
                .any(|r| r.movement_id == report.movement_id && r.role == report.role);
            if !duplicate {
                reports.push(report.clone());
            }
        }
        Ok(commit)
    }

    async fn complete_return(&self, movement_id: MovementId) -> Result<bool, StoreError> {
        let record = self.movement_record(movement_id).await?;
        let mut movement = record.lock().await;
        if movement.state != MovementState::Completed {
            return Ok(false);
        }
        let origin_record = self.village_record(movement.origin_id).await?;
        let mut origin = origin_record.lock().await;
        if let Some(survivors) = &movement.survivors {
            origin.troops.add(survivors);
        }
        movement.state = MovementState::Returned;
        Ok(true)
    }

    async fn cancel_movement(&self, movement_id: MovementId) -> Result<bool, StoreError> {
        let record = self.movement_record(movement_id).await?;
        let mut movement = record.lock().await;
        if movement.state != MovementState::Pending {
            return Ok(false);
        }
        let origin_record = self.village_record(movement.origin_id).await?;
        let mut origin = origin_record.lock().await;
        origin.troops.add(&movement.troops);
        movement.state = MovementState::Canceled;
        Ok(true)
    }

    async fn reports_for(&self, player_id: PlayerId, limit: u32) -> Result<Vec<BattleReport>, StoreError> {
        let mut inbox: Vec<BattleReport> = self
            .reports
            .read()
            .await
            .iter()
            .filter(|r| r.recipient_id == player_id)
            .cloned()
            .collect();
        inbox.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        inbox.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(inbox)
    }

    async fn reports_for_movement(&self, movement_id: MovementId) -> Result<Vec<BattleReport>, StoreError> {
        let mut found: Vec<BattleReport> = self
            .reports
            .read()
            .await
            .iter()
            .filter(|r| r.movement_id == movement_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.role);
        Ok(found)
    }

    async fn mark_report_read(&self, report_id: ReportId, player_id: PlayerId) -> Result<bool, StoreError> {
        let mut reports = self.reports.write().await;
        let Some(report) = reports
            .iter_mut()
            .find(|r| r.id == report_id && r.recipient_id == player_id)
        else {
            return Ok(false);
        };
        report.read = true;
        Ok(true)
    }
}
