//! [`WorldStore`] backed by `PostgreSQL`.
//!
//! # Atomicity
//!
//! - Village read-modify-write runs in one transaction around
//!   `SELECT ... FOR UPDATE`, so concurrent updates to the same village
//!   serialize on the row lock and never lose a write.
//! - Movement claims are a single `UPDATE ... WHERE state = $expected`; the
//!   row count says whether this caller won.
//! - Steps that touch a movement and villages lock the movement row first,
//!   then the villages in id order.
//!
//! Troop counts, building levels, survivors and loot are stored as JSONB;
//! stockpile quantities as `NUMERIC` columns.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use marchland_core::{ResolutionCommit, StoreError, WorldStore};
use marchland_types::{
    BattleOutcome, BattleReport, BuildingType, Movement, MovementId, MovementKind, MovementState,
    PlayerId, ReportId, ReportRole, ResourceAmounts, Stockpile, TroopCounts, Village, VillageId,
};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{COORDINATES_CONSTRAINT, DbError};

const SELECT_VILLAGE: &str = r"SELECT id, owner_id, name, x, y, buildings, troops,
       wood, clay, iron, crop, last_updated, created_at
  FROM villages
 WHERE id = $1";

const LOCK_VILLAGE: &str = r"SELECT id, owner_id, name, x, y, buildings, troops,
       wood, clay, iron, crop, last_updated, created_at
  FROM villages
 WHERE id = $1
   FOR UPDATE";

const MOVEMENT_COLUMNS: &str = "id, origin_id, destination_id, kind, troops, departure_time, \
     arrival_time, return_time, state, outcome, survivors, loot";

const REPORT_COLUMNS: &str = "id, movement_id, recipient_id, role, kind, origin_id, \
     destination_id, outcome, attacker_power, defender_power, attacker_casualties, \
     defender_casualties, loot, created_at, read";

fn db(err: impl Into<DbError>) -> StoreError {
    err.into().into()
}

fn limit(limit: u32) -> i64 {
    i64::from(limit)
}

/// `PostgreSQL` implementation of [`WorldStore`].
#[derive(Debug, Clone)]
pub struct PgWorldStore {
    pool: PgPool,
}

impl PgWorldStore {
    /// A store over an existing pool. Migrations must already be applied.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn query_movements(
        &self,
        filter: &str,
        bind_time: Option<DateTime<Utc>>,
        bind_id: Option<Uuid>,
        max: u32,
    ) -> Result<Vec<Movement>, StoreError> {
        let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM movements WHERE {filter} LIMIT $1");
        let mut query = sqlx::query_as::<_, MovementRow>(&sql).bind(limit(max));
        if let Some(at) = bind_time {
            query = query.bind(at);
        }
        if let Some(id) = bind_id {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(db)?;
        rows.into_iter()
            .map(|row| Movement::try_from(row).map_err(db))
            .collect()
    }
}

impl WorldStore for PgWorldStore {
    // =========================================================================
    // Villages
    // =========================================================================

    async fn get_village(&self, village_id: VillageId) -> Result<Option<Village>, StoreError> {
        let row = sqlx::query_as::<_, VillageRow>(SELECT_VILLAGE)
            .bind(village_id.into_inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        Ok(row.map(Village::from))
    }

    async fn insert_village(&self, village: &Village) -> Result<(), StoreError> {
        let inserted = sqlx::query(
            r"INSERT INTO villages
              (id, owner_id, name, x, y, buildings, troops, wood, clay, iron, crop, last_updated, created_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(village.id.into_inner())
        .bind(village.owner_id.into_inner())
        .bind(&village.name)
        .bind(village.x)
        .bind(village.y)
        .bind(Json(&village.buildings))
        .bind(Json(&village.troops))
        .bind(village.stockpile.amounts.wood)
        .bind(village.stockpile.amounts.clay)
        .bind(village.stockpile.amounts.iron)
        .bind(village.stockpile.amounts.crop)
        .bind(village.stockpile.last_updated)
        .bind(village.created_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {
                tracing::debug!(village_id = %village.id, "Inserted village");
                Ok(())
            }
            Err(sqlx::Error::Database(err)) if err.constraint() == Some(COORDINATES_CONSTRAINT) => {
                Err(StoreError::CoordinatesTaken {
                    x: village.x,
                    y: village.y,
                })
            }
            Err(err) => Err(db(err)),
        }
    }

    async fn update_village<T, E, F>(&self, village_id: VillageId, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<StoreError> + Send,
        F: FnOnce(&mut Village) -> Result<T, E> + Send,
    {
        let mut tx = self.pool.begin().await.map_err(db)?;
        let mut village = lock_village(&mut tx, village_id).await?;
        let value = f(&mut village)?;
        write_village(&mut tx, &village).await.map_err(db)?;
        tx.commit().await.map_err(db)?;
        Ok(value)
    }

    async fn stale_villages(
        &self,
        before: DateTime<Utc>,
        max: u32,
    ) -> Result<Vec<VillageId>, StoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r"SELECT id FROM villages
              WHERE last_updated < $1
              ORDER BY last_updated, id
              LIMIT $2",
        )
        .bind(before)
        .bind(limit(max))
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        Ok(ids.into_iter().map(VillageId::from).collect())
    }

    // =========================================================================
    // Movements
    // =========================================================================

    async fn dispatch<E, F>(&self, origin_id: VillageId, f: F) -> Result<Movement, E>
    where
        E: From<StoreError> + Send,
        F: FnOnce(&mut Village) -> Result<Movement, E> + Send,
    {
        let mut tx = self.pool.begin().await.map_err(db)?;
        let mut origin = lock_village(&mut tx, origin_id).await?;
        let movement = f(&mut origin)?;
        write_village(&mut tx, &origin).await.map_err(db)?;
        insert_movement(&mut tx, &movement).await.map_err(db)?;
        tx.commit().await.map_err(db)?;
        Ok(movement)
    }

    async fn get_movement(&self, movement_id: MovementId) -> Result<Option<Movement>, StoreError> {
        let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM movements WHERE id = $1");
        let row = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(movement_id.into_inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        row.map(Movement::try_from).transpose().map_err(db)
    }

    async fn movements_for_village(&self, village_id: VillageId) -> Result<Vec<Movement>, StoreError> {
        self.query_movements(
            "origin_id = $2 OR destination_id = $2 ORDER BY departure_time, id",
            None,
            Some(village_id.into_inner()),
            u32::MAX,
        )
        .await
    }

    async fn due_arrivals(&self, now: DateTime<Utc>, max: u32) -> Result<Vec<Movement>, StoreError> {
        self.query_movements(
            "state = 'pending' AND arrival_time <= $2 ORDER BY arrival_time, id",
            Some(now),
            None,
            max,
        )
        .await
    }

    async fn due_returns(&self, now: DateTime<Utc>, max: u32) -> Result<Vec<Movement>, StoreError> {
        self.query_movements(
            "state = 'completed' AND return_time <= $2 ORDER BY return_time, id",
            Some(now),
            None,
            max,
        )
        .await
    }

    async fn movements_in_state(
        &self,
        state: MovementState,
        max: u32,
    ) -> Result<Vec<Movement>, StoreError> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movements WHERE state = $1 \
             ORDER BY arrival_time, id LIMIT $2"
        );
        let rows = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(state.as_str())
            .bind(limit(max))
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        rows.into_iter()
            .map(|row| Movement::try_from(row).map_err(db))
            .collect()
    }

    async fn claim_movement(
        &self,
        movement_id: MovementId,
        from: MovementState,
        to: MovementState,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE movements SET state = $3 WHERE id = $1 AND state = $2")
            .bind(movement_id.into_inner())
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(result.rows_affected() == 1)
    }

    async fn commit_resolution<E, F>(&self, movement: &Movement, f: F) -> Result<ResolutionCommit, E>
    where
        E: From<StoreError> + Send,
        F: FnOnce(&mut Village, &mut Village) -> Result<ResolutionCommit, E> + Send,
    {
        let movement_id = movement.id;
        let mut tx = self.pool.begin().await.map_err(db)?;

        let state: Option<String> =
            sqlx::query_scalar("SELECT state FROM movements WHERE id = $1 FOR UPDATE")
                .bind(movement_id.into_inner())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db)?;
        let state = state.ok_or(StoreError::MovementNotFound { movement_id })?;
        if state != MovementState::Resolving.as_str() {
            return Err(StoreError::StateChanged {
                movement_id,
                expected: MovementState::Resolving,
            }
            .into());
        }

        let (origin_id, destination_id) = (movement.origin_id, movement.destination_id);
        if origin_id == destination_id {
            return Err(StoreError::Corrupt {
                message: format!("movement {movement_id} targets its own origin"),
            }
            .into());
        }
        let (mut origin, mut destination) = if origin_id < destination_id {
            let origin = lock_village(&mut tx, origin_id).await?;
            (origin, lock_village(&mut tx, destination_id).await?)
        } else {
            let destination = lock_village(&mut tx, destination_id).await?;
            (lock_village(&mut tx, origin_id).await?, destination)
        };

        let commit = f(&mut origin, &mut destination)?;

        write_village(&mut tx, &origin).await.map_err(db)?;
        write_village(&mut tx, &destination).await.map_err(db)?;
        let resolution = &commit.resolution;
        sqlx::query(
            r"UPDATE movements
              SET state = $2, outcome = $3, survivors = $4, loot = $5, return_time = $6
              WHERE id = $1 AND state = $7",
        )
        .bind(movement_id.into_inner())
        .bind(MovementState::Completed.as_str())
        .bind(resolution.outcome.map(BattleOutcome::as_str))
        .bind(Json(&resolution.survivors))
        .bind(resolution.loot.map(Json))
        .bind(resolution.return_time)
        .bind(MovementState::Resolving.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        for report in &commit.reports {
            insert_report(&mut tx, report).await.map_err(db)?;
        }
        tx.commit().await.map_err(db)?;

        tracing::debug!(%movement_id, reports = commit.reports.len(), "Committed resolution");
        Ok(commit)
    }

    async fn complete_return(&self, movement_id: MovementId) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        let Some(movement) = lock_movement(&mut tx, movement_id, MovementState::Completed).await? else {
            return Ok(false);
        };
        let mut origin = lock_village(&mut tx, movement.origin_id).await?;
        if let Some(survivors) = &movement.survivors {
            origin.troops.add(survivors);
        }
        write_village(&mut tx, &origin).await.map_err(db)?;
        set_state(&mut tx, movement_id, MovementState::Returned).await.map_err(db)?;
        tx.commit().await.map_err(db)?;
        Ok(true)
    }

    async fn cancel_movement(&self, movement_id: MovementId) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        let Some(movement) = lock_movement(&mut tx, movement_id, MovementState::Pending).await? else {
            return Ok(false);
        };
        let mut origin = lock_village(&mut tx, movement.origin_id).await?;
        origin.troops.add(&movement.troops);
        write_village(&mut tx, &origin).await.map_err(db)?;
        set_state(&mut tx, movement_id, MovementState::Canceled).await.map_err(db)?;
        tx.commit().await.map_err(db)?;
        Ok(true)
    }

    // =========================================================================
    // Reports
    // =========================================================================

    async fn reports_for(&self, player_id: PlayerId, max: u32) -> Result<Vec<BattleReport>, StoreError> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM battle_reports WHERE recipient_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(player_id.into_inner())
            .bind(limit(max))
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        rows.into_iter()
            .map(|row| BattleReport::try_from(row).map_err(db))
            .collect()
    }

    async fn reports_for_movement(&self, movement_id: MovementId) -> Result<Vec<BattleReport>, StoreError> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM battle_reports WHERE movement_id = $1 ORDER BY role");
        let rows = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(movement_id.into_inner())
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        rows.into_iter()
            .map(|row| BattleReport::try_from(row).map_err(db))
            .collect()
    }

    async fn mark_report_read(&self, report_id: ReportId, player_id: PlayerId) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE battle_reports SET read = TRUE WHERE id = $1 AND recipient_id = $2")
            .bind(report_id.into_inner())
            .bind(player_id.into_inner())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Transaction helpers
// =============================================================================

async fn lock_village(conn: &mut PgConnection, village_id: VillageId) -> Result<Village, StoreError> {
    let row = sqlx::query_as::<_, VillageRow>(LOCK_VILLAGE)
        .bind(village_id.into_inner())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db)?;
    row.map(Village::from)
        .ok_or(StoreError::VillageNotFound { village_id })
}

/// Persist everything but identity and coordinates.
async fn write_village(conn: &mut PgConnection, village: &Village) -> Result<(), DbError> {
    sqlx::query(
        r"UPDATE villages
          SET owner_id = $2, name = $3, buildings = $4, troops = $5,
              wood = $6, clay = $7, iron = $8, crop = $9, last_updated = $10
          WHERE id = $1",
    )
    .bind(village.id.into_inner())
    .bind(village.owner_id.into_inner())
    .bind(&village.name)
    .bind(Json(&village.buildings))
    .bind(Json(&village.troops))
    .bind(village.stockpile.amounts.wood)
    .bind(village.stockpile.amounts.clay)
    .bind(village.stockpile.amounts.iron)
    .bind(village.stockpile.amounts.crop)
    .bind(village.stockpile.last_updated)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_movement(conn: &mut PgConnection, movement: &Movement) -> Result<(), DbError> {
    sqlx::query(
        r"INSERT INTO movements
          (id, origin_id, destination_id, kind, troops, departure_time, arrival_time,
           return_time, state, outcome, survivors, loot)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(movement.id.into_inner())
    .bind(movement.origin_id.into_inner())
    .bind(movement.destination_id.into_inner())
    .bind(movement.kind.as_str())
    .bind(Json(&movement.troops))
    .bind(movement.departure_time)
    .bind(movement.arrival_time)
    .bind(movement.return_time)
    .bind(movement.state.as_str())
    .bind(movement.outcome.map(BattleOutcome::as_str))
    .bind(movement.survivors.as_ref().map(Json))
    .bind(movement.loot.map(Json))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Lock a movement row if it is in `state`.
async fn lock_movement(
    conn: &mut PgConnection,
    movement_id: MovementId,
    state: MovementState,
) -> Result<Option<Movement>, StoreError> {
    let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM movements WHERE id = $1 AND state = $2 FOR UPDATE");
    let row = sqlx::query_as::<_, MovementRow>(&sql)
        .bind(movement_id.into_inner())
        .bind(state.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db)?;
    row.map(Movement::try_from).transpose().map_err(db)
}

async fn set_state(conn: &mut PgConnection, movement_id: MovementId, state: MovementState) -> Result<(), DbError> {
    sqlx::query("UPDATE movements SET state = $2 WHERE id = $1")
        .bind(movement_id.into_inner())
        .bind(state.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Insert a report unless one already exists for its movement and role.
async fn insert_report(conn: &mut PgConnection, report: &BattleReport) -> Result<(), DbError> {
    sqlx::query(
        r"INSERT INTO battle_reports
          (id, movement_id, recipient_id, role, kind, origin_id, destination_id, outcome,
           attacker_power, defender_power, attacker_casualties, defender_casualties, loot,
           created_at, read)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
          ON CONFLICT (movement_id, role) DO NOTHING",
    )
    .bind(report.id.into_inner())
    .bind(report.movement_id.into_inner())
    .bind(report.recipient_id.into_inner())
    .bind(report.role.as_str())
    .bind(report.kind.as_str())
    .bind(report.origin_id.into_inner())
    .bind(report.destination_id.into_inner())
    .bind(report.outcome.map(BattleOutcome::as_str))
    .bind(i64::try_from(report.attacker_power).unwrap_or(i64::MAX))
    .bind(i64::try_from(report.defender_power).unwrap_or(i64::MAX))
    .bind(Json(&report.attacker_casualties))
    .bind(Json(&report.defender_casualties))
    .bind(Json(&report.loot))
    .bind(report.created_at)
    .bind(report.read)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// =============================================================================
// Rows
// =============================================================================

fn decode<T>(column: &str, value: &str, parse: fn(&str) -> Option<T>) -> Result<T, DbError> {
    parse(value).ok_or_else(|| DbError::Corrupt(format!("unrecognised {column} {value:?}")))
}

/// A row from the `villages` table.
#[derive(Debug, sqlx::FromRow)]
struct VillageRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    x: i32,
    y: i32,
    buildings: Json<BTreeMap<BuildingType, u8>>,
    troops: Json<TroopCounts>,
    wood: Decimal,
    clay: Decimal,
    iron: Decimal,
    crop: Decimal,
    last_updated: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<VillageRow> for Village {
    fn from(row: VillageRow) -> Self {
        let amounts = ResourceAmounts {
            wood: row.wood,
            clay: row.clay,
            iron: row.iron,
            crop: row.crop,
        };
        Self {
            id: row.id.into(),
            owner_id: row.owner_id.into(),
            name: row.name,
            x: row.x,
            y: row.y,
            buildings: row.buildings.0,
            troops: row.troops.0,
            stockpile: Stockpile::new(amounts, row.last_updated),
            created_at: row.created_at,
        }
    }
}

/// A row from the `movements` table.
#[derive(Debug, sqlx::FromRow)]
struct MovementRow {
    id: Uuid,
    origin_id: Uuid,
    destination_id: Uuid,
    kind: String,
    troops: Json<TroopCounts>,
    departure_time: DateTime<Utc>,
    arrival_time: DateTime<Utc>,
    return_time: Option<DateTime<Utc>>,
    state: String,
    outcome: Option<String>,
    survivors: Option<Json<TroopCounts>>,
    loot: Option<Json<ResourceAmounts>>,
}

impl TryFrom<MovementRow> for Movement {
    type Error = DbError;

    fn try_from(row: MovementRow) -> Result<Self, DbError> {
        Ok(Self {
            id: row.id.into(),
            origin_id: row.origin_id.into(),
            destination_id: row.destination_id.into(),
            kind: decode("movement kind", &row.kind, MovementKind::parse)?,
            troops: row.troops.0,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            return_time: row.return_time,
            state: decode("movement state", &row.state, MovementState::parse)?,
            outcome: row
                .outcome
                .as_deref()
                .map(|o| decode("battle outcome", o, BattleOutcome::parse))
                .transpose()?,
            survivors: row.survivors.map(|s| s.0),
            loot: row.loot.map(|l| l.0),
        })
    }
}

/// A row from the `battle_reports` table.
#[derive(Debug, sqlx::FromRow)]
struct ReportRow {
    id: Uuid,
    movement_id: Uuid,
    recipient_id: Uuid,
    role: String,
    kind: String,
    origin_id: Uuid,
    destination_id: Uuid,
    outcome: Option<String>,
    attacker_power: i64,
    defender_power: i64,
    attacker_casualties: Json<TroopCounts>,
    defender_casualties: Json<TroopCounts>,
    loot: Json<ResourceAmounts>,
    created_at: DateTime<Utc>,
    read: bool,
}

impl TryFrom<ReportRow> for BattleReport {
    type Error = DbError;

    fn try_from(row: ReportRow) -> Result<Self, DbError> {
        let power = |value: i64| {
            u64::try_from(value).map_err(|err| DbError::Corrupt(format!("power {value}: {err}")))
        };
        Ok(Self {
            id: row.id.into(),
            movement_id: row.movement_id.into(),
            recipient_id: row.recipient_id.into(),
            role: decode("report role", &row.role, ReportRole::parse)?,
            kind: decode("movement kind", &row.kind, MovementKind::parse)?,
            origin_id: row.origin_id.into(),
            destination_id: row.destination_id.into(),
            outcome: row
                .outcome
                .as_deref()
                .map(|o| decode("battle outcome", o, BattleOutcome::parse))
                .transpose()?,
            attacker_power: power(row.attacker_power)?,
            defender_power: power(row.defender_power)?,
            attacker_casualties: row.attacker_casualties.0,
            defender_casualties: row.defender_casualties.0,
            loot: row.loot.0,
            created_at: row.created_at,
            read: row.read,
        })
    }
}
