//! Persistent world state behind a single trait.
//!
//! [`WorldStore`] is the only way the core reads or writes villages,
//! movements and battle reports. Each method is one atomic operation:
//!
//! - Village mutations are read-modify-write closures. The store loads the
//!   record under a row lock, hands a copy to the closure, and persists the
//!   copy only if the closure returns `Ok`.
//! - Movement state changes are conditional on the state the caller
//!   expects. A losing conditional update returns `false` and changes
//!   nothing.
//! - Multi-record steps (dispatch, resolution commit, return, cancel) touch
//!   every record they need in one transaction.
//!
//! No method takes a lock over a whole table.
//!
//! [`MemoryStore`] backs tests and embedding; the `marchland-db` crate
//! provides the `PostgreSQL` implementation.

mod memory;

pub use memory::MemoryStore;

use core::future::Future;

use chrono::{DateTime, Utc};
use marchland_types::{
    BattleReport, Movement, MovementId, MovementResolution, MovementState, PlayerId, ReportId,
    Village, VillageId,
};

use crate::error::StoreError;

/// Everything a resolution step writes besides the two villages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionCommit {
    /// Fields set on the movement as it becomes `Completed`.
    pub resolution: MovementResolution,
    /// One report per recipient role.
    pub reports: Vec<BattleReport>,
}

/// Atomic access to villages, movements and reports.
pub trait WorldStore: Send + Sync + 'static {
    // -----------------------------------------------------------------------
    // Villages
    // -----------------------------------------------------------------------

    /// Fetch a village as stored. Never accrues.
    fn get_village(
        &self,
        village_id: VillageId,
    ) -> impl Future<Output = Result<Option<Village>, StoreError>> + Send;

    /// Insert a new village.
    ///
    /// Fails with [`StoreError::CoordinatesTaken`] if another village
    /// already sits at the same coordinates.
    fn insert_village(&self, village: &Village) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Atomically read-modify-write one village.
    ///
    /// `f` receives a copy of the stored village. If it returns `Ok` the copy
    /// is persisted (except identity and coordinates, which never change);
    /// if it returns `Err` nothing is written.
    fn update_village<T, E, F>(
        &self,
        village_id: VillageId,
        f: F,
    ) -> impl Future<Output = Result<T, E>> + Send
    where
        T: Send,
        E: From<StoreError> + Send,
        F: FnOnce(&mut Village) -> Result<T, E> + Send;

    /// Villages whose stockpile was last accrued before `before`, oldest
    /// first.
    fn stale_villages(
        &self,
        before: DateTime<Utc>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<VillageId>, StoreError>> + Send;

    // -----------------------------------------------------------------------
    // Movements
    // -----------------------------------------------------------------------

    /// Atomically update the origin village and insert the movement `f`
    /// builds from it. Nothing is written if `f` fails.
    fn dispatch<E, F>(
        &self,
        origin_id: VillageId,
        f: F,
    ) -> impl Future<Output = Result<Movement, E>> + Send
    where
        E: From<StoreError> + Send,
        F: FnOnce(&mut Village) -> Result<Movement, E> + Send;

    /// Fetch a movement.
    fn get_movement(
        &self,
        movement_id: MovementId,
    ) -> impl Future<Output = Result<Option<Movement>, StoreError>> + Send;

    /// Movements leaving from or heading to a village, by departure time.
    fn movements_for_village(
        &self,
        village_id: VillageId,
    ) -> impl Future<Output = Result<Vec<Movement>, StoreError>> + Send;

    /// `Pending` movements with `arrival_time <= now`, earliest first.
    fn due_arrivals(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Movement>, StoreError>> + Send;

    /// `Completed` movements with `return_time <= now`, earliest first.
    fn due_returns(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Movement>, StoreError>> + Send;

    /// Movements currently in `state`.
    fn movements_in_state(
        &self,
        state: MovementState,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Movement>, StoreError>> + Send;

    /// Move a movement from `from` to `to` if and only if it is in `from`.
    ///
    /// Returns whether this call made the change.
    fn claim_movement(
        &self,
        movement_id: MovementId,
        from: MovementState,
        to: MovementState,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Finish the resolution of a claimed movement in one transaction.
    ///
    /// The movement must be `Resolving`. `f` receives copies of the origin
    /// and destination villages. On `Ok` the store persists both villages,
    /// writes the resolution onto the movement, moves it to `Completed`,
    /// and inserts the reports (a report whose movement and role already
    /// exist is skipped). On `Err` nothing is written and the movement
    /// stays `Resolving`.
    fn commit_resolution<E, F>(
        &self,
        movement: &Movement,
        f: F,
    ) -> impl Future<Output = Result<ResolutionCommit, E>> + Send
    where
        E: From<StoreError> + Send,
        F: FnOnce(&mut Village, &mut Village) -> Result<ResolutionCommit, E> + Send;

    /// If the movement is `Completed`, add its survivors to the origin
    /// garrison and mark it `Returned`.
    ///
    /// Returns whether this call made the change.
    fn complete_return(
        &self,
        movement_id: MovementId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// If the movement is `Pending`, give its troops back to the origin
    /// garrison and mark it `Canceled`.
    ///
    /// Returns whether this call made the change.
    fn cancel_movement(
        &self,
        movement_id: MovementId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    // -----------------------------------------------------------------------
    // Reports
    // -----------------------------------------------------------------------

    /// A player's reports, newest first.
    fn reports_for(
        &self,
        player_id: PlayerId,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<BattleReport>, StoreError>> + Send;

    /// All reports filed for a movement.
    fn reports_for_movement(
        &self,
        movement_id: MovementId,
    ) -> impl Future<Output = Result<Vec<BattleReport>, StoreError>> + Send;

    /// Flag a report as read if `player_id` is its recipient.
    ///
    /// Returns whether such a report exists.
    fn mark_report_read(
        &self,
        report_id: ReportId,
        player_id: PlayerId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}
