//! Periodic background passes over movements and villages.
//!
//! Two schedulers run as independent tasks:
//!
//! - [`ResolutionScheduler`] resolves `Pending` movements whose arrival has
//!   elapsed, then brings home `Completed` movements whose return has
//!   elapsed. It also warns about every movement stuck in `Resolving`.
//! - [`ResourceTickScheduler`] re-accrues villages whose stockpile was last
//!   refreshed longer ago than the tick interval.
//!
//! Records in a pass are processed with bounded parallelism. A failure on
//! one record is logged and counted; it never aborts the pass. Only a
//! failure to list the records aborts, and the next interval tries again.

use core::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::StreamExt as _;
use futures::stream;
use marchland_types::{MovementId, VillageId};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::control::SchedulerControl;
use crate::error::{MovementError, StoreError};
use crate::notify::NotificationDispatcher;
use crate::store::WorldStore;
use crate::world::World;

/// How one record fared within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Done,
    Skipped,
    Failed,
}

fn tally(steps: &[Step], wanted: Step) -> usize {
    steps.iter().filter(|step| **step == wanted).count()
}

/// Counts from one resolution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionSummary {
    /// Movements resolved.
    pub resolved: usize,
    /// Movements whose survivors arrived home.
    pub returned: usize,
    /// Records another step got to first.
    pub skipped: usize,
    /// Records that failed and were left for the next pass or an operator.
    pub failed: usize,
    /// Movements sitting in `Resolving` when the pass started.
    pub stuck: usize,
}

impl ResolutionSummary {
    /// Whether the pass touched nothing.
    pub const fn is_idle(&self) -> bool {
        self.resolved == 0 && self.returned == 0 && self.skipped == 0 && self.failed == 0
    }
}

/// Counts from one resource tick pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    /// Villages accrued.
    pub refreshed: usize,
    /// Villages that could not be accrued.
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolves arrivals and completes returns on a fixed interval.
#[derive(Debug)]
pub struct ResolutionScheduler<S, N> {
    world: World<S, N>,
    control: Arc<SchedulerControl>,
}

impl<S: WorldStore, N: NotificationDispatcher> ResolutionScheduler<S, N> {
    /// A scheduler over `world`, steered by `control`.
    pub const fn new(world: World<S, N>, control: Arc<SchedulerControl>) -> Self {
        Self { world, control }
    }

    /// Run one pass now.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the due records cannot be listed.
    pub async fn run_pass(&self) -> Result<ResolutionSummary, StoreError> {
        let schedulers = &self.world.config.schedulers;
        let concurrency = schedulers.max_concurrency.max(1);

        let stuck = self.world.stuck_movements(schedulers.batch_size).await?;
        for movement in &stuck {
            warn!(
                movement_id = %movement.id,
                origin_id = %movement.origin_id,
                destination_id = %movement.destination_id,
                arrival_time = %movement.arrival_time,
                "Movement stuck in Resolving; needs manual reprocessing"
            );
        }

        let arrivals = self
            .world
            .store
            .due_arrivals(self.world.clock.now(), schedulers.batch_size)
            .await?;
        let arrived: Vec<Step> = stream::iter(arrivals)
            .map(|movement| self.resolve_one(movement.id))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let returns = self
            .world
            .store
            .due_returns(self.world.clock.now(), schedulers.batch_size)
            .await?;
        let came_home: Vec<Step> = stream::iter(returns)
            .map(|movement| self.return_one(movement.id))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        Ok(ResolutionSummary {
            resolved: tally(&arrived, Step::Done),
            returned: tally(&came_home, Step::Done),
            skipped: tally(&arrived, Step::Skipped).saturating_add(tally(&came_home, Step::Skipped)),
            failed: tally(&arrived, Step::Failed).saturating_add(tally(&came_home, Step::Failed)),
            stuck: stuck.len(),
        })
    }

    async fn resolve_one(&self, movement_id: MovementId) -> Step {
        match self.world.resolve(movement_id).await {
            Ok(_) => Step::Done,
            Err(MovementError::Conflict { .. } | MovementError::NotDue { .. }) => {
                debug!(%movement_id, "Resolution skipped");
                Step::Skipped
            }
            // Already logged with full context.
            Err(MovementError::Resolution { .. }) => Step::Failed,
            Err(err) => {
                warn!(%movement_id, error = %err, "Resolution attempt failed; retrying next pass");
                Step::Failed
            }
        }
    }

    async fn return_one(&self, movement_id: MovementId) -> Step {
        match self.world.return_home(movement_id).await {
            Ok(_) => Step::Done,
            Err(MovementError::Conflict { .. } | MovementError::NotDue { .. }) => {
                debug!(%movement_id, "Return skipped");
                Step::Skipped
            }
            Err(err) => {
                warn!(%movement_id, error = %err, "Return failed; retrying next pass");
                Step::Failed
            }
        }
    }

    /// Run passes until a stop is requested.
    pub async fn run(self) {
        let period = self.world.config.schedulers.resolution_interval();
        let this = &self;
        run_periodic("resolution", period, &self.control, || async move {
            match this.run_pass().await {
                Ok(summary) if summary.is_idle() && summary.stuck == 0 => {
                    debug!("Resolution pass idle");
                }
                Ok(summary) => info!(
                    resolved = summary.resolved,
                    returned = summary.returned,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    stuck = summary.stuck,
                    "Resolution pass complete"
                ),
                Err(err) => warn!(error = %err, "Resolution pass aborted"),
            }
        })
        .await;
    }
}

// ---------------------------------------------------------------------------
// Resource tick
// ---------------------------------------------------------------------------

/// Re-accrues stale villages on a fixed interval.
#[derive(Debug)]
pub struct ResourceTickScheduler<S, N> {
    world: World<S, N>,
    control: Arc<SchedulerControl>,
}

impl<S: WorldStore, N: NotificationDispatcher> ResourceTickScheduler<S, N> {
    /// A scheduler over `world`, steered by `control`.
    pub const fn new(world: World<S, N>, control: Arc<SchedulerControl>) -> Self {
        Self { world, control }
    }

    /// Run one pass now.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the stale villages cannot be listed.
    pub async fn run_pass(&self) -> Result<TickSummary, StoreError> {
        let schedulers = &self.world.config.schedulers;
        let now = self.world.clock.now();
        let before = stale_before(now, schedulers.resource_tick_interval_ms);

        let stale = self.world.store.stale_villages(before, schedulers.batch_size).await?;
        let steps: Vec<Step> = stream::iter(stale)
            .map(|village_id| self.tick_one(village_id, now))
            .buffer_unordered(schedulers.max_concurrency.max(1))
            .collect()
            .await;

        Ok(TickSummary {
            refreshed: tally(&steps, Step::Done),
            failed: tally(&steps, Step::Failed),
        })
    }

    async fn tick_one(&self, village_id: VillageId, now: DateTime<Utc>) -> Step {
        match self.world.tick_village(village_id, now).await {
            Ok(()) => Step::Done,
            Err(err) => {
                warn!(%village_id, error = %err, "Resource tick failed for village");
                Step::Failed
            }
        }
    }

    /// Run passes until a stop is requested.
    pub async fn run(self) {
        let period = self.world.config.schedulers.resource_tick_interval();
        let this = &self;
        run_periodic("resource tick", period, &self.control, || async move {
            match this.run_pass().await {
                Ok(summary) => debug!(
                    refreshed = summary.refreshed,
                    failed = summary.failed,
                    "Resource tick pass complete"
                ),
                Err(err) => warn!(error = %err, "Resource tick pass aborted"),
            }
        })
        .await;
    }
}

/// Cut-off for staleness: `interval_ms` before `now`.
fn stale_before(now: DateTime<Utc>, interval_ms: u64) -> DateTime<Utc> {
    i64::try_from(interval_ms)
        .ok()
        .and_then(TimeDelta::try_milliseconds)
        .and_then(|interval| now.checked_sub_signed(interval))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Drive `pass` every `period` until `control` asks for a stop.
async fn run_periodic<F, Fut>(name: &'static str, period: Duration, control: &SchedulerControl, mut pass: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
    info!(scheduler = name, period_ms, "Scheduler started");

    loop {
        tokio::select! {
            () = control.stopped() => break,
            _ = ticker.tick() => {}
        }
        if control.is_paused() {
            info!(scheduler = name, "Scheduler paused, waiting for resume...");
            control.wait_if_paused().await;
        }
        if control.is_stop_requested() {
            break;
        }
        pass().await;
        control.record_pass();
    }

    info!(scheduler = name, passes = control.passes_completed(), "Scheduler stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn stale_cutoff_is_one_interval_back() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(stale_before(now, 60_000), now - TimeDelta::minutes(1));
    }

    #[test]
    fn stale_cutoff_saturates() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(stale_before(now, u64::MAX), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn tally_counts_matching_steps() {
        let steps = [Step::Done, Step::Failed, Step::Done, Step::Skipped];
        assert_eq!(tally(&steps, Step::Done), 2);
        assert_eq!(tally(&steps, Step::Skipped), 1);
        assert_eq!(tally(&steps, Step::Failed), 1);
    }

    #[test]
    fn idle_summary() {
        assert!(ResolutionSummary::default().is_idle());
        let busy = ResolutionSummary {
            resolved: 1,
            ..ResolutionSummary::default()
        };
        assert!(!busy.is_idle());
    }
}
