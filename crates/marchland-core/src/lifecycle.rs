//! Movement lifecycle: dispatch, resolution, return and cancellation.
//!
//! ```text
//! Pending -> Resolving -> Completed -> Returned
//!    |
//!    +-> Canceled
//! ```
//!
//! Every transition is a single conditional store update, so a movement
//! can be claimed for resolution exactly once and a cancel racing a claim
//! is decided by whichever update lands first. When the resolution commit
//! is rolled back by a store failure the claim is handed back and the
//! movement is `Pending` again. A movement that fails in the rules or on a
//! missing record after its claim stays `Resolving` for an operator to
//! inspect.

use chrono::{DateTime, Utc};
use marchland_rules::accrual::{accrue_village, village_capacity};
use marchland_rules::loot::{calculate_loot, deposit, headroom, withdraw};
use marchland_rules::travel::force_travel_time;
use marchland_rules::{BattleResult, resolve_battle};
use marchland_types::{
    BattleOutcome, BattleReport, IncomingMovementNotice, Movement, MovementId, MovementKind,
    MovementResolution, MovementState, Notification, PlayerId, ReportId, ReportNotice, ReportRole,
    ResourceAmounts, TroopCounts, TroopType, Village, VillageId,
};
use tracing::{debug, error, info, warn};

use crate::error::{MovementError, StoreError, ValidationError};
use crate::notify::NotificationDispatcher;
use crate::store::{ResolutionCommit, WorldStore};
use crate::world::World;

/// A player's request to send troops from one village to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    /// Player issuing the order. Must own the origin village.
    pub player_id: PlayerId,
    /// Sending village.
    pub origin_id: VillageId,
    /// Target village.
    pub destination_id: VillageId,
    /// What the force does on arrival.
    pub kind: MovementKind,
    /// Units to send. Duplicate types are summed.
    pub troops: Vec<(TroopType, u32)>,
}

/// What a successful dispatch hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReceipt {
    /// The new movement.
    pub movement_id: MovementId,
    /// When it will arrive.
    pub arrival_time: DateTime<Utc>,
}

impl<S: WorldStore, N: NotificationDispatcher> World<S, N> {
    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Create a movement.
    ///
    /// The origin is accrual-refreshed, checked, debited and the movement
    /// inserted in one atomic store write. On success the destination's
    /// owner is told a force is coming.
    ///
    /// # Errors
    ///
    /// [`MovementError::Validation`] for an empty or unknown composition,
    /// an unknown village, a self-targeted dispatch, a player who does not
    /// own the origin, or more troops than the origin holds. Nothing is
    /// written in those cases. [`MovementError::Store`] if the store fails.
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchReceipt, MovementError> {
        let DispatchRequest {
            player_id,
            origin_id,
            destination_id,
            kind,
            troops,
        } = request;

        let troops: TroopCounts = troops.into_iter().collect();
        if troops.is_empty() {
            return Err(ValidationError::InvalidComposition.into());
        }
        if origin_id == destination_id {
            return Err(ValidationError::SameVillage { village_id: origin_id }.into());
        }
        if let Some(unknown) = troops.types().find(|t| !self.config.combat.troops.contains(t)) {
            return Err(ValidationError::UnknownTroopType {
                troop_type: unknown.clone(),
            }
            .into());
        }
        let destination = self.store.get_village(destination_id).await?.ok_or(
            ValidationError::UnknownVillage {
                village_id: destination_id,
            },
        )?;

        let guard = self.locks.lock(origin_id).await;
        let now = self.clock.now();
        let config = &self.config;
        let movement = self
            .store
            .dispatch(origin_id, |origin: &mut Village| -> Result<Movement, MovementError> {
                if origin.owner_id != player_id {
                    return Err(ValidationError::NotOwner {
                        player_id,
                        village_id: origin_id,
                    }
                    .into());
                }
                accrue_village(origin, &config.economy, now)?;
                if let Some(short) = origin.troops.shortfall(&troops) {
                    return Err(ValidationError::InsufficientForces {
                        troop_type: short.troop_type,
                        requested: short.requested,
                        available: short.available,
                    }
                    .into());
                }
                let travel = force_travel_time(
                    &troops,
                    &config.combat.troops,
                    origin.coordinates(),
                    destination.coordinates(),
                )
                .map_err(ValidationError::from)?;
                let arrival_time = now
                    .checked_add_signed(travel)
                    .ok_or(ValidationError::InvalidComposition)?;

                origin.troops.subtract(&troops);
                Ok(Movement {
                    id: MovementId::new(),
                    origin_id,
                    destination_id,
                    kind,
                    troops,
                    departure_time: now,
                    arrival_time,
                    return_time: None,
                    state: MovementState::Pending,
                    outcome: None,
                    survivors: None,
                    loot: None,
                })
            })
            .await
            .map_err(|err| match err {
                MovementError::Store {
                    source: StoreError::VillageNotFound { village_id },
                } => ValidationError::UnknownVillage { village_id }.into(),
                other => other,
            })?;
        drop(guard);

        info!(
            movement_id = %movement.id,
            %origin_id,
            %destination_id,
            kind = kind.as_str(),
            units = movement.troops.total(),
            arrival_time = %movement.arrival_time,
            "Movement dispatched"
        );

        self.notify(Notification::IncomingMovement(IncomingMovementNotice {
            movement_id: movement.id,
            recipient_id: destination.owner_id,
            kind,
            origin_id,
            destination_id,
            arrival_time: movement.arrival_time,
        }))
        .await;

        Ok(DispatchReceipt {
            movement_id: movement.id,
            arrival_time: movement.arrival_time,
        })
    }

    // -----------------------------------------------------------------------
    // Resolve
    // -----------------------------------------------------------------------

    /// Resolve an arrived movement and file its reports.
    ///
    /// The movement is claimed (`Pending -> Resolving`) first; only the
    /// caller that wins the claim goes on to resolve it. Both villages are
    /// accrued to the current instant before combat and loot.
    ///
    /// # Errors
    ///
    /// - [`MovementError::Validation`] if the movement does not exist.
    /// - [`MovementError::NotDue`] before the arrival instant.
    /// - [`MovementError::Conflict`] if the movement is not `Pending` or
    ///   another caller claimed it first. Nothing was changed.
    /// - [`MovementError::Store`] if the store failed before the commit
    ///   landed. The claim is handed back, so the movement is `Pending`
    ///   again and the next pass retries it.
    /// - [`MovementError::Resolution`] if the rules or a missing record
    ///   failed after the claim. The movement is left `Resolving`.
    pub async fn resolve(&self, movement_id: MovementId) -> Result<Vec<BattleReport>, MovementError> {
        let movement = self.load_movement(movement_id).await?;
        let now = self.clock.now();
        if movement.state != MovementState::Pending {
            return Err(MovementError::Conflict { movement_id });
        }
        if movement.arrival_time > now {
            return Err(MovementError::NotDue { movement_id });
        }

        let guard = self
            .locks
            .lock_pair(movement.origin_id, movement.destination_id)
            .await;
        let claimed = self
            .store
            .claim_movement(movement_id, MovementState::Pending, MovementState::Resolving)
            .await?;
        if !claimed {
            debug!(%movement_id, "Lost resolution claim");
            return Err(MovementError::Conflict { movement_id });
        }

        let committed = self
            .store
            .commit_resolution(&movement, |origin: &mut Village, destination: &mut Village| {
                self.settle(&movement, origin, destination, now)
            })
            .await;

        let commit = match committed {
            Ok(commit) => commit,
            Err(MovementError::Store {
                source: source @ StoreError::Backend { .. },
            }) => return Err(self.release_claim(movement_id, source).await),
            Err(err) => {
                error!(
                    %movement_id,
                    origin_id = %movement.origin_id,
                    destination_id = %movement.destination_id,
                    kind = movement.kind.as_str(),
                    error = %err,
                    "Resolution failed; movement left in Resolving for manual reprocessing"
                );
                return Err(MovementError::Resolution {
                    movement_id,
                    reason: err.to_string(),
                });
            }
        };
        drop(guard);

        info!(
            %movement_id,
            kind = movement.kind.as_str(),
            outcome = commit.resolution.outcome.map_or("none", BattleOutcome::as_str),
            survivors = commit.resolution.survivors.total(),
            "Movement resolved"
        );

        for report in &commit.reports {
            self.notify(Notification::BattleReport(ReportNotice::from(report)))
                .await;
        }
        Ok(commit.reports)
    }

    /// Put a claimed movement back to `Pending` after its commit was
    /// rolled back. A commit that landed despite the error has already
    /// moved the movement on, and the conditional claim leaves it alone.
    async fn release_claim(&self, movement_id: MovementId, source: StoreError) -> MovementError {
        match self
            .store
            .claim_movement(movement_id, MovementState::Resolving, MovementState::Pending)
            .await
        {
            Ok(true) => warn!(
                %movement_id,
                error = %source,
                "Resolution commit failed; claim released for retry"
            ),
            Ok(false) => warn!(
                %movement_id,
                error = %source,
                "Resolution commit failed after the movement moved on"
            ),
            Err(release) => error!(
                %movement_id,
                error = %source,
                release_error = %release,
                "Resolution commit failed and the claim could not be released; movement left in Resolving"
            ),
        }
        MovementError::Store { source }
    }

    /// Apply a resolution to copies of both villages and describe it.
    fn settle(
        &self,
        movement: &Movement,
        origin: &mut Village,
        destination: &mut Village,
        now: DateTime<Utc>,
    ) -> Result<ResolutionCommit, MovementError> {
        let economy = &self.config.economy;
        accrue_village(origin, economy, now)?;
        accrue_village(destination, economy, now)?;

        if !movement.kind.is_hostile() {
            destination.troops.add(&movement.troops);
            let resolution = MovementResolution {
                outcome: None,
                survivors: movement.troops.clone(),
                loot: None,
                return_time: None,
            };
            let reports = file_reports(movement, origin, destination, None, ResourceAmounts::ZERO, now);
            return Ok(ResolutionCommit { resolution, reports });
        }

        let combat = &self.config.combat;
        let battle = resolve_battle(movement.kind, &movement.troops, &destination.troops, combat)?;
        destination.troops.clone_from(&battle.defender_survivors);

        let loot = if battle.outcome == BattleOutcome::Victory {
            let capacity = village_capacity(&origin.buildings, economy)?;
            let room = headroom(&origin.stockpile.amounts, &capacity);
            let taken = calculate_loot(&destination.stockpile.amounts, combat.loot_fraction, Some(&room));
            withdraw(&mut destination.stockpile.amounts, &taken);
            deposit(&mut origin.stockpile.amounts, &taken, &capacity);
            Some(taken)
        } else {
            None
        };

        let return_time = if battle.attacker_survivors.is_empty() {
            None
        } else {
            let back = movement
                .arrival_time
                .checked_add_signed(movement.travel_duration())
                .ok_or(MovementError::Resolution {
                    movement_id: movement.id,
                    reason: "return time out of range".to_owned(),
                })?;
            Some(back)
        };

        let reports = file_reports(
            movement,
            origin,
            destination,
            Some(&battle),
            loot.unwrap_or(ResourceAmounts::ZERO),
            now,
        );
        Ok(ResolutionCommit {
            resolution: MovementResolution {
                outcome: Some(battle.outcome),
                survivors: battle.attacker_survivors,
                loot,
                return_time,
            },
            reports,
        })
    }

    // -----------------------------------------------------------------------
    // Return
    // -----------------------------------------------------------------------

    /// Bring a resolved movement's survivors home.
    ///
    /// # Errors
    ///
    /// - [`MovementError::Validation`] if the movement does not exist.
    /// - [`MovementError::NotDue`] if it has no return trip or its return
    ///   instant has not been reached.
    /// - [`MovementError::Conflict`] if it is not `Completed` (already
    ///   returned, or never resolved).
    /// - [`MovementError::Store`] if the store fails; the movement stays
    ///   `Completed` and can be retried.
    pub async fn return_home(&self, movement_id: MovementId) -> Result<TroopCounts, MovementError> {
        let movement = self.load_movement(movement_id).await?;
        if movement.state != MovementState::Completed {
            return Err(MovementError::Conflict { movement_id });
        }
        let due = movement
            .return_time
            .is_some_and(|at| at <= self.clock.now());
        if !due {
            return Err(MovementError::NotDue { movement_id });
        }

        let _guard = self.locks.lock(movement.origin_id).await;
        if !self.store.complete_return(movement_id).await? {
            return Err(MovementError::Conflict { movement_id });
        }
        let survivors = movement.survivors.unwrap_or_default();
        info!(
            %movement_id,
            origin_id = %movement.origin_id,
            units = survivors.total(),
            "Survivors returned home"
        );
        Ok(survivors)
    }

    // -----------------------------------------------------------------------
    // Cancel
    // -----------------------------------------------------------------------

    /// Recall a movement that has not been resolved.
    ///
    /// # Errors
    ///
    /// [`MovementError::Validation`] if the movement or its origin does not
    /// exist, the player does not own the origin, or the movement is no
    /// longer `Pending` (including losing a race with a resolution claim).
    pub async fn cancel(&self, player_id: PlayerId, movement_id: MovementId) -> Result<(), MovementError> {
        let movement = self.load_movement(movement_id).await?;
        let origin = self
            .store
            .get_village(movement.origin_id)
            .await?
            .ok_or(ValidationError::UnknownVillage {
                village_id: movement.origin_id,
            })?;
        if origin.owner_id != player_id {
            return Err(ValidationError::NotOwner {
                player_id,
                village_id: origin.id,
            }
            .into());
        }
        if movement.state != MovementState::Pending {
            return Err(ValidationError::NotCancelable {
                movement_id,
                state: movement.state,
            }
            .into());
        }

        let _guard = self.locks.lock(movement.origin_id).await;
        if !self.store.cancel_movement(movement_id).await? {
            let state = self
                .store
                .get_movement(movement_id)
                .await?
                .map_or(MovementState::Resolving, |m| m.state);
            return Err(ValidationError::NotCancelable { movement_id, state }.into());
        }
        info!(
            %movement_id,
            origin_id = %movement.origin_id,
            units = movement.troops.total(),
            "Movement canceled"
        );
        Ok(())
    }

    async fn load_movement(&self, movement_id: MovementId) -> Result<Movement, MovementError> {
        self.store
            .get_movement(movement_id)
            .await?
            .ok_or_else(|| ValidationError::UnknownMovement { movement_id }.into())
    }
}

/// One report per participant role.
fn file_reports(
    movement: &Movement,
    origin: &Village,
    destination: &Village,
    battle: Option<&BattleResult>,
    loot: ResourceAmounts,
    now: DateTime<Utc>,
) -> Vec<BattleReport> {
    [
        (origin.owner_id, ReportRole::Attacker),
        (destination.owner_id, ReportRole::Defender),
    ]
    .into_iter()
    .map(|(recipient_id, role)| BattleReport {
        id: ReportId::new(),
        movement_id: movement.id,
        recipient_id,
        role,
        kind: movement.kind,
        origin_id: movement.origin_id,
        destination_id: movement.destination_id,
        outcome: battle.map(|b| b.outcome),
        attacker_power: battle.map_or(0, |b| b.attacker_power),
        defender_power: battle.map_or(0, |b| b.defender_power),
        attacker_casualties: battle.map(|b| b.attacker_casualties.clone()).unwrap_or_default(),
        defender_casualties: battle.map(|b| b.defender_casualties.clone()).unwrap_or_default(),
        loot: loot.floored(),
        created_at: now,
        read: false,
    })
    .collect()
}
