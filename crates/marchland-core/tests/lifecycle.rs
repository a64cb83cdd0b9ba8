//! End-to-end movement lifecycle against the in-memory store.
//!
//! Every test drives a [`World`] with a manual clock, so arrival and return
//! instants are reached by advancing time rather than sleeping.

#![allow(clippy::unwrap_used, clippy::panic, clippy::arithmetic_side_effects)]

use std::sync::Arc;

use chrono::{TimeDelta, TimeZone, Utc};
use marchland_core::{
    ChannelDispatcher, Clock, DispatchReceipt, DispatchRequest, GameConfig, ManualClock,
    MemoryStore, MovementError, ValidationError, World, WorldError, WorldStore,
};
use marchland_rules::{TroopCatalog, TroopStats};
use marchland_types::{
    BattleOutcome, MovementKind, MovementState, Notification, PlayerId, ReportRole, Resource,
    ResourceAmounts, TroopCounts, TroopType, Village,
};
use rust_decimal::Decimal;
use tokio::sync::mpsc;

type TestWorld = World<MemoryStore, ChannelDispatcher>;

struct Harness {
    world: TestWorld,
    clock: Arc<ManualClock>,
    notes: mpsc::Receiver<Notification>,
}

fn infantry() -> TroopType {
    TroopType::new("infantry")
}

/// Attack 2, defense 1, speed 6: the numbers used in the worked examples.
fn harness() -> Harness {
    let mut config = GameConfig::default();
    config.combat.troops = TroopCatalog::from_entries([(
        infantry(),
        TroopStats {
            attack: 2,
            defense: 1,
            speed: 6,
        },
    )]);
    let start = Utc.with_ymd_and_hms(2026, 5, 1, 6, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let (dispatcher, notes) = ChannelDispatcher::new(64);
    let world = World::new(
        Arc::new(MemoryStore::new()),
        Arc::new(dispatcher),
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::new(config),
    );
    Harness { world, clock, notes }
}

async fn village(h: &Harness, x: i32, y: i32, infantry_count: u32, stock: i64) -> Village {
    let mut village = Village::new(PlayerId::new(), format!("v{x}-{y}"), x, y, h.clock.now());
    village.troops = [(infantry(), infantry_count)].into_iter().collect();
    village.stockpile.amounts = ResourceAmounts::uniform(Decimal::from(stock));
    h.world.insert_village(village).await.unwrap()
}

fn send(from: &Village, to: &Village, kind: MovementKind, count: u32) -> DispatchRequest {
    DispatchRequest {
        player_id: from.owner_id,
        origin_id: from.id,
        destination_id: to.id,
        kind,
        troops: vec![(infantry(), count)],
    }
}

fn arrive(h: &Harness, receipt: DispatchReceipt) {
    h.clock.set(receipt.arrival_time);
}

fn validation(err: MovementError) -> ValidationError {
    match err {
        MovementError::Validation { source } => source,
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn attack_victory_takes_loot_and_returns_survivors() {
    let h = harness();
    let a = village(&h, 0, 0, 100, 0).await;
    let b = village(&h, 30, 40, 50, 1000).await;
    let departed = h.clock.now();

    let receipt = h
        .world
        .dispatch(send(&a, &b, MovementKind::Attack, 100))
        .await
        .unwrap();
    // 50 fields at 6 fields per hour.
    assert_eq!(receipt.arrival_time - departed, TimeDelta::milliseconds(30_000_000));
    let origin = h.world.village(a.id).await.unwrap();
    assert_eq!(origin.troops.get(&infantry()), 0);

    let early = h.world.resolve(receipt.movement_id).await.unwrap_err();
    assert!(matches!(early, MovementError::NotDue { .. }));

    arrive(&h, receipt);
    let reports = h.world.resolve(receipt.movement_id).await.unwrap();
    assert_eq!(reports.len(), 2);

    let movement = h.world.store().get_movement(receipt.movement_id).await.unwrap().unwrap();
    assert_eq!(movement.state, MovementState::Completed);
    assert_eq!(movement.outcome, Some(BattleOutcome::Victory));
    assert_eq!(movement.survivors.as_ref().unwrap().get(&infantry()), 75);
    assert_eq!(
        movement.return_time,
        Some(receipt.arrival_time + TimeDelta::milliseconds(30_000_000))
    );
    let loot = movement.loot.unwrap();
    for resource in Resource::ALL {
        assert_eq!(loot.get(resource), Decimal::from(300));
    }

    let defender = h.world.village(b.id).await.unwrap();
    assert_eq!(defender.troops.get(&infantry()), 0);
    assert_eq!(defender.stockpile.amounts.get(Resource::Wood), Decimal::from(700));
    let attacker = h.world.village(a.id).await.unwrap();
    assert_eq!(attacker.stockpile.amounts.get(Resource::Iron), Decimal::from(300));

    let attacker_report = reports.iter().find(|r| r.role == ReportRole::Attacker).unwrap();
    assert_eq!(attacker_report.recipient_id, a.owner_id);
    assert_eq!(attacker_report.attacker_power, 200);
    assert_eq!(attacker_report.defender_power, 50);
    assert_eq!(attacker_report.attacker_casualties.get(&infantry()), 25);
    assert_eq!(attacker_report.defender_casualties.get(&infantry()), 50);
    let defender_report = reports.iter().find(|r| r.role == ReportRole::Defender).unwrap();
    assert_eq!(defender_report.recipient_id, b.owner_id);

    h.clock.set(movement.return_time.unwrap());
    let home = h.world.return_home(receipt.movement_id).await.unwrap();
    assert_eq!(home.get(&infantry()), 75);
    let attacker = h.world.village(a.id).await.unwrap();
    assert_eq!(attacker.troops.get(&infantry()), 75);
    let movement = h.world.store().get_movement(receipt.movement_id).await.unwrap().unwrap();
    assert_eq!(movement.state, MovementState::Returned);

    let again = h.world.return_home(receipt.movement_id).await.unwrap_err();
    assert!(matches!(again, MovementError::Conflict { .. }));
}

#[tokio::test]
async fn notifications_follow_dispatch_and_resolution() {
    let mut h = harness();
    let a = village(&h, 0, 0, 10, 0).await;
    let b = village(&h, 3, 4, 1, 0).await;

    let receipt = h
        .world
        .dispatch(send(&a, &b, MovementKind::Raid, 10))
        .await
        .unwrap();
    match h.notes.recv().await.unwrap() {
        Notification::IncomingMovement(notice) => {
            assert_eq!(notice.recipient_id, b.owner_id);
            assert_eq!(notice.movement_id, receipt.movement_id);
            assert_eq!(notice.arrival_time, receipt.arrival_time);
            assert_eq!(notice.kind, MovementKind::Raid);
        }
        other => panic!("unexpected notification {other:?}"),
    }

    arrive(&h, receipt);
    h.world.resolve(receipt.movement_id).await.unwrap();
    let mut recipients = Vec::new();
    for _ in 0..2 {
        match h.notes.recv().await.unwrap() {
            Notification::BattleReport(notice) => recipients.push(notice.recipient_id),
            other => panic!("unexpected notification {other:?}"),
        }
    }
    recipients.sort();
    let mut expected = vec![a.owner_id, b.owner_id];
    expected.sort();
    assert_eq!(recipients, expected);
}

#[tokio::test]
async fn zero_troops_are_rejected_without_a_movement() {
    let h = harness();
    let a = village(&h, 0, 0, 100, 0).await;
    let b = village(&h, 1, 1, 0, 0).await;

    for troops in [vec![(infantry(), 0)], Vec::new()] {
        let request = DispatchRequest {
            troops,
            ..send(&a, &b, MovementKind::Attack, 0)
        };
        let err = h.world.dispatch(request).await.unwrap_err();
        assert_eq!(validation(err), ValidationError::InvalidComposition);
    }
    assert!(h.world.village_movements(a.id).await.unwrap().is_empty());
    assert_eq!(h.world.village(a.id).await.unwrap().troops.get(&infantry()), 100);
}

#[tokio::test]
async fn dispatch_validation_changes_nothing() {
    let h = harness();
    let a = village(&h, 0, 0, 100, 0).await;
    let b = village(&h, 5, 5, 0, 0).await;

    let err = h
        .world
        .dispatch(send(&a, &b, MovementKind::Attack, 101))
        .await
        .unwrap_err();
    assert_eq!(
        validation(err),
        ValidationError::InsufficientForces {
            troop_type: infantry(),
            requested: 101,
            available: 100,
        }
    );

    let err = h
        .world
        .dispatch(send(&a, &a, MovementKind::Attack, 1))
        .await
        .unwrap_err();
    assert_eq!(validation(err), ValidationError::SameVillage { village_id: a.id });

    let stranger = DispatchRequest {
        player_id: PlayerId::new(),
        ..send(&a, &b, MovementKind::Attack, 1)
    };
    let err = h.world.dispatch(stranger).await.unwrap_err();
    assert!(matches!(validation(err), ValidationError::NotOwner { .. }));

    let unknown_type = DispatchRequest {
        troops: vec![(TroopType::new("dragon"), 1)],
        ..send(&a, &b, MovementKind::Attack, 1)
    };
    let err = h.world.dispatch(unknown_type).await.unwrap_err();
    assert!(matches!(validation(err), ValidationError::UnknownTroopType { .. }));

    let ghost = Village::new(PlayerId::new(), "ghost", 9, 9, h.clock.now());
    let err = h
        .world
        .dispatch(send(&a, &ghost, MovementKind::Attack, 1))
        .await
        .unwrap_err();
    assert!(matches!(validation(err), ValidationError::UnknownVillage { .. }));

    assert!(h.world.village_movements(a.id).await.unwrap().is_empty());
    assert_eq!(h.world.village(a.id).await.unwrap().troops.get(&infantry()), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resolution_claims_once() {
    let h = harness();
    let a = village(&h, 0, 0, 100, 0).await;
    let b = village(&h, 30, 40, 50, 500).await;
    let receipt = h
        .world
        .dispatch(send(&a, &b, MovementKind::Attack, 100))
        .await
        .unwrap();
    arrive(&h, receipt);

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let world = h.world.clone();
            tokio::spawn(async move { world.resolve(receipt.movement_id).await })
        })
        .collect();
    let mut won = 0;
    let mut lost = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => won += 1,
            Err(MovementError::Conflict { .. }) => lost += 1,
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!((won, lost), (1, 1));
    assert_eq!(h.world.movement_reports(receipt.movement_id).await.unwrap().len(), 2);
    // Loot was taken once.
    let defender = h.world.village(b.id).await.unwrap();
    assert_eq!(defender.stockpile.amounts.get(Resource::Clay), Decimal::from(350));
}

#[tokio::test]
async fn cancel_restores_exactly_what_was_sent() {
    let h = harness();
    let a = village(&h, 0, 0, 40, 0).await;
    let b = village(&h, 2, 2, 0, 0).await;
    let receipt = h
        .world
        .dispatch(send(&a, &b, MovementKind::Attack, 15))
        .await
        .unwrap();
    assert_eq!(h.world.village(a.id).await.unwrap().troops.get(&infantry()), 25);

    let err = h.world.cancel(b.owner_id, receipt.movement_id).await.unwrap_err();
    assert!(matches!(validation(err), ValidationError::NotOwner { .. }));

    h.world.cancel(a.owner_id, receipt.movement_id).await.unwrap();
    assert_eq!(h.world.village(a.id).await.unwrap().troops.get(&infantry()), 40);
    let movement = h.world.store().get_movement(receipt.movement_id).await.unwrap().unwrap();
    assert_eq!(movement.state, MovementState::Canceled);

    let err = h.world.cancel(a.owner_id, receipt.movement_id).await.unwrap_err();
    assert_eq!(
        validation(err),
        ValidationError::NotCancelable {
            movement_id: receipt.movement_id,
            state: MovementState::Canceled,
        }
    );
    // A canceled movement is never resolved.
    arrive(&h, receipt);
    assert!(matches!(
        h.world.resolve(receipt.movement_id).await.unwrap_err(),
        MovementError::Conflict { .. }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_racing_resolution_has_one_winner() {
    let h = harness();
    let a = village(&h, 0, 0, 30, 0).await;
    let b = village(&h, 1, 0, 0, 0).await;
    let receipt = h
        .world
        .dispatch(send(&a, &b, MovementKind::Attack, 30))
        .await
        .unwrap();
    arrive(&h, receipt);

    let resolver = {
        let world = h.world.clone();
        tokio::spawn(async move { world.resolve(receipt.movement_id).await })
    };
    let canceler = {
        let world = h.world.clone();
        let owner = a.owner_id;
        tokio::spawn(async move { world.cancel(owner, receipt.movement_id).await })
    };
    let resolved = resolver.await.unwrap().is_ok();
    let canceled = canceler.await.unwrap().is_ok();
    assert!(resolved ^ canceled);

    let movement = h.world.store().get_movement(receipt.movement_id).await.unwrap().unwrap();
    let origin = h.world.village(a.id).await.unwrap();
    if canceled {
        assert_eq!(movement.state, MovementState::Canceled);
        assert_eq!(origin.troops.get(&infantry()), 30);
        assert!(h.world.movement_reports(receipt.movement_id).await.unwrap().is_empty());
    } else {
        assert_eq!(movement.state, MovementState::Completed);
        assert_eq!(origin.troops.get(&infantry()), 0);
    }
}

#[tokio::test]
async fn reinforcements_join_the_garrison() {
    let h = harness();
    let a = village(&h, 0, 0, 20, 100).await;
    let b = village(&h, 0, 6, 5, 100).await;
    let receipt = h
        .world
        .dispatch(send(&a, &b, MovementKind::Reinforcement, 12))
        .await
        .unwrap();
    arrive(&h, receipt);

    let reports = h.world.resolve(receipt.movement_id).await.unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.outcome.is_none() && r.loot.is_zero()));

    let movement = h.world.store().get_movement(receipt.movement_id).await.unwrap().unwrap();
    assert_eq!(movement.state, MovementState::Completed);
    assert_eq!(movement.outcome, None);
    assert_eq!(movement.return_time, None);
    assert_eq!(h.world.village(b.id).await.unwrap().troops.get(&infantry()), 17);
    assert_eq!(h.world.village(a.id).await.unwrap().troops.get(&infantry()), 8);

    h.clock.advance(TimeDelta::days(30)).unwrap();
    assert!(h.world.store().due_returns(h.clock.now(), 10).await.unwrap().is_empty());
    assert!(matches!(
        h.world.return_home(receipt.movement_id).await.unwrap_err(),
        MovementError::NotDue { .. }
    ));
}

#[tokio::test]
async fn defeated_force_is_wiped_out_and_never_returns() {
    let h = harness();
    let a = village(&h, 0, 0, 10, 0).await;
    let b = village(&h, 0, 3, 50, 800).await;
    let receipt = h
        .world
        .dispatch(send(&a, &b, MovementKind::Attack, 10))
        .await
        .unwrap();
    arrive(&h, receipt);
    h.world.resolve(receipt.movement_id).await.unwrap();

    let movement = h.world.store().get_movement(receipt.movement_id).await.unwrap().unwrap();
    assert_eq!(movement.outcome, Some(BattleOutcome::Defeat));
    assert!(movement.survivors.unwrap().is_empty());
    assert_eq!(movement.return_time, None);
    assert_eq!(movement.loot, None);

    let defender = h.world.village(b.id).await.unwrap();
    // 20 attack against 50 defense: the defender loses 20 of 50.
    assert_eq!(defender.troops.get(&infantry()), 30);
    assert_eq!(defender.stockpile.amounts.get(Resource::Crop), Decimal::from(800));
}

#[tokio::test]
async fn failed_resolution_is_left_resolving() {
    let h = harness();
    let a = village(&h, 0, 0, 10, 0).await;
    let mut odd = Village::new(PlayerId::new(), "odd", 4, 0, h.clock.now());
    odd.troops = TroopCounts::from_iter([(TroopType::new("golem"), 3)]);
    let odd = h.world.insert_village(odd).await.unwrap();

    let receipt = h
        .world
        .dispatch(send(&a, &odd, MovementKind::Attack, 10))
        .await
        .unwrap();
    arrive(&h, receipt);

    let err = h.world.resolve(receipt.movement_id).await.unwrap_err();
    assert!(matches!(err, MovementError::Resolution { .. }));

    let movement = h.world.store().get_movement(receipt.movement_id).await.unwrap().unwrap();
    assert_eq!(movement.state, MovementState::Resolving);
    assert!(h.world.movement_reports(receipt.movement_id).await.unwrap().is_empty());
    let stuck = h.world.stuck_movements(10).await.unwrap();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck.first().unwrap().id, receipt.movement_id);

    // Not retried automatically and not cancelable.
    assert!(matches!(
        h.world.resolve(receipt.movement_id).await.unwrap_err(),
        MovementError::Conflict { .. }
    ));
    assert!(matches!(
        validation(h.world.cancel(a.owner_id, receipt.movement_id).await.unwrap_err()),
        ValidationError::NotCancelable { .. }
    ));
}

#[tokio::test]
async fn inbox_is_private_and_newest_first() {
    let h = harness();
    let a = village(&h, 0, 0, 50, 0).await;
    let b = village(&h, 0, 1, 0, 0).await;

    let first = h
        .world
        .dispatch(send(&a, &b, MovementKind::Attack, 10))
        .await
        .unwrap();
    let second = h
        .world
        .dispatch(send(&a, &b, MovementKind::Attack, 10))
        .await
        .unwrap();
    arrive(&h, first);
    h.world.resolve(first.movement_id).await.unwrap();
    h.clock.advance(TimeDelta::minutes(5)).unwrap();
    h.world.resolve(second.movement_id).await.unwrap();

    let inbox = h.world.inbox(a.owner_id, 10).await.unwrap();
    assert_eq!(inbox.len(), 2);
    assert_eq!(inbox.first().unwrap().movement_id, second.movement_id);
    assert!(inbox.iter().all(|r| r.recipient_id == a.owner_id && !r.read));

    let report_id = inbox.first().unwrap().id;
    let err = h.world.mark_report_read(b.owner_id, report_id).await.unwrap_err();
    assert!(matches!(
        err,
        WorldError::Validation {
            source: ValidationError::UnknownReport { .. }
        }
    ));
    h.world.mark_report_read(a.owner_id, report_id).await.unwrap();
    let inbox = h.world.inbox(a.owner_id, 1).await.unwrap();
    assert!(inbox.first().unwrap().read);
}
