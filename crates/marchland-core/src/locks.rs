//! Per-village async locks inside the process.
//!
//! The store makes each write atomic; these locks additionally keep two
//! steps in this process from working on the same village at once, so a
//! losing step waits here instead of contending on storage row locks.
//! Multi-village steps always lock in [`VillageId`] order, which rules out
//! lock-order deadlocks between them.

use std::collections::HashMap;
use std::sync::Arc;

use marchland_types::VillageId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Number of tracked villages above which idle entries are dropped.
const PRUNE_THRESHOLD: usize = 4096;

/// Lazily created lock per village.
#[derive(Debug, Default)]
pub struct VillageLocks {
    slots: Mutex<HashMap<VillageId, Arc<Mutex<()>>>>,
}

/// Holds one or more village locks until dropped.
#[derive(Debug)]
#[must_use = "the villages are unlocked as soon as the guard is dropped"]
pub struct VillageGuard {
    _held: Vec<OwnedMutexGuard<()>>,
}

impl VillageLocks {
    /// An empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock one village.
    pub async fn lock(&self, village_id: VillageId) -> VillageGuard {
        self.lock_all(vec![village_id]).await
    }

    /// Lock two villages in identity order. Locking the same village twice
    /// takes its lock once.
    pub async fn lock_pair(&self, a: VillageId, b: VillageId) -> VillageGuard {
        self.lock_all(vec![a, b]).await
    }

    async fn lock_all(&self, mut ids: Vec<VillageId>) -> VillageGuard {
        ids.sort_unstable();
        ids.dedup();
        let slots: Vec<Arc<Mutex<()>>> = {
            let mut table = self.slots.lock().await;
            if table.len() > PRUNE_THRESHOLD {
                table.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            ids.iter()
                .map(|id| Arc::clone(table.entry(*id).or_default()))
                .collect()
        };
        let mut held = Vec::with_capacity(slots.len());
        for slot in slots {
            held.push(slot.lock_owned().await);
        }
        VillageGuard { _held: held }
    }

    /// Number of villages with a lock entry.
    pub async fn tracked(&self) -> usize {
        self.slots.lock().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn second_locker_waits() {
        let locks = Arc::new(VillageLocks::new());
        let id = VillageId::new();
        let guard = locks.lock(id).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn pair_order_does_not_deadlock() {
        let locks = Arc::new(VillageLocks::new());
        let a = VillageId::new();
        let b = VillageId::new();

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let locks = Arc::clone(&locks);
                tokio::spawn(async move {
                    let (x, y) = if i % 2 == 0 { (a, b) } else { (b, a) };
                    let _guard = locks.lock_pair(x, y).await;
                    tokio::task::yield_now().await;
                })
            })
            .collect();
        for task in tasks {
            tokio::time::timeout(Duration::from_secs(1), task)
                .await
                .unwrap()
                .unwrap();
        }
        assert_eq!(locks.tracked().await, 2);
    }

    #[tokio::test]
    async fn same_village_pair_locks_once() {
        let locks = VillageLocks::new();
        let id = VillageId::new();
        let guard = locks.lock_pair(id, id).await;
        assert_eq!(guard._held.len(), 1);
    }
}
