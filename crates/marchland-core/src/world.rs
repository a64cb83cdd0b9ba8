//! The handle every player action and scheduler pass goes through.
//!
//! A [`World`] bundles the store, the clock, the loaded configuration, the
//! in-process village locks and the notification dispatcher. It is cheap
//! to clone (every field is an [`Arc`]). Its operations are split by
//! concern across [`lifecycle`](crate::lifecycle),
//! [`economy`](crate::economy) and [`reports`](crate::reports).

use std::sync::Arc;

use marchland_types::Notification;
use tracing::warn;

use crate::clock::Clock;
use crate::config::GameConfig;
use crate::locks::VillageLocks;
use crate::notify::NotificationDispatcher;
use crate::store::WorldStore;

/// Shared access to the simulated world.
#[derive(Debug)]
pub struct World<S, N> {
    pub(crate) store: Arc<S>,
    pub(crate) notifier: Arc<N>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: Arc<GameConfig>,
    pub(crate) locks: Arc<VillageLocks>,
}

impl<S, N> Clone for World<S, N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            clock: Arc::clone(&self.clock),
            config: Arc::clone(&self.config),
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<S: WorldStore, N: NotificationDispatcher> World<S, N> {
    /// Assemble a world from its collaborators.
    pub fn new(store: Arc<S>, notifier: Arc<N>, clock: Arc<dyn Clock>, config: Arc<GameConfig>) -> Self {
        Self {
            store,
            notifier,
            clock,
            config,
            locks: Arc::new(VillageLocks::new()),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The clock every operation reads.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// The loaded configuration.
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Deliver a notification, logging (never propagating) failures.
    pub(crate) async fn notify(&self, notification: Notification) {
        let recipient_id = notification.recipient_id();
        let kind = notification.kind();
        if let Err(err) = self.notifier.deliver(notification).await {
            warn!(%recipient_id, kind, error = %err, "Notification delivery failed");
        }
    }
}
