//! Hand-off of notifications to an external delivery channel.
//!
//! The core calls [`NotificationDispatcher::deliver`] after a change has
//! been committed. Delivery is fire-and-forget: a failure is logged by the
//! caller and never rolls back the committed change.

use core::future::Future;

use marchland_types::Notification;
use tokio::sync::mpsc;
use tracing::info;

/// Errors a dispatcher can report.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The receiving side has gone away.
    #[error("notification channel closed")]
    Closed,

    /// The receiving side is not keeping up.
    #[error("notification channel full")]
    Full,

    /// The notification could not be encoded.
    #[error("failed to encode notification: {message}")]
    Encode {
        /// Encoder message.
        message: String,
    },

    /// The transport rejected the notification.
    #[error("failed to publish notification: {message}")]
    Publish {
        /// Transport message.
        message: String,
    },
}

/// Delivers notifications to players.
pub trait NotificationDispatcher: Send + Sync + 'static {
    /// Hand one notification to the delivery channel.
    fn deliver(&self, notification: Notification) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Writes every notification to the log and nowhere else.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDispatcher;

impl NotificationDispatcher for TracingDispatcher {
    async fn deliver(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            recipient_id = %notification.recipient_id(),
            kind = notification.kind(),
            "Notification"
        );
        Ok(())
    }
}

/// Forwards notifications into a bounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    sender: mpsc::Sender<Notification>,
}

impl ChannelDispatcher {
    /// A dispatcher and the receiver that drains it.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl NotificationDispatcher for ChannelDispatcher {
    async fn deliver(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sender.try_send(notification).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => NotifyError::Full,
            mpsc::error::TrySendError::Closed(_) => NotifyError::Closed,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use marchland_types::{IncomingMovementNotice, MovementId, MovementKind, PlayerId, VillageId};

    fn incoming() -> Notification {
        Notification::IncomingMovement(IncomingMovementNotice {
            movement_id: MovementId::new(),
            recipient_id: PlayerId::new(),
            kind: MovementKind::Attack,
            origin_id: VillageId::new(),
            destination_id: VillageId::new(),
            arrival_time: Utc::now(),
        })
    }

    #[tokio::test]
    async fn channel_delivers_in_order() {
        let (dispatcher, mut rx) = ChannelDispatcher::new(4);
        let first = incoming();
        let second = incoming();
        dispatcher.deliver(first.clone()).await.unwrap();
        dispatcher.deliver(second.clone()).await.unwrap();
        assert_eq!(rx.recv().await, Some(first));
        assert_eq!(rx.recv().await, Some(second));
    }

    #[tokio::test]
    async fn full_channel_is_reported() {
        let (dispatcher, _rx) = ChannelDispatcher::new(1);
        dispatcher.deliver(incoming()).await.unwrap();
        assert!(matches!(dispatcher.deliver(incoming()).await, Err(NotifyError::Full)));
    }

    #[tokio::test]
    async fn closed_channel_is_reported() {
        let (dispatcher, rx) = ChannelDispatcher::new(1);
        drop(rx);
        assert!(matches!(dispatcher.deliver(incoming()).await, Err(NotifyError::Closed)));
    }

    #[tokio::test]
    async fn tracing_dispatcher_accepts_everything() {
        assert!(TracingDispatcher.deliver(incoming()).await.is_ok());
    }
}
