//! NATS delivery of player notifications.
//!
//! [`NatsDispatcher`] publishes each notification as JSON on a per-player
//! subject so a gateway can forward it to connected clients.
//!
//! # Subject Convention
//!
//! - **Notification publish:** `marchland.notifications.{player_id}`

use marchland_core::{NotificationDispatcher, NotifyError};
use marchland_types::{Notification, PlayerId};
use tracing::{debug, info};

use crate::error::EngineError;

/// Prefix of every notification subject.
pub const SUBJECT_PREFIX: &str = "marchland.notifications";

/// Subject a player's notifications are published on.
pub fn subject_for(player_id: PlayerId) -> String {
    format!("{SUBJECT_PREFIX}.{player_id}")
}

/// Publishes notifications to NATS.
#[derive(Debug, Clone)]
pub struct NatsDispatcher {
    client: async_nats::Client,
}

impl NatsDispatcher {
    /// Wrap an existing connection.
    pub const fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if the connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, EngineError> {
        info!(url = url, "Connecting to NATS");
        let client = async_nats::connect(url).await.map_err(|e| EngineError::Nats {
            message: format!("failed to connect to {url}: {e}"),
        })?;
        info!("NATS connection established");
        Ok(Self::new(client))
    }

    /// Flush buffered publishes before shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if the flush fails.
    pub async fn flush(&self) -> Result<(), EngineError> {
        self.client.flush().await.map_err(|e| EngineError::Nats {
            message: format!("failed to flush NATS: {e}"),
        })
    }
}

/// Encode a notification for the wire.
///
/// # Errors
///
/// Returns [`NotifyError::Encode`] if serialization fails.
pub fn encode(notification: &Notification) -> Result<Vec<u8>, NotifyError> {
    serde_json::to_vec(notification).map_err(|e| NotifyError::Encode { message: e.to_string() })
}

impl NotificationDispatcher for NatsDispatcher {
    async fn deliver(&self, notification: Notification) -> Result<(), NotifyError> {
        let subject = subject_for(notification.recipient_id());
        let payload = encode(&notification)?;
        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| NotifyError::Publish {
                message: format!("failed to publish on {subject}: {e}"),
            })?;
        debug!(subject = subject, kind = notification.kind(), "Published notification");
        Ok(())
    }
}
