//! # Issuance Notifications
//!
//! Issuance is fire-and-forget from the caller's point of view; the outcome is
//! reported out of band as an [`IssuanceEvent`] published on a topic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::{CertificateId, OwnerId};
use crate::errors::{Error, Result};

pub const EVENT_ISSUED: &str = "certificate.issued";
pub const EVENT_FAILED: &str = "certificate.failed";

/// Outcome of one background issuance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceEvent {
    /// Event type identifier
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub certificate_id: CertificateId,
    pub owner_id: OwnerId,
    pub strategy: String,
    pub serial_number: Option<String>,
    pub expiration_date: Option<DateTime<Utc>>,
    /// Error kind (if failed)
    pub error_kind: Option<String>,
    /// Error message (if failed)
    pub error_message: Option<String>,
}

impl IssuanceEvent {
    pub fn issued(
        certificate_id: CertificateId,
        owner_id: OwnerId,
        strategy: &str,
        serial_number: String,
        expiration_date: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type: EVENT_ISSUED.to_string(),
            timestamp: Utc::now(),
            certificate_id,
            owner_id,
            strategy: strategy.to_string(),
            serial_number: Some(serial_number),
            expiration_date: Some(expiration_date),
            error_kind: None,
            error_message: None,
        }
    }

    pub fn failed(
        certificate_id: CertificateId,
        owner_id: OwnerId,
        strategy: &str,
        error: &Error,
    ) -> Self {
        Self {
            event_type: EVENT_FAILED.to_string(),
            timestamp: Utc::now(),
            certificate_id,
            owner_id,
            strategy: strategy.to_string(),
            serial_number: None,
            expiration_date: None,
            error_kind: Some(error.kind().to_string()),
            error_message: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.event_type == EVENT_ISSUED
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::internal(format!("Failed to serialize issuance event: {}", e)))
    }
}

/// Message-queue collaborator: at-least-once, fire-and-forget delivery.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;
}

/// A published message as seen by subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// In-process publisher on a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<PublishedMessage>,
}

impl BroadcastPublisher {
    /// Create a publisher and a first receiver
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<PublishedMessage>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedMessage> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let size = payload.len();
        let message = PublishedMessage {
            topic: topic.to_string(),
            payload,
        };
        match self.tx.send(message) {
            Ok(receivers) => debug!(topic, size, receivers, "Published event"),
            // No subscriber is not a delivery failure for fire-and-forget events
            Err(_) => warn!(topic, size, "Published event with no active subscribers"),
        }
        Ok(())
    }
}
