//! Startup sequence for certforge
//!
//! Loads the root CA material exactly once, builds the configured signer and
//! wires the service to its storage and notification collaborators. A CA that
//! cannot be loaded aborts startup.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::Result;
use crate::notify::{BroadcastPublisher, PublishedMessage};
use crate::pki::{build_signer, CaMaterial};
use crate::services::CertificateService;
use crate::storage::{InMemoryBlobStore, InMemoryCertificateRepository};

/// Buffered issuance events before slow subscribers start lagging
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Build the certificate service from configuration.
pub async fn build_service(config: &Config) -> Result<Arc<CertificateService>> {
    let ca = CaMaterial::load(&config.ca.cert_path, &config.ca.key_path, &config.ca.passphrase)?;
    info!(ca_subject = %ca.subject(), "Root CA ready");

    let signer = build_signer(&config.signer, Arc::new(ca)).await?;

    let (publisher, events) = BroadcastPublisher::new(EVENT_CHANNEL_CAPACITY);
    spawn_event_logger(events);

    Ok(Arc::new(CertificateService::new(
        signer,
        Arc::new(InMemoryCertificateRepository::new()),
        Arc::new(InMemoryBlobStore::new()),
        Arc::new(publisher),
        config.event_topic.clone(),
    )))
}

/// Log every published event until the channel closes.
pub fn spawn_event_logger(mut events: broadcast::Receiver<PublishedMessage>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(message) => debug!(
                    topic = %message.topic,
                    payload = %String::from_utf8_lossy(&message.payload),
                    "Issuance event published"
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event logger lagged behind"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}
