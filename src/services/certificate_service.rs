//! Certificate business logic service
//!
//! Orchestrates the issuance engine and its collaborators: request building,
//! signing, metadata extraction, persistence and outcome notification. HTTP and
//! CLI concerns stay in their own layers.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn, Instrument};

use crate::{
    config::SignerStrategy,
    domain::{CertificateId, OwnerId},
    errors::{Error, Result},
    issuance_span,
    notify::{EventPublisher, IssuanceEvent},
    observability::{record_ingest, record_issuance, record_signing_duration},
    pki::{
        self, CertificateMetadata, CertificateRequest, CertificateSigner, IdentityRequest,
        IssuedCertificateBundle,
    },
    storage::{BlobStore, CertificateRecord, CertificateRepository, CertificateSource},
};

pub const ISSUANCE_SUBMITTED: &str = "Certificate Creation Submitted Successfully";
pub const UPLOAD_ACCEPTED: &str = "Certificate Uploaded Successfully";

/// Returned to callers before (issue) or after (upload) the work completes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgment {
    pub certificate_id: CertificateId,
    pub message: String,
}

/// Result of an awaited issuance
#[derive(Debug, Clone)]
pub struct IssuanceOutcome {
    pub certificate_id: CertificateId,
    pub bundle: IssuedCertificateBundle,
    pub metadata: CertificateMetadata,
}

/// Service for issuing and ingesting certificates
#[derive(Clone)]
pub struct CertificateService {
    signer: Arc<dyn CertificateSigner>,
    repository: Arc<dyn CertificateRepository>,
    blobs: Arc<dyn BlobStore>,
    publisher: Arc<dyn EventPublisher>,
    event_topic: String,
}

impl CertificateService {
    /// Create a new certificate service
    pub fn new(
        signer: Arc<dyn CertificateSigner>,
        repository: Arc<dyn CertificateRepository>,
        blobs: Arc<dyn BlobStore>,
        publisher: Arc<dyn EventPublisher>,
        event_topic: impl Into<String>,
    ) -> Self {
        Self {
            signer,
            repository,
            blobs,
            publisher,
            event_topic: event_topic.into(),
        }
    }

    pub fn strategy(&self) -> SignerStrategy {
        self.signer.strategy()
    }

    /// Validate the request and start issuance in the background.
    ///
    /// Validation errors are returned here, before any key material exists.
    /// Everything after that is reported through logs and the event topic.
    pub fn issue(&self, owner_id: OwnerId, request: IdentityRequest) -> Result<Acknowledgment> {
        self.issue_as(CertificateId::new(), owner_id, request)
    }

    /// [`issue`](Self::issue) under a caller-chosen certificate id.
    pub fn issue_as(
        &self,
        certificate_id: CertificateId,
        owner_id: OwnerId,
        request: IdentityRequest,
    ) -> Result<Acknowledgment> {
        let certificate_request = pki::build(&request)?;

        let span = issuance_span!(
            self.strategy(),
            certificate_id = %certificate_id,
            owner_id = %owner_id
        );
        let service = self.clone();
        let id = certificate_id.clone();
        tokio::spawn(
            async move {
                // Outcome already logged and published
                let _ = service.run_issuance(id, owner_id, certificate_request).await;
            }
            .instrument(span),
        );

        Ok(Acknowledgment {
            certificate_id,
            message: ISSUANCE_SUBMITTED.to_string(),
        })
    }

    /// Issue and wait for the outcome.
    pub async fn issue_and_wait(
        &self,
        owner_id: OwnerId,
        request: IdentityRequest,
    ) -> Result<IssuanceOutcome> {
        let certificate_request = pki::build(&request)?;
        let certificate_id = CertificateId::new();

        let span = issuance_span!(
            self.strategy(),
            certificate_id = %certificate_id,
            owner_id = %owner_id
        );
        self.run_issuance(certificate_id, owner_id, certificate_request)
            .instrument(span)
            .await
    }

    /// Parse an externally supplied certificate and store its metadata and bytes.
    pub async fn upload_and_ingest(
        &self,
        pem_bytes: &[u8],
        owner_id: OwnerId,
        name: impl Into<String>,
    ) -> Result<Acknowledgment> {
        let metadata = pki::extract(pem_bytes).inspect_err(|_| record_ingest("parse_error"))?;

        let certificate_id = CertificateId::new();
        let record = CertificateRecord::new(
            certificate_id.clone(),
            owner_id.clone(),
            Some(name.into()),
            CertificateSource::Uploaded,
            metadata,
        );

        self.persist(record, pem_bytes.to_vec()).await.inspect_err(|e| {
            let outcome = match e {
                Error::Conflict(_) => "conflict",
                _ => "error",
            };
            record_ingest(outcome)
        })?;

        record_ingest("success");
        info!(
            certificate_id = %certificate_id,
            owner_id = %owner_id,
            "Uploaded certificate ingested"
        );

        Ok(Acknowledgment {
            certificate_id,
            message: UPLOAD_ACCEPTED.to_string(),
        })
    }

    /// Get a stored certificate record
    pub async fn get_certificate(&self, id: &CertificateId) -> Result<CertificateRecord> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Certificate '{}' not found", id)))
    }

    /// Records of one owner, newest first
    pub async fn list_certificates(&self, owner_id: &OwnerId) -> Result<Vec<CertificateRecord>> {
        self.repository.list_by_owner(owner_id).await
    }

    /// Stored PEM bytes: the combined bundle for issued certificates, the
    /// uploaded file otherwise.
    pub async fn get_certificate_pem(&self, id: &CertificateId) -> Result<Vec<u8>> {
        self.blobs
            .get_blob(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Certificate '{}' not found", id)))
    }

    async fn run_issuance(
        &self,
        certificate_id: CertificateId,
        owner_id: OwnerId,
        request: CertificateRequest,
    ) -> Result<IssuanceOutcome> {
        let strategy = self.strategy();
        let result = self.sign_and_store(&certificate_id, &owner_id, &request).await;

        let event = match &result {
            Ok(outcome) => {
                record_issuance(strategy.as_str(), true);
                info!(
                    serial_number = %outcome.metadata.serial_number,
                    expiration_date = %outcome.metadata.expiration_date,
                    "Certificate issued"
                );
                IssuanceEvent::issued(
                    certificate_id,
                    owner_id,
                    strategy.as_str(),
                    outcome.metadata.serial_number.clone(),
                    outcome.metadata.expiration_date,
                )
            }
            Err(e) => {
                record_issuance(strategy.as_str(), false);
                match e {
                    Error::Signing { diagnostics: Some(diagnostics), .. } => {
                        error!(
                            error = %e,
                            diagnostics = %diagnostics,
                            "Certificate issuance failed"
                        )
                    }
                    _ => error!(error = %e, error_kind = e.kind(), "Certificate issuance failed"),
                }
                IssuanceEvent::failed(certificate_id, owner_id, strategy.as_str(), e)
            }
        };

        self.publish(&event).await;
        result
    }

    async fn sign_and_store(
        &self,
        certificate_id: &CertificateId,
        owner_id: &OwnerId,
        request: &CertificateRequest,
    ) -> Result<IssuanceOutcome> {
        let started = Instant::now();
        let bundle = self.signer.sign(request).await?;
        record_signing_duration(self.strategy().as_str(), started.elapsed());

        let metadata = pki::extract(bundle.certificate_pem.as_bytes()).map_err(|e| {
            Error::signing(format!("Issued certificate could not be read back: {}", e))
        })?;

        let record = CertificateRecord::new(
            certificate_id.clone(),
            owner_id.clone(),
            None,
            CertificateSource::Issued,
            metadata.clone(),
        );
        self.persist(record, bundle.to_combined().into_bytes()).await?;

        Ok(IssuanceOutcome {
            certificate_id: certificate_id.clone(),
            bundle,
            metadata,
        })
    }

    /// Store the record, then its bytes. A failed blob write withdraws the record.
    async fn persist(&self, record: CertificateRecord, bytes: Vec<u8>) -> Result<()> {
        let certificate_id = self.repository.store_metadata(record).await?;

        let Err(e) = self.blobs.store_blob(&certificate_id, bytes).await else {
            return Ok(());
        };

        match self.repository.remove_metadata(&certificate_id).await {
            Ok(_) => warn!(
                certificate_id = %certificate_id,
                error = %e,
                "Certificate bytes not stored, metadata rolled back"
            ),
            Err(rollback) => error!(
                certificate_id = %certificate_id,
                error = %rollback,
                "Failed to roll back certificate metadata"
            ),
        }
        Err(e)
    }

    async fn publish(&self, event: &IssuanceEvent) {
        let payload = match event.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to encode issuance event");
                return;
            }
        };

        if let Err(e) = self.publisher.publish(&self.event_topic, payload).await {
            error!(
                error = %e,
                topic = %self.event_topic,
                event_type = %event.event_type,
                "Failed to publish issuance event"
            );
        }
    }
}

impl std::fmt::Debug for CertificateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateService")
            .field("strategy", &self.strategy())
            .field("event_topic", &self.event_topic)
            .finish()
    }
}
