//! Certificate metadata repository.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::{CertificateId, OwnerId};
use crate::errors::{Error, Result};
use crate::pki::{CertificateMetadata, SubjectFields};

/// How a record entered the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateSource {
    Issued,
    Uploaded,
}

/// Stored certificate metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub id: CertificateId,
    pub owner_id: OwnerId,
    /// Display name given on upload
    pub name: Option<String>,
    pub source: CertificateSource,
    #[serde(flatten)]
    pub metadata: CertificateMetadata,
    pub created_at: DateTime<Utc>,
}

impl CertificateRecord {
    pub fn new(
        id: CertificateId,
        owner_id: OwnerId,
        name: Option<String>,
        source: CertificateSource,
        metadata: CertificateMetadata,
    ) -> Self {
        Self {
            id,
            owner_id,
            name,
            source,
            metadata,
            created_at: Utc::now(),
        }
    }

    pub fn uniqueness_key(&self) -> UniquenessKey {
        UniquenessKey::new(&self.owner_id, &self.metadata)
    }
}

/// Owner + identity fields + sorted SAN lists. Expiration is not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniquenessKey {
    owner_id: OwnerId,
    subject: SubjectFields,
    dns_names: Vec<String>,
    ip_addresses: Vec<String>,
}

impl UniquenessKey {
    pub fn new(owner_id: &OwnerId, metadata: &CertificateMetadata) -> Self {
        let mut dns_names = metadata.dns_names.clone();
        let mut ip_addresses = metadata.ip_addresses.clone();
        dns_names.sort();
        ip_addresses.sort();

        Self {
            owner_id: owner_id.clone(),
            subject: metadata.subject.clone(),
            dns_names,
            ip_addresses,
        }
    }
}

#[async_trait]
pub trait CertificateRepository: Send + Sync {
    /// Store a record; a duplicate uniqueness key is [`Error::Conflict`].
    async fn store_metadata(&self, record: CertificateRecord) -> Result<CertificateId>;

    /// Remove a record and release its uniqueness key.
    async fn remove_metadata(&self, id: &CertificateId) -> Result<Option<CertificateRecord>>;

    /// Get a record by ID.
    async fn get(&self, id: &CertificateId) -> Result<Option<CertificateRecord>>;

    /// All records of one owner, newest first.
    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<CertificateRecord>>;
}

/// Repository backed by concurrent hash maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCertificateRepository {
    records: Arc<DashMap<CertificateId, CertificateRecord>>,
    keys: Arc<DashMap<UniquenessKey, CertificateId>>,
}

impl InMemoryCertificateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl CertificateRepository for InMemoryCertificateRepository {
    #[instrument(
        skip(self, record),
        fields(certificate_id = %record.id, owner_id = %record.owner_id),
        name = "store_certificate_metadata"
    )]
    async fn store_metadata(&self, record: CertificateRecord) -> Result<CertificateId> {
        // Lock order is records then keys; both entries are held until the insert.
        let record_slot = match self.records.entry(record.id.clone()) {
            Entry::Occupied(_) => {
                return Err(Error::conflict(format!("Certificate '{}' already exists", record.id)))
            }
            Entry::Vacant(slot) => slot,
        };

        match self.keys.entry(record.uniqueness_key()) {
            Entry::Occupied(existing) => Err(Error::conflict(format!(
                "A certificate with the same identity already exists for owner '{}' (id {})",
                record.owner_id,
                existing.get()
            ))),
            Entry::Vacant(key_slot) => {
                let id = record.id.clone();
                key_slot.insert(id.clone());
                record_slot.insert(record);
                debug!("Stored certificate metadata");
                Ok(id)
            }
        }
    }

    #[instrument(skip(self), fields(certificate_id = %id), name = "remove_certificate_metadata")]
    async fn remove_metadata(&self, id: &CertificateId) -> Result<Option<CertificateRecord>> {
        let Some((_, record)) = self.records.remove(id) else {
            return Ok(None);
        };
        self.keys.remove_if(&record.uniqueness_key(), |_, owner| owner == id);
        debug!("Removed certificate metadata");
        Ok(Some(record))
    }

    async fn get(&self, id: &CertificateId) -> Result<Option<CertificateRecord>> {
        Ok(self.records.get(id).map(|entry| entry.value().clone()))
    }

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<CertificateRecord>> {
        let mut records: Vec<CertificateRecord> = self
            .records
            .iter()
            .filter(|entry| &entry.owner_id == owner_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}
