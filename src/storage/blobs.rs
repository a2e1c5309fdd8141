//! Blob store for combined certificate + key PEM bundles.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::domain::CertificateId;
use crate::errors::{Error, Result};

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store the bundle for a certificate. Each id is written once.
    async fn store_blob(&self, id: &CertificateId, bytes: Vec<u8>) -> Result<()>;

    async fn get_blob(&self, id: &CertificateId) -> Result<Option<Vec<u8>>>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryBlobStore {
    blobs: Arc<DashMap<CertificateId, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn store_blob(&self, id: &CertificateId, bytes: Vec<u8>) -> Result<()> {
        match self.blobs.entry(id.clone()) {
            Entry::Occupied(_) => Err(Error::conflict(format!(
                "Blob for certificate '{}' already exists",
                id
            ))),
            Entry::Vacant(slot) => {
                // Bundles hold private keys; log sizes only.
                debug!(certificate_id = %id, size = bytes.len(), "Stored certificate blob");
                slot.insert(bytes);
                Ok(())
            }
        }
    }

    async fn get_blob(&self, id: &CertificateId) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.get(id).map(|entry| entry.value().clone()))
    }
}
