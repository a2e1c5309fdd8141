//! # Storage and Persistence
//!
//! Persistence collaborators of the issuance engine: a metadata repository with
//! a uniqueness constraint and a blob store for combined PEM bundles. The
//! in-memory implementations back the binary and the tests.

pub mod blobs;
pub mod certificates;

pub use blobs::{BlobStore, InMemoryBlobStore};
pub use certificates::{
    CertificateRecord, CertificateRepository, CertificateSource, InMemoryCertificateRepository,
    UniquenessKey,
};
