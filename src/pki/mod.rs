//! # Certificate Issuance Engine
//!
//! Turns an [`IdentityRequest`] into a CA-signed leaf certificate and private
//! key, and recovers [`CertificateMetadata`] from an existing certificate.
//!
//! ```text
//! IdentityRequest --build--> CertificateRequest --sign--> IssuedCertificateBundle
//!                                                   ^
//!                                     CaMaterial ---+ (loaded once, shared)
//!
//! PEM bytes --extract--> CertificateMetadata
//! ```

pub mod authority;
pub mod cleanup;
pub mod extract;
pub mod naming;
pub mod request;
pub mod signer;

pub use authority::CaMaterial;
pub use cleanup::EphemeralFiles;
pub use extract::{extract, CertificateMetadata};
pub use naming::{WorkItemFileSet, WorkItemNamer};
pub use request::{
    build, build_at, CertificateRequest, DistinguishedName, DnAttribute, IdentityRequest, SanEntry,
    SubjectFields, ValidityWindow,
};
pub use signer::{
    build_signer, generate_serial, CertificateSigner, ExternalToolSigner, InProcessSigner,
    IssuedCertificateBundle, WorkerPool,
};
