//! Business logic services
//!
//! Service layer components that encapsulate business logic, separated from
//! HTTP and CLI concerns.

pub mod certificate_service;

pub use certificate_service::{
    Acknowledgment, CertificateService, IssuanceOutcome, ISSUANCE_SUBMITTED, UPLOAD_ACCEPTED,
};
