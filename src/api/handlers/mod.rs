//! HTTP handlers for the certificate API

pub mod certificates;
pub mod health;

pub use certificates::{
    create_certificate_handler, download_certificate_handler, get_certificate_handler,
    list_certificates_handler, upload_certificate_handler, CreateCertificateBody,
    ListCertificatesQuery,
};
pub use health::{health_handler, HealthResponse};
