//! Domain types shared by storage, services and the API.

pub mod id;

pub use id::{CertificateId, OwnerId};
