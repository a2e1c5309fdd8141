//! # REST API Components
//!
//! HTTP request layer of certforge: certificate creation, upload/ingest and
//! lookup under `/cert-ops`, plus a health endpoint.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use routes::{build_router, ApiState};
pub use server::start_api_server;
