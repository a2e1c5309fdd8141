//! # certforge
//!
//! Issues short-lived leaf X.509 certificates signed by an operator-controlled
//! root CA, and recovers the descriptive fields of existing certificates.
//!
//! ## Architecture
//!
//! ```text
//! REST API / CLI → CertificateService → Issuance Engine (pki) → Storage + Notifications
//!                                           ↓
//!                               in-process (rcgen) | external (openssl)
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use certforge::{pki, Config, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::from_env()?;
//!     let service = certforge::startup::build_service(&config).await?;
//!     let request: pki::IdentityRequest = serde_json::from_str(
//!         r#"{"common_name": "example.com", "expiration_date": "2030-01-01T00:00:00Z"}"#,
//!     )
//!     .expect("valid request");
//!     let outcome = service.issue_and_wait("operator".into(), request).await?;
//!     println!("{}", outcome.bundle.certificate_pem);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod notify;
pub mod observability;
pub mod pki;
pub mod secrets;
pub mod services;
pub mod startup;
pub mod storage;

// Re-export commonly used types and traits
pub use config::Config;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
