//! Certificate signing strategies.
//!
//! Two interchangeable implementations of [`CertificateSigner`] exist:
//!
//! - [`InProcessSigner`]: key generation and signing in memory with `rsa` + `rcgen`.
//! - [`ExternalToolSigner`]: drives the `openssl` CLI through request, extension
//!   file, sign and bundle steps, with intermediate files on disk.
//!
//! Both take a [`CertificateRequest`](crate::pki::CertificateRequest) and produce
//! the same observable certificate shape. Blocking work runs on a bounded
//! [`WorkerPool`] so the async runtime never stalls on RSA key generation or a
//! child process.

mod external;
mod in_process;

use std::sync::Arc;

use async_trait::async_trait;
use rand::RngCore;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::config::{SignerConfig, SignerStrategy};
use crate::errors::{Error, Result};
use crate::pki::authority::CaMaterial;
use crate::pki::request::CertificateRequest;
use crate::secrets::SecretString;

pub use external::{extension_file, ExternalToolSigner, CA_PASSPHRASE_ENV};
pub use in_process::InProcessSigner;

/// Modulus size of every generated leaf key
pub const RSA_KEY_BITS: usize = 2048;

/// Serial numbers are 20 octets with the high bit cleared (RFC 5280 4.1.2.2)
pub const SERIAL_LEN: usize = 20;

const CERTIFICATE_END: &str = "-----END CERTIFICATE-----";

/// Signs a validated request with the root CA.
#[async_trait]
pub trait CertificateSigner: Send + Sync {
    fn strategy(&self) -> SignerStrategy;

    /// Generate a fresh key pair and a CA-signed leaf certificate for it.
    async fn sign(&self, request: &CertificateRequest) -> Result<IssuedCertificateBundle>;
}

/// A signed leaf certificate together with its unencrypted private key.
#[derive(Debug, Clone)]
pub struct IssuedCertificateBundle {
    pub certificate_pem: String,
    pub private_key_pem: SecretString,
}

impl IssuedCertificateBundle {
    /// Combined form: certificate PEM, a single `\n`, then key PEM.
    pub fn to_combined(&self) -> String {
        format!("{}\n{}", self.certificate_pem, self.private_key_pem.expose_secret())
    }

    /// Split a combined bundle back into its certificate and key parts.
    pub fn split(combined: &str) -> Result<Self> {
        let end = combined
            .find(CERTIFICATE_END)
            .map(|idx| idx + CERTIFICATE_END.len())
            .ok_or_else(|| Error::parse("bundle contains no certificate"))?;

        let (certificate, key) = combined.split_at(end);
        let key = key.trim_start();
        if !key.starts_with("-----BEGIN") || !key.contains("PRIVATE KEY-----") {
            return Err(Error::parse("bundle contains no private key after the certificate"));
        }

        Ok(Self {
            certificate_pem: format!("{}\n", certificate.trim_start()),
            private_key_pem: SecretString::new(key),
        })
    }
}

/// Random positive, non-zero serial number.
pub fn generate_serial() -> [u8; SERIAL_LEN] {
    let mut serial = [0u8; SERIAL_LEN];
    loop {
        rand::thread_rng().fill_bytes(&mut serial);
        serial[0] &= 0x7f;
        if serial.iter().any(|b| *b != 0) {
            return serial;
        }
    }
}

/// Bounded pool for CPU-heavy or process-spawning work.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        self.permits.acquire().await.map_err(|_| Error::internal("worker pool is closed"))
    }

    /// Run a blocking closure on the blocking thread pool once a slot is free.
    pub async fn run_blocking<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self.acquire().await?;
        tokio::task::spawn_blocking(task)
            .await
            .map_err(|e| Error::internal(format!("Blocking signing task failed: {}", e)))?
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Build the signer selected by configuration.
pub async fn build_signer(
    config: &SignerConfig,
    ca: Arc<CaMaterial>,
) -> Result<Arc<dyn CertificateSigner>> {
    let pool = WorkerPool::new(config.max_concurrent_jobs);

    let signer: Arc<dyn CertificateSigner> = match config.strategy {
        SignerStrategy::InProcess => Arc::new(InProcessSigner::new(ca, pool)),
        SignerStrategy::External => Arc::new(ExternalToolSigner::new(config, ca, pool).await?),
    };

    tracing::info!(
        strategy = %config.strategy,
        max_concurrent_jobs = config.max_concurrent_jobs,
        "Certificate signer ready"
    );

    Ok(signer)
}
