use std::ffi::OsString;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, Instrument};

use super::{generate_serial, CertificateSigner, IssuedCertificateBundle, WorkerPool, RSA_KEY_BITS};
use crate::config::{SignerConfig, SignerStrategy};
use crate::errors::{Error, Result};
use crate::pki::authority::CaMaterial;
use crate::pki::cleanup::EphemeralFiles;
use crate::pki::naming::{WorkItemFileSet, WorkItemNamer};
use crate::pki::request::{CertificateRequest, SanEntry};
use crate::pipeline_step_span;

/// Environment variable the CA passphrase is handed to the sign step through.
pub const CA_PASSPHRASE_ENV: &str = "CERTFORGE_CA_PASSPHRASE";

/// Signs leaf certificates by driving the `openssl` command line tool.
#[derive(Debug)]
pub struct ExternalToolSigner {
    ca: Arc<CaMaterial>,
    pool: WorkerPool,
    namer: WorkItemNamer,
    program: PathBuf,
}

impl ExternalToolSigner {
    /// Creates the work directories up front.
    pub async fn new(config: &SignerConfig, ca: Arc<CaMaterial>, pool: WorkerPool) -> Result<Self> {
        let namer = WorkItemNamer::new(&config.work_dir, &config.file_prefix);
        namer.ensure_dirs().await?;

        Ok(Self {
            ca,
            pool,
            namer,
            program: config.openssl_bin.clone(),
        })
    }

    async fn run_pipeline(
        &self,
        request: &CertificateRequest,
        files: &WorkItemFileSet,
    ) -> Result<IssuedCertificateBundle> {
        let work_item = files.base_name.as_str();

        // (a) key pair + CSR
        self.run_tool(
            "request",
            work_item,
            vec![
                "req".into(),
                "-new".into(),
                "-newkey".into(),
                format!("rsa:{}", RSA_KEY_BITS).into(),
                "-nodes".into(),
                "-keyout".into(),
                files.key.clone().into(),
                "-out".into(),
                files.csr.clone().into(),
                "-subj".into(),
                request.subject.to_openssl_subject().into(),
                "-utf8".into(),
                "-sha256".into(),
                "-batch".into(),
            ],
            false,
        )
        .await?;

        // (b) extension file
        tokio::fs::write(&files.ext, extension_file(request))
            .await
            .map_err(|e| Error::signing(format!("Failed to write extension file: {}", e)))?;

        // (c) sign with the CA
        let serial = hex::encode(generate_serial());
        self.run_tool(
            "sign",
            work_item,
            vec![
                "x509".into(),
                "-req".into(),
                "-in".into(),
                files.csr.clone().into(),
                "-CA".into(),
                self.ca.cert_path().into(),
                "-CAkey".into(),
                self.ca.key_path().into(),
                "-passin".into(),
                format!("env:{}", CA_PASSPHRASE_ENV).into(),
                "-set_serial".into(),
                format!("0x{}", serial).into(),
                "-days".into(),
                request.validity.days.to_string().into(),
                "-sha256".into(),
                "-extfile".into(),
                files.ext.clone().into(),
                "-out".into(),
                files.crt.clone().into(),
            ],
            true,
        )
        .await?;

        // (d) bundle: certificate, newline, key
        let certificate_pem = read_artifact(&files.crt).await?;
        let private_key_pem = read_artifact(&files.key).await?;
        let combined = format!("{}\n{}", certificate_pem, private_key_pem);
        tokio::fs::write(&files.pem, &combined)
            .await
            .map_err(|e| Error::signing(format!("Failed to write bundle file: {}", e)))?;

        IssuedCertificateBundle::split(&read_artifact(&files.pem).await?)
            .map_err(|e| Error::signing(format!("Tool produced an unusable bundle: {}", e)))
    }

    async fn run_tool(
        &self,
        step: &'static str,
        work_item: &str,
        args: Vec<OsString>,
        with_passphrase: bool,
    ) -> Result<()> {
        let _permit = self.pool.acquire().await?;

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if with_passphrase {
            command.env(CA_PASSPHRASE_ENV, self.ca.passphrase().expose_secret());
        }

        let output = command
            .output()
            .instrument(pipeline_step_span!(step, work_item))
            .await
            .map_err(|e| {
                Error::signing(format!("Failed to launch {}: {}", self.program.display(), e))
            })?;

        if !output.status.success() {
            let diagnostics = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(Error::signing_with_diagnostics(
                format!("{} step failed ({})", step, output.status),
                diagnostics,
            ));
        }

        debug!(step, work_item, "Pipeline step completed");
        Ok(())
    }
}

#[async_trait]
impl CertificateSigner for ExternalToolSigner {
    fn strategy(&self) -> SignerStrategy {
        SignerStrategy::External
    }

    async fn sign(&self, request: &CertificateRequest) -> Result<IssuedCertificateBundle> {
        let files = self.namer.allocate();
        let ephemeral = EphemeralFiles::new(files.paths());

        let result = self.run_pipeline(request, &files).await;
        ephemeral.cleanup().await;
        result
    }
}

/// OpenSSL v3 extension file for a leaf certificate. The SAN line and
/// `[alt_names]` section only appear when there is at least one entry.
pub fn extension_file(request: &CertificateRequest) -> String {
    let mut ext = String::from(
        "authorityKeyIdentifier=keyid,issuer\n\
         basicConstraints=CA:FALSE\n\
         keyUsage = digitalSignature, nonRepudiation, keyEncipherment, dataEncipherment\n",
    );

    if !request.has_subject_alt_names() {
        return ext;
    }

    ext.push_str("subjectAltName = @alt_names\n\n[alt_names]\n");

    let (mut dns_index, mut ip_index) = (0, 0);
    for entry in &request.subject_alt_names {
        match entry {
            SanEntry::Dns(name) => {
                dns_index += 1;
                let _ = writeln!(ext, "DNS.{} = {}", dns_index, name);
            }
            SanEntry::Ip(address) => {
                ip_index += 1;
                let _ = writeln!(ext, "IP.{} = {}", ip_index, address);
            }
        }
    }

    ext
}

async fn read_artifact(path: &std::path::Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::signing(format!("Failed to read {}: {}", path.display(), e)))
}
