//! Root CA material.
//!
//! Loaded once at startup and shared read-only (behind an `Arc`) by every
//! issuance. Any failure here is a [`Error::Config`] and keeps the engine from
//! becoming ready.

use std::fmt;
use std::path::{Path, PathBuf};

use pkcs8::{EncryptedPrivateKeyInfo, LineEnding, SecretDocument};
use rcgen::{
    Certificate, CertificateParams, KeyPair, SignatureAlgorithm, PKCS_ECDSA_P256_SHA256,
    PKCS_RSA_SHA256,
};
use tracing::info;
use x509_parser::parse_x509_certificate;
use x509_parser::pem::Pem;

use crate::errors::{Error, Result};
use crate::secrets::SecretString;

const ENCRYPTED_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";

/// Labels written by `openssl genrsa`/`ecparam` and other pre-PKCS#8 tooling.
const LEGACY_KEY_LABELS: &[&str] = &["RSA PRIVATE KEY", "EC PRIVATE KEY"];

/// The root CA certificate and its decrypted private key.
pub struct CaMaterial {
    issuer: Certificate,
    key_pair: KeyPair,
    certificate_pem: String,
    subject: String,
    cert_path: PathBuf,
    key_path: PathBuf,
    passphrase: SecretString,
}

impl CaMaterial {
    /// Read, parse and decrypt the CA certificate and key.
    pub fn load(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        passphrase: &SecretString,
    ) -> Result<Self> {
        let cert_path = cert_path.as_ref();
        let key_path = key_path.as_ref();

        let certificate_pem = std::fs::read_to_string(cert_path).map_err(|e| {
            Error::config(format!(
                "Failed to read CA certificate at {}: {}",
                cert_path.display(),
                e
            ))
        })?;
        let key_pem = std::fs::read_to_string(key_path).map_err(|e| {
            Error::config(format!(
                "Failed to read CA private key at {}: {}",
                key_path.display(),
                e
            ))
        })?;

        let inspected = inspect_ca_certificate(&certificate_pem, cert_path)?;
        let key_pair = decrypt_private_key(&key_pem, passphrase, key_path)?;

        if !is_supported_ca_algorithm(key_pair.algorithm()) {
            return Err(Error::config(format!(
                "CA private key at {} uses {:?}; only RSA and ECDSA P-256 keys signing with \
                 SHA-256 are supported",
                key_path.display(),
                key_pair.algorithm()
            )));
        }

        if key_pair.public_key_raw() != inspected.public_key.as_slice() {
            return Err(Error::config(format!(
                "CA private key at {} does not match certificate at {}",
                key_path.display(),
                cert_path.display()
            )));
        }

        let issuer = CertificateParams::from_ca_cert_pem(&certificate_pem)
            .and_then(|params| params.self_signed(&key_pair))
            .map_err(|e| {
                Error::config(format!(
                    "CA certificate at {} cannot be used for signing: {}",
                    cert_path.display(),
                    e
                ))
            })?;

        // Issued certificates carry the rebuilt name, which must match byte for byte.
        let reproduced = parse_x509_certificate(issuer.der())
            .map(|(_, rebuilt)| rebuilt.subject().as_raw() == inspected.subject_der.as_slice())
            .unwrap_or(false);
        if !reproduced {
            return Err(Error::config(format!(
                "CA subject '{}' in {} cannot be reproduced as an issuer name; repeated or \
                 multi-valued attributes are not supported",
                inspected.subject,
                cert_path.display()
            )));
        }

        info!(
            ca_subject = %inspected.subject,
            ca_cert_path = %cert_path.display(),
            "Loaded root CA material"
        );

        Ok(Self {
            issuer,
            key_pair,
            certificate_pem,
            subject: inspected.subject,
            cert_path: cert_path.to_path_buf(),
            key_path: key_path.to_path_buf(),
            passphrase: passphrase.clone(),
        })
    }

    /// Issuer certificate used by rcgen when signing leaves.
    pub(crate) fn issuer(&self) -> &Certificate {
        &self.issuer
    }

    pub(crate) fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub(crate) fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub(crate) fn key_path(&self) -> &Path {
        &self.key_path
    }

    pub(crate) fn passphrase(&self) -> &SecretString {
        &self.passphrase
    }

    /// CA certificate as loaded from disk
    pub fn certificate_pem(&self) -> &str {
        &self.certificate_pem
    }

    /// RFC 4514 rendering of the CA subject
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl fmt::Debug for CaMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaMaterial")
            .field("subject", &self.subject)
            .field("cert_path", &self.cert_path)
            .field("key_path", &self.key_path)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// CA keys both signers produce the same SHA-256 signature for.
fn is_supported_ca_algorithm(algorithm: &SignatureAlgorithm) -> bool {
    algorithm == &PKCS_RSA_SHA256 || algorithm == &PKCS_ECDSA_P256_SHA256
}

/// The parts of the CA certificate checked against the key and the rebuilt issuer.
struct InspectedCertificate {
    /// RFC 4514 rendering
    subject: String,
    /// DER encoding of the subject `Name`
    subject_der: Vec<u8>,
    /// Raw subject public key bits
    public_key: Vec<u8>,
}

fn inspect_ca_certificate(pem: &str, path: &Path) -> Result<InspectedCertificate> {
    let block = Pem::iter_from_buffer(pem.as_bytes())
        .filter_map(|block| block.ok())
        .find(|block| block.label == "CERTIFICATE")
        .ok_or_else(|| {
            Error::config(format!(
                "CA certificate file {} contains no certificate",
                path.display()
            ))
        })?;

    let certificate = block.parse_x509().map_err(|e| {
        Error::config(format!(
            "CA certificate file {} is not a valid certificate: {}",
            path.display(),
            e
        ))
    })?;

    Ok(InspectedCertificate {
        subject: certificate.subject().to_string(),
        subject_der: certificate.subject().as_raw().to_vec(),
        public_key: certificate.public_key().subject_public_key.data.to_vec(),
    })
}

fn legacy_key_error(pem: &str, path: &Path) -> Option<Error> {
    let legacy = pem.contains("Proc-Type:")
        || LEGACY_KEY_LABELS
            .iter()
            .any(|label| pem.contains(&format!("-----BEGIN {}-----", label)));
    if !legacy {
        return None;
    }

    Some(Error::config(format!(
        "CA private key file {} uses the legacy OpenSSL key format; convert it with: \
         openssl pkcs8 -topk8 -v2 aes256 -in {} -out {}",
        path.display(),
        path.display(),
        path.with_extension("pk8.key").display()
    )))
}

fn decrypt_private_key(pem: &str, passphrase: &SecretString, path: &Path) -> Result<KeyPair> {
    if let Some(err) = legacy_key_error(pem, path) {
        return Err(err);
    }

    let (label, document) = SecretDocument::from_pem(pem).map_err(|e| {
        Error::config(format!("CA private key file {} is not valid PEM: {}", path.display(), e))
    })?;

    if label != ENCRYPTED_KEY_LABEL {
        return Err(Error::config(format!(
            "CA private key file {} must be a passphrase-protected PKCS#8 key ({}), found {}",
            path.display(),
            ENCRYPTED_KEY_LABEL,
            label
        )));
    }

    let encrypted = EncryptedPrivateKeyInfo::try_from(document.as_bytes()).map_err(|e| {
        Error::config(format!("CA private key file {} is malformed: {}", path.display(), e))
    })?;

    let decrypted = encrypted.decrypt(passphrase.expose_secret()).map_err(|_| {
        Error::config(format!(
            "Failed to decrypt CA private key {}: wrong passphrase or unsupported cipher",
            path.display()
        ))
    })?;

    let decrypted_pem = decrypted.to_pem("PRIVATE KEY", LineEnding::LF).map_err(|e| {
        Error::config(format!("Failed to re-encode CA private key {}: {}", path.display(), e))
    })?;

    KeyPair::from_pem(&decrypted_pem).map_err(|_| {
        Error::config(format!(
            "Failed to decrypt CA private key {}: wrong passphrase or unsupported key type",
            path.display()
        ))
    })
}
