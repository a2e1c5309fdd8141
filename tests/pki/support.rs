use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{ensure, Context};
use certforge::config::{SignerConfig, SignerStrategy};
use certforge::notify::{BroadcastPublisher, PublishedMessage};
use certforge::pki::{build_signer, CaMaterial, IdentityRequest, SubjectFields};
use certforge::secrets::SecretString;
use certforge::services::CertificateService;
use certforge::storage::{InMemoryBlobStore, InMemoryCertificateRepository};
use chrono::{DateTime, Duration, Utc};
use pkcs8::{pkcs5::pbes2, LineEnding, PrivateKeyInfo};
use rand::RngCore;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, PKCS_ECDSA_P256_SHA256,
};
use rsa::pkcs8::EncodePrivateKey;
use tempfile::TempDir;
use tokio::sync::broadcast;
use x509_parser::pem::parse_x509_pem;

pub const TEST_PASSPHRASE: &str = "integration-test-passphrase";
pub const TEST_TOPIC: &str = "certificate_creation";
pub const CA_COMMON_NAME: &str = "Certforge Integration Root CA";

/// Key types a root CA may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaKeyKind {
    EcdsaP256,
    Rsa2048,
}

impl CaKeyKind {
    pub const ALL: [CaKeyKind; 2] = [CaKeyKind::EcdsaP256, CaKeyKind::Rsa2048];

    fn generate_key(self) -> anyhow::Result<KeyPair> {
        match self {
            CaKeyKind::EcdsaP256 => {
                KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).context("generate ECDSA CA key")
            }
            CaKeyKind::Rsa2048 => {
                let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048)
                    .context("generate RSA CA key")?;
                let pem = key.to_pkcs8_pem(LineEnding::LF).context("encode RSA CA key")?;
                KeyPair::from_pem(&pem).context("load RSA CA key")
            }
        }
    }

    /// Dotted OID of the signature algorithm leaves issued under this CA carry.
    pub fn signature_oid(self) -> &'static str {
        match self {
            CaKeyKind::EcdsaP256 => "1.2.840.10045.4.3.2",
            CaKeyKind::Rsa2048 => "1.2.840.113549.1.1.11",
        }
    }
}

pub fn default_ca_name() -> DistinguishedName {
    let mut name = DistinguishedName::new();
    name.push(DnType::CountryName, "US");
    name.push(DnType::OrganizationName, "Certforge");
    name.push(DnType::CommonName, CA_COMMON_NAME);
    name
}

/// Self-signed root CA on disk with a PBES2-encrypted PKCS#8 key.
pub struct TestCertificateAuthority {
    temp_dir: TempDir,
    pub kind: CaKeyKind,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl TestCertificateAuthority {
    pub fn generate() -> anyhow::Result<Self> {
        Self::generate_with(CaKeyKind::EcdsaP256, default_ca_name())
    }

    pub fn generate_kind(kind: CaKeyKind) -> anyhow::Result<Self> {
        Self::generate_with(kind, default_ca_name())
    }

    pub fn generate_with(kind: CaKeyKind, name: DistinguishedName) -> anyhow::Result<Self> {
        let key_pair = kind.generate_key()?;

        let mut params = CertificateParams::default();
        params.distinguished_name = name;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

        let now = time::OffsetDateTime::now_utc();
        params.not_before = now - time::Duration::days(1);
        params.not_after = now + time::Duration::days(3650);

        let certificate = params.self_signed(&key_pair).context("self-sign CA")?;

        let temp_dir = TempDir::new().context("create temp dir")?;
        let cert_path = temp_dir.path().join("RootCA.crt");
        let key_path = temp_dir.path().join("RootCA.key");

        fs::write(&cert_path, certificate.pem()).context("write CA certificate")?;
        fs::write(&key_path, encrypt_key(&key_pair, TEST_PASSPHRASE)?).context("write CA key")?;

        Ok(Self {
            temp_dir,
            kind,
            cert_path,
            key_path,
        })
    }

    pub fn load_material(&self) -> certforge::Result<CaMaterial> {
        CaMaterial::load(
            &self.cert_path,
            &self.key_path,
            &SecretString::new(TEST_PASSPHRASE),
        )
    }

    pub fn load(&self) -> anyhow::Result<Arc<CaMaterial>> {
        let ca = self.load_material().context("load CA material")?;
        Ok(Arc::new(ca))
    }

    /// Check a leaf's issuer name and signature against this CA.
    ///
    /// Returns the dotted OID of the leaf's signature algorithm.
    pub fn verify_issued(&self, certificate_pem: &str) -> anyhow::Result<String> {
        let ca_pem = fs::read(&self.cert_path).context("read CA certificate")?;
        let (_, ca_block) = parse_x509_pem(&ca_pem).map_err(|e| anyhow::anyhow!("CA pem: {e:?}"))?;
        let ca_certificate =
            ca_block.parse_x509().map_err(|e| anyhow::anyhow!("CA certificate: {e:?}"))?;

        let (_, leaf_block) = parse_x509_pem(certificate_pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("leaf pem: {e:?}"))?;
        let leaf = leaf_block.parse_x509().map_err(|e| anyhow::anyhow!("leaf: {e:?}"))?;

        ensure!(
            leaf.issuer().as_raw() == ca_certificate.subject().as_raw(),
            "leaf issuer {} differs from CA subject {}",
            leaf.issuer(),
            ca_certificate.subject()
        );
        leaf.verify_signature(Some(ca_certificate.public_key()))
            .map_err(|e| anyhow::anyhow!("leaf signature does not verify: {e:?}"))?;

        Ok(leaf.signature_algorithm.algorithm.to_id_string())
    }

    /// Scratch directory owned by this CA fixture.
    pub fn work_dir(&self) -> PathBuf {
        self.temp_dir.path().join("work")
    }

    pub fn signer_config(&self, strategy: SignerStrategy) -> SignerConfig {
        SignerConfig {
            strategy,
            work_dir: self.work_dir(),
            max_concurrent_jobs: 2,
            ..SignerConfig::default()
        }
    }
}

fn encrypt_key(key_pair: &KeyPair, passphrase: &str) -> anyhow::Result<String> {
    let der = key_pair.serialize_der();
    let info = PrivateKeyInfo::try_from(der.as_slice()).context("decode PKCS#8 key")?;

    let mut salt = [0u8; 16];
    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut iv);

    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(2048, &salt, &iv)
        .map_err(|e| anyhow::anyhow!("pbes2 parameters: {e}"))?;
    let encrypted = info
        .encrypt_with_params(params, passphrase)
        .map_err(|e| anyhow::anyhow!("encrypt key: {e}"))?;
    let pem = encrypted
        .to_pem("ENCRYPTED PRIVATE KEY", LineEnding::LF)
        .map_err(|e| anyhow::anyhow!("encode key: {e}"))?;

    Ok(pem.to_string())
}

/// The request used throughout the scenarios: two DNS names, two IPs.
pub fn example_request(valid_for: Duration) -> IdentityRequest {
    example_request_until(Utc::now() + valid_for)
}

pub fn example_request_until(expiration_date: DateTime<Utc>) -> IdentityRequest {
    IdentityRequest {
        subject: SubjectFields {
            country_name: "US".to_string(),
            state_or_province_name: "California".to_string(),
            locality_name: "San Francisco".to_string(),
            organization_name: "Example Org".to_string(),
            organizational_unit_name: "IT".to_string(),
            common_name: "example.com".to_string(),
            email_address: "admin@example.com".to_string(),
        },
        dns_names: vec!["example.com".to_string(), "www.example.com".to_string()],
        ip_addresses: vec!["192.168.1.1".to_string(), "10.0.0.1".to_string()],
        expiration_date,
    }
}

/// A fully wired service over in-memory collaborators.
pub struct TestService {
    pub service: Arc<CertificateService>,
    pub repository: Arc<InMemoryCertificateRepository>,
    pub blobs: Arc<InMemoryBlobStore>,
    pub events: broadcast::Receiver<PublishedMessage>,
    pub ca: TestCertificateAuthority,
}

impl TestService {
    pub async fn in_process() -> anyhow::Result<Self> {
        Self::with_strategy(SignerStrategy::InProcess).await
    }

    pub async fn with_strategy(strategy: SignerStrategy) -> anyhow::Result<Self> {
        let ca = TestCertificateAuthority::generate()?;
        let signer = build_signer(&ca.signer_config(strategy), ca.load()?)
            .await
            .context("build signer")?;

        let repository = Arc::new(InMemoryCertificateRepository::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let (publisher, events) = BroadcastPublisher::new(16);
        let service = Arc::new(CertificateService::new(
            signer,
            repository.clone(),
            blobs.clone(),
            Arc::new(publisher),
            TEST_TOPIC,
        ));

        Ok(Self {
            service,
            repository,
            blobs,
            events,
            ca,
        })
    }
}

/// Compare metadata expiration to a request at day granularity.
pub fn same_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    (a - b).num_seconds().abs() < Duration::days(1).num_seconds()
}
