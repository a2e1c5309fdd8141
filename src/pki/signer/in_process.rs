use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rcgen::{
    CertificateParams, DistinguishedName as RcgenDn, DnType, DnValue, Ia5String, IsCa, KeyPair,
    KeyUsagePurpose, PrintableString, SanType, SerialNumber,
};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use time::OffsetDateTime;
use tracing::debug;

use super::{generate_serial, CertificateSigner, IssuedCertificateBundle, WorkerPool, RSA_KEY_BITS};
use crate::config::SignerStrategy;
use crate::errors::{Error, Result};
use crate::pki::authority::CaMaterial;
use crate::pki::request::{CertificateRequest, DistinguishedName, DnAttribute, SanEntry};
use crate::secrets::SecretString;

/// Signs leaf certificates in memory.
#[derive(Debug)]
pub struct InProcessSigner {
    ca: Arc<CaMaterial>,
    pool: WorkerPool,
}

impl InProcessSigner {
    pub fn new(ca: Arc<CaMaterial>, pool: WorkerPool) -> Self {
        Self { ca, pool }
    }
}

#[async_trait]
impl CertificateSigner for InProcessSigner {
    fn strategy(&self) -> SignerStrategy {
        SignerStrategy::InProcess
    }

    async fn sign(&self, request: &CertificateRequest) -> Result<IssuedCertificateBundle> {
        let params = certificate_params(request, &generate_serial())?;
        let ca = Arc::clone(&self.ca);

        self.pool
            .run_blocking(move || {
                let key_pair = generate_rsa_key_pair()?;
                let certificate = params
                    .signed_by(&key_pair, ca.issuer(), ca.key_pair())
                    .map_err(|e| Error::signing(format!("Failed to sign certificate: {}", e)))?;

                debug!(ca_subject = %ca.subject(), "Signed leaf certificate in process");

                Ok(IssuedCertificateBundle {
                    certificate_pem: certificate.pem(),
                    private_key_pem: SecretString::new(key_pair.serialize_pem()),
                })
            })
            .await
    }
}

/// Leaf certificate parameters: end-entity, fixed key usages, AKI from the CA.
fn certificate_params(request: &CertificateRequest, serial: &[u8]) -> Result<CertificateParams> {
    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name(&request.subject)?;
    params.subject_alt_names = subject_alt_names(&request.subject_alt_names)?;
    params.not_before = to_offset_date_time(request.validity.not_before)?;
    params.not_after = to_offset_date_time(request.validity.not_after)?;
    params.serial_number = Some(SerialNumber::from_slice(serial));
    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::ContentCommitment,
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::DataEncipherment,
    ];
    params.use_authority_key_identifier_extension = true;
    Ok(params)
}

fn distinguished_name(subject: &DistinguishedName) -> Result<RcgenDn> {
    let mut dn = RcgenDn::new();

    for (attribute, value) in subject.entries() {
        let (dn_type, dn_value) = match attribute {
            DnAttribute::Country => {
                let country = PrintableString::try_from(value.as_str()).map_err(|_| {
                    Error::validation_field(
                        format!("country name '{}' is not a printable string", value),
                        "country_name",
                    )
                })?;
                (DnType::CountryName, DnValue::PrintableString(country))
            }
            DnAttribute::Email => {
                let email = Ia5String::try_from(value.as_str()).map_err(|_| {
                    Error::validation_field("email address must be ASCII", "email_address")
                })?;
                (DnType::CustomDnType(attribute.oid().to_vec()), DnValue::Ia5String(email))
            }
            DnAttribute::StateOrProvince => {
                (DnType::StateOrProvinceName, DnValue::Utf8String(value.clone()))
            }
            DnAttribute::Locality => (DnType::LocalityName, DnValue::Utf8String(value.clone())),
            DnAttribute::Organization => {
                (DnType::OrganizationName, DnValue::Utf8String(value.clone()))
            }
            DnAttribute::OrganizationalUnit => {
                (DnType::OrganizationalUnitName, DnValue::Utf8String(value.clone()))
            }
            DnAttribute::CommonName => (DnType::CommonName, DnValue::Utf8String(value.clone())),
        };
        dn.push(dn_type, dn_value);
    }

    Ok(dn)
}

fn subject_alt_names(entries: &[SanEntry]) -> Result<Vec<SanType>> {
    entries
        .iter()
        .map(|entry| match entry {
            SanEntry::Dns(name) => Ia5String::try_from(name.as_str())
                .map(SanType::DnsName)
                .map_err(|_| {
                    Error::validation_field(format!("invalid DNS name '{}'", name), "dns_names")
                }),
            SanEntry::Ip(address) => Ok(SanType::IpAddress(IpAddr::V4(*address))),
        })
        .collect()
}

fn to_offset_date_time(instant: DateTime<Utc>) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(instant.timestamp())
        .map_err(|e| Error::signing(format!("Validity bound {} out of range: {}", instant, e)))
}

fn generate_rsa_key_pair() -> Result<KeyPair> {
    let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), RSA_KEY_BITS)
        .map_err(|e| Error::signing(format!("RSA key generation failed: {}", e)))?;

    let pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::signing(format!("Failed to serialize private key: {}", e)))?;

    KeyPair::from_pem(&pem)
        .map_err(|e| Error::signing(format!("Failed to load generated key: {}", e)))
}
