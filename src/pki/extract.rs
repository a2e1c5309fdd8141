//! Certificate metadata extraction.
//!
//! The inverse of issuance: recover identity fields, SAN entries and the
//! expiration instant from a PEM-encoded certificate.

use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use x509_parser::der_parser::asn1_rs::Tag;
use x509_parser::pem::Pem;
use x509_parser::prelude::*;

use crate::errors::{Error, Result};
use crate::pki::request::{IdentityRequest, SubjectFields};

/// Descriptive fields recovered from a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateMetadata {
    #[serde(flatten)]
    pub subject: SubjectFields,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<String>,
    pub expiration_date: DateTime<Utc>,
    /// Lower-case hex serial number
    pub serial_number: String,
    pub issuer: String,
}

impl CertificateMetadata {
    /// Identity this certificate was issued for.
    pub fn to_identity_request(&self) -> IdentityRequest {
        IdentityRequest {
            subject: self.subject.clone(),
            dns_names: self.dns_names.clone(),
            ip_addresses: self.ip_addresses.clone(),
            expiration_date: self.expiration_date,
        }
    }
}

/// Parse the first `CERTIFICATE` block of `pem_bytes`.
pub fn extract(pem_bytes: &[u8]) -> Result<CertificateMetadata> {
    let mut saw_block = false;
    let mut pem = None;
    for block in Pem::iter_from_buffer(pem_bytes) {
        let block = block.map_err(|e| Error::parse(format!("invalid PEM data: {}", e)))?;
        saw_block = true;
        if block.label == "CERTIFICATE" {
            pem = Some(block);
            break;
        }
    }

    let pem = pem.ok_or_else(|| {
        if saw_block {
            Error::parse("PEM data contains no CERTIFICATE block")
        } else {
            Error::parse("input is not PEM-encoded")
        }
    })?;

    let certificate = pem
        .parse_x509()
        .map_err(|e| Error::parse(format!("invalid X.509 certificate: {}", e)))?;

    let (dns_names, ip_addresses) = subject_alt_names(&certificate)?;

    let not_after = certificate.validity().not_after.timestamp();
    let expiration_date = DateTime::from_timestamp(not_after, 0)
        .ok_or_else(|| Error::parse(format!("notAfter {} is out of range", not_after)))?;

    Ok(CertificateMetadata {
        subject: subject_fields(certificate.subject())?,
        dns_names,
        ip_addresses,
        expiration_date,
        serial_number: format!("{:x}", certificate.serial),
        issuer: certificate.issuer().to_string(),
    })
}

fn subject_fields(name: &X509Name<'_>) -> Result<SubjectFields> {
    fn first<'a, 'b: 'a>(
        mut values: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>,
    ) -> Result<String> {
        values.next().map_or_else(|| Ok(String::new()), attribute_text)
    }

    Ok(SubjectFields {
        country_name: first(name.iter_country())?,
        state_or_province_name: first(name.iter_state_or_province())?,
        locality_name: first(name.iter_locality())?,
        organization_name: first(name.iter_organization())?,
        organizational_unit_name: first(name.iter_organizational_unit())?,
        common_name: first(name.iter_common_name())?,
        email_address: first(name.iter_email())?,
    })
}

/// Attribute value as text. BMPString is UTF-16BE and UniversalString UTF-32BE.
fn attribute_text(attr: &AttributeTypeAndValue<'_>) -> Result<String> {
    let value = attr.attr_value();
    let unreadable = || {
        Error::parse(format!(
            "subject attribute {} is not a readable string",
            attr.attr_type()
        ))
    };

    match value.header.tag() {
        Tag::BmpString => {
            if value.data.len() % 2 != 0 {
                return Err(unreadable());
            }
            let units = value
                .data
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
            char::decode_utf16(units)
                .collect::<std::result::Result<String, _>>()
                .map_err(|_| unreadable())
        }
        Tag::UniversalString => {
            if value.data.len() % 4 != 0 {
                return Err(unreadable());
            }
            value
                .data
                .chunks_exact(4)
                .map(|quad| u32::from_be_bytes([quad[0], quad[1], quad[2], quad[3]]))
                .map(char::from_u32)
                .collect::<Option<String>>()
                .ok_or_else(unreadable)
        }
        _ => attr.as_str().map(str::to_string).map_err(|_| unreadable()),
    }
}

/// DNS names and textual IP addresses; both empty when the extension is absent.
fn subject_alt_names(certificate: &X509Certificate<'_>) -> Result<(Vec<String>, Vec<String>)> {
    let mut dns_names = Vec::new();
    let mut ip_addresses = Vec::new();

    let extension = certificate
        .subject_alternative_name()
        .map_err(|e| Error::parse(format!("invalid subjectAltName extension: {}", e)))?;

    let Some(extension) = extension else {
        return Ok((dns_names, ip_addresses));
    };

    for name in &extension.value.general_names {
        match name {
            GeneralName::DNSName(dns) => dns_names.push(dns.to_string()),
            GeneralName::IPAddress(bytes) => ip_addresses.push(render_ip(bytes)?),
            _ => {}
        }
    }

    Ok((dns_names, ip_addresses))
}

fn render_ip(bytes: &[u8]) -> Result<String> {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        Ok(Ipv4Addr::from(octets).to_string())
    } else if let Ok(octets) = <[u8; 16]>::try_from(bytes) {
        Ok(Ipv6Addr::from(octets).to_string())
    } else {
        Err(Error::parse(format!(
            "subjectAltName IP address has invalid length {}",
            bytes.len()
        )))
    }
}
