//! Certificate request building.
//!
//! Turns an [`IdentityRequest`] into the canonical data a signer needs: the
//! ordered distinguished name, the subject-alternative-name list and the
//! validity window. Everything here is pure; no key material is touched, so a
//! rejected request never costs a key generation.

use std::net::Ipv4Addr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// The seven identity attributes of a certificate subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectFields {
    #[serde(default)]
    pub country_name: String,
    #[serde(default)]
    pub state_or_province_name: String,
    #[serde(default)]
    pub locality_name: String,
    #[serde(default)]
    pub organization_name: String,
    #[serde(default)]
    pub organizational_unit_name: String,
    #[serde(default)]
    pub common_name: String,
    #[serde(default)]
    pub email_address: String,
}

/// An identity to issue a certificate for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRequest {
    #[serde(flatten)]
    pub subject: SubjectFields,
    #[serde(default, alias = "domain_names")]
    pub dns_names: Vec<String>,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    /// Requested expiration; must lie in the future
    pub expiration_date: DateTime<Utc>,
}

/// Distinguished-name attributes in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnAttribute {
    Country,
    StateOrProvince,
    Locality,
    Organization,
    OrganizationalUnit,
    Email,
    CommonName,
}

impl DnAttribute {
    /// Attribute short name as used in OpenSSL `-subj` strings.
    pub fn short_name(&self) -> &'static str {
        match self {
            DnAttribute::Country => "C",
            DnAttribute::StateOrProvince => "ST",
            DnAttribute::Locality => "L",
            DnAttribute::Organization => "O",
            DnAttribute::OrganizationalUnit => "OU",
            DnAttribute::Email => "emailAddress",
            DnAttribute::CommonName => "CN",
        }
    }

    /// Dotted object identifier of the attribute type.
    pub fn oid(&self) -> &'static [u64] {
        match self {
            DnAttribute::Country => &[2, 5, 4, 6],
            DnAttribute::StateOrProvince => &[2, 5, 4, 8],
            DnAttribute::Locality => &[2, 5, 4, 7],
            DnAttribute::Organization => &[2, 5, 4, 10],
            DnAttribute::OrganizationalUnit => &[2, 5, 4, 11],
            DnAttribute::Email => &[1, 2, 840, 113549, 1, 9, 1],
            DnAttribute::CommonName => &[2, 5, 4, 3],
        }
    }
}

/// Ordered subject name. Empty attributes are not carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    entries: Vec<(DnAttribute, String)>,
}

impl DistinguishedName {
    /// Fixed order: C, ST, L, O, OU, emailAddress, CN.
    fn from_subject(subject: &SubjectFields) -> Self {
        let ordered = [
            (DnAttribute::Country, &subject.country_name),
            (DnAttribute::StateOrProvince, &subject.state_or_province_name),
            (DnAttribute::Locality, &subject.locality_name),
            (DnAttribute::Organization, &subject.organization_name),
            (DnAttribute::OrganizationalUnit, &subject.organizational_unit_name),
            (DnAttribute::Email, &subject.email_address),
            (DnAttribute::CommonName, &subject.common_name),
        ];

        let entries = ordered
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(attribute, value)| (attribute, value.clone()))
            .collect();

        Self { entries }
    }

    pub fn entries(&self) -> &[(DnAttribute, String)] {
        &self.entries
    }

    /// Render as an OpenSSL `-subj` argument.
    ///
    /// `/` separates attributes and `+` joins multi-valued RDNs in that
    /// syntax, so both are escaped in values along with `=` and `\`.
    pub fn to_openssl_subject(&self) -> String {
        if self.entries.is_empty() {
            return "/".to_string();
        }

        let mut rendered = String::new();
        for (attribute, value) in &self.entries {
            rendered.push('/');
            rendered.push_str(attribute.short_name());
            rendered.push('=');
            for c in value.chars() {
                if matches!(c, '\\' | '/' | '+' | '=') {
                    rendered.push('\\');
                }
                rendered.push(c);
            }
        }
        rendered
    }
}

/// One subject-alternative-name entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanEntry {
    Dns(String),
    Ip(Ipv4Addr),
}

/// Certificate validity bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Whole days between the bounds
    pub days: i64,
}

/// Canonical, validated input for a signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    pub subject: DistinguishedName,
    pub subject_alt_names: Vec<SanEntry>,
    pub validity: ValidityWindow,
}

impl CertificateRequest {
    /// True when the SAN extension should be emitted at all.
    pub fn has_subject_alt_names(&self) -> bool {
        !self.subject_alt_names.is_empty()
    }
}

/// Build a signer request, using the current time as `notBefore`.
pub fn build(request: &IdentityRequest) -> Result<CertificateRequest> {
    build_at(request, Utc::now())
}

/// Build a signer request relative to an explicit issuance instant.
pub fn build_at(request: &IdentityRequest, now: DateTime<Utc>) -> Result<CertificateRequest> {
    validate_subject(&request.subject)?;

    let validity = validity_window(request.expiration_date, now)?;

    let mut subject_alt_names =
        Vec::with_capacity(request.dns_names.len() + request.ip_addresses.len());
    for name in &request.dns_names {
        subject_alt_names.push(SanEntry::Dns(parse_dns_name(name)?));
    }
    for address in &request.ip_addresses {
        subject_alt_names.push(SanEntry::Ip(parse_ipv4(address)?));
    }

    Ok(CertificateRequest {
        subject: DistinguishedName::from_subject(&request.subject),
        subject_alt_names,
        validity,
    })
}

/// `notAfter = now + floor(expiration - now)` days; zero or fewer days is rejected.
pub fn validity_window(expiration: DateTime<Utc>, now: DateTime<Utc>) -> Result<ValidityWindow> {
    let remaining = expiration - now;
    let days = if remaining <= Duration::zero() {
        0
    } else {
        remaining.num_days()
    };

    if days <= 0 {
        return Err(Error::validation_field("expiration must be in the future", "expiration_date"));
    }

    Ok(ValidityWindow {
        not_before: now,
        not_after: now + Duration::days(days),
        days,
    })
}

fn validate_subject(subject: &SubjectFields) -> Result<()> {
    let country = &subject.country_name;
    if !country.is_empty() && (country.chars().count() != 2 || !country.is_ascii()) {
        return Err(Error::validation_field(
            format!("country name '{}' must be a two-letter code", country),
            "country_name",
        ));
    }

    if !subject.email_address.is_ascii() {
        return Err(Error::validation_field("email address must be ASCII", "email_address"));
    }

    Ok(())
}

/// Characters with meaning inside an OpenSSL config value.
const CONFIG_SPECIAL_CHARS: &[char] = &['#', '$', '"', '\'', '\\', ','];

fn parse_dns_name(name: &str) -> Result<String> {
    let valid = !name.is_empty()
        && name.is_ascii()
        && !name.chars().any(|c| {
            c.is_ascii_whitespace() || c.is_ascii_control() || CONFIG_SPECIAL_CHARS.contains(&c)
        });

    if valid {
        Ok(name.to_string())
    } else {
        Err(Error::validation_field(format!("invalid DNS name '{}'", name), "dns_names"))
    }
}

fn parse_ipv4(address: &str) -> Result<Ipv4Addr> {
    address.parse::<Ipv4Addr>().map_err(|_| {
        Error::validation_field(
            format!("'{}' is not a dotted-decimal IPv4 address", address),
            "ip_addresses",
        )
    })
}
