//! Read-only view of a stored X.509 certificate.
//!
//! The DER is parsed with `x509-parser`. Basic Constraints, Key Usage, Extended Key
//! Usage and the Subject Key Identifier come from its parsed extensions; the Authority
//! Key Identifier and Subject Alternative Name are decoded with [`crate::extensions`].
//! Malformed extensions read as absent.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use openssl::x509::X509;
use serde::Serialize;
use x509_parser::prelude::*;

use crate::extensions::{self, GeneralName, KeyUsage};
use crate::keys::{pem_encode, CERTIFICATE_LABEL};
use crate::subject::escape_attribute_value;

/// Short names for the attribute types rendered in a subject string.
const ATTRIBUTE_NAMES: &[(&str, &str)] = &[
    ("2.5.4.3", "CN"),
    ("2.5.4.6", "C"),
    ("2.5.4.7", "L"),
    ("2.5.4.8", "ST"),
    ("2.5.4.9", "STREET"),
    ("2.5.4.10", "O"),
    ("2.5.4.11", "OU"),
    ("0.9.2342.19200300.100.1.1", "UID"),
    ("0.9.2342.19200300.100.1.25", "DC"),
];

const OID_ANY_EXTENDED_KEY_USAGE: &str = "2.5.29.37.0";
const OID_CODE_SIGNING: &str = "1.3.6.1.5.5.7.3.3";
const OID_EMAIL_PROTECTION: &str = "1.3.6.1.5.5.7.3.4";
const OID_TIME_STAMPING: &str = "1.3.6.1.5.5.7.3.8";
const OID_OCSP_SIGNING: &str = "1.3.6.1.5.5.7.3.9";

#[derive(Debug, Clone)]
pub struct Certificate {
    x509: X509,
    der: Vec<u8>,
    fingerprint: String,
    subject: String,
    common_name: Option<String>,
    serial: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    is_ca: bool,
    path_len: Option<u32>,
    key_usage: Option<KeyUsage>,
    extended_key_usage: Vec<String>,
    subject_key_id: Option<String>,
    authority_key_id: Option<String>,
    subject_alt_names: Option<Vec<GeneralName>>,
}

/// Display metadata for one certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateInfo {
    pub subject: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_alt_name: Option<Vec<String>>,
}

/// Upper-case hex SHA-1 of the DER encoding.
pub fn fingerprint_of(der: &[u8]) -> String {
    hex::encode_upper(openssl::sha::sha1(der))
}

/// Fingerprints are compared in upper case.
pub fn normalize_fingerprint(fingerprint: &str) -> String {
    fingerprint.trim().to_ascii_uppercase()
}

impl Certificate {
    pub fn from_x509(x509: X509) -> Result<Self> {
        let der = x509
            .to_der()
            .map_err(|e| anyhow!("Failed to encode certificate: {}", e))?;
        let (_, parsed) = parse_x509_certificate(&der)
            .map_err(|e| anyhow!("Failed to parse certificate: {}", e))?;

        let subject = render_name(parsed.subject());
        let common_name = parsed
            .subject()
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(str::to_string);
        let not_before = to_utc(parsed.validity().not_before.timestamp())?;
        let not_after = to_utc(parsed.validity().not_after.timestamp())?;
        let serial = hex::encode_upper(parsed.tbs_certificate.raw_serial());

        let mut is_ca = false;
        let mut path_len = None;
        let mut key_usage = None;
        let mut extended_key_usage = Vec::new();
        let mut subject_key_id = None;
        let mut authority_key_id = None;
        let mut subject_alt_names = None;
        for ext in parsed.extensions() {
            match ext.parsed_extension() {
                ParsedExtension::BasicConstraints(constraints) => {
                    is_ca = constraints.ca;
                    path_len = constraints.path_len_constraint;
                }
                ParsedExtension::KeyUsage(usage) => key_usage = Some(key_usage_of(usage)),
                ParsedExtension::ExtendedKeyUsage(usage) => {
                    extended_key_usage = purposes_of(usage);
                }
                ParsedExtension::SubjectKeyIdentifier(key_id) => {
                    subject_key_id = Some(hex::encode_upper(key_id.0));
                }
                _ => match ext.oid.to_id_string().as_str() {
                    extensions::OID_AUTHORITY_KEY_IDENTIFIER => {
                        authority_key_id = extensions::decode_authority_key_identifier(ext.value);
                    }
                    extensions::OID_SUBJECT_ALT_NAME => {
                        subject_alt_names = extensions::decode_subject_alternative_name(ext.value);
                    }
                    _ => {}
                },
            }
        }

        Ok(Certificate {
            fingerprint: fingerprint_of(&der),
            x509,
            der,
            subject,
            common_name,
            serial,
            not_before,
            not_after,
            is_ca,
            path_len,
            key_usage,
            extended_key_usage,
            subject_key_id,
            authority_key_id,
            subject_alt_names,
        })
    }

    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let x509 = X509::from_pem(pem).context("Failed to parse certificate PEM")?;
        Self::from_x509(x509)
    }

    pub fn x509(&self) -> &X509 {
        &self.x509
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn to_pem(&self) -> String {
        pem_encode(CERTIFICATE_LABEL, &self.der)
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Distinguished name as an RFC 4514 string, e.g. `CN=Acme\, Inc`.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    pub fn path_len(&self) -> Option<u32> {
        self.path_len
    }

    pub fn key_usage(&self) -> Option<KeyUsage> {
        self.key_usage
    }

    pub fn extended_key_usage(&self) -> &[String] {
        &self.extended_key_usage
    }

    /// Upper-case hex SKI, if the certificate carries one.
    pub fn subject_key_id(&self) -> Option<&str> {
        self.subject_key_id.as_deref()
    }

    /// Upper-case hex AKI key identifier, if the certificate carries one.
    pub fn authority_key_id(&self) -> Option<&str> {
        self.authority_key_id.as_deref()
    }

    pub fn subject_alt_names(&self) -> Option<&[GeneralName]> {
        self.subject_alt_names.as_deref()
    }

    pub fn info(&self) -> CertificateInfo {
        CertificateInfo {
            subject: self.subject.clone(),
            not_before: self.not_before,
            not_after: self.not_after,
            fingerprint: self.fingerprint.clone(),
            subject_alt_name: self
                .subject_alt_names
                .as_ref()
                .map(|names| names.iter().map(ToString::to_string).collect()),
        }
    }
}

/// RDNs in certificate order joined with `, `; multi-valued RDNs use `+`. Values that
/// are not strings are written as `#` plus the hex of their content octets.
fn render_name(name: &X509Name<'_>) -> String {
    name.iter_rdn()
        .map(|rdn| {
            rdn.iter()
                .map(|attr| {
                    let oid = attr.attr_type().to_id_string();
                    let key = ATTRIBUTE_NAMES
                        .iter()
                        .find(|(id, _)| *id == oid)
                        .map_or(oid.as_str(), |&(_, short)| short);
                    match attr.as_str() {
                        Ok(value) => format!("{}={}", key, escape_attribute_value(value)),
                        Err(_) => format!(
                            "{}=#{}",
                            key,
                            hex::encode_upper(attr.attr_value().as_bytes())
                        ),
                    }
                })
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn key_usage_of(usage: &x509_parser::extensions::KeyUsage) -> KeyUsage {
    [
        (usage.digital_signature(), KeyUsage::DIGITAL_SIGNATURE),
        (usage.non_repudiation(), KeyUsage::NON_REPUDIATION),
        (usage.key_encipherment(), KeyUsage::KEY_ENCIPHERMENT),
        (usage.data_encipherment(), KeyUsage::DATA_ENCIPHERMENT),
        (usage.key_agreement(), KeyUsage::KEY_AGREEMENT),
        (usage.key_cert_sign(), KeyUsage::KEY_CERT_SIGN),
        (usage.crl_sign(), KeyUsage::CRL_SIGN),
        (usage.encipher_only(), KeyUsage::ENCIPHER_ONLY),
        (usage.decipher_only(), KeyUsage::DECIPHER_ONLY),
    ]
    .into_iter()
    .filter(|(set, _)| *set)
    .fold(KeyUsage::default(), |acc, (_, bit)| acc | bit)
}

/// Purpose OIDs in dotted form; the well-known ones first, then any others.
fn purposes_of(usage: &x509_parser::extensions::ExtendedKeyUsage<'_>) -> Vec<String> {
    [
        (usage.any, OID_ANY_EXTENDED_KEY_USAGE),
        (usage.server_auth, extensions::OID_SERVER_AUTH),
        (usage.client_auth, extensions::OID_CLIENT_AUTH),
        (usage.code_signing, OID_CODE_SIGNING),
        (usage.email_protection, OID_EMAIL_PROTECTION),
        (usage.time_stamping, OID_TIME_STAMPING),
        (usage.ocsp_signing, OID_OCSP_SIGNING),
    ]
    .into_iter()
    .filter(|(set, _)| *set)
    .map(|(_, oid)| oid.to_string())
    .chain(usage.other.iter().map(|oid| oid.to_id_string()))
    .collect()
}

fn to_utc(timestamp: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| anyhow!("Certificate time out of range: {}", timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_leaf::RsaLeafBuilder;
    use crate::generate_root_ca::RsaRootCABuilder;
    use crate::subject::{subject_alt_names, CommonName};
    use chrono::{Duration, SubsecRound};

    fn root(cn: &str) -> (openssl::pkey::PKey<openssl::pkey::Private>, Certificate) {
        let now = Utc::now().trunc_subsecs(0);
        let (key, x509) = RsaRootCABuilder::new()
            .subject_common_name(cn.to_string())
            .not_before(now)
            .not_after(now + Duration::days(10))
            .build()
            .unwrap();
        (key, Certificate::from_x509(x509).unwrap())
    }

    #[test]
    fn test_authority_fields() {
        let (_, ca) = root("Root");
        assert_eq!(ca.subject(), "CN=Root");
        assert_eq!(ca.common_name(), Some("Root"));
        assert!(ca.is_ca());
        assert_eq!(ca.path_len(), None);
        assert_eq!(
            ca.key_usage(),
            Some(KeyUsage::KEY_CERT_SIGN | KeyUsage::CRL_SIGN)
        );
        assert_eq!(ca.subject_key_id().map(str::len), Some(40));
        assert!(ca.authority_key_id().is_none());
        assert!(ca.subject_alt_names().is_none());
        assert_eq!(ca.not_after() - ca.not_before(), Duration::days(10));
        assert_eq!(ca.fingerprint().len(), 40);
        assert_eq!(ca.fingerprint(), fingerprint_of(ca.der()));
    }

    #[test]
    fn test_leaf_fields_and_info() {
        let (ca_key, ca) = root("Issuer");
        let cn = CommonName::parse("host.example").unwrap();
        let names = subject_alt_names(&cn, &["10.0.0.7".to_string()]).unwrap();
        let (_, x509) = RsaLeafBuilder::new(ca_key, ca.x509().clone())
            .subject_common_name(cn.as_str().to_string())
            .subject_alt_names(names)
            .authority_key_id(hex::decode(ca.subject_key_id().unwrap()).unwrap())
            .not_before(ca.not_before())
            .not_after(ca.not_after())
            .build()
            .unwrap();
        let leaf = Certificate::from_x509(x509).unwrap();

        assert!(!leaf.is_ca());
        assert_eq!(leaf.authority_key_id(), ca.subject_key_id());
        assert_ne!(leaf.subject_key_id(), ca.subject_key_id());
        assert_eq!(
            leaf.extended_key_usage(),
            &[
                extensions::OID_SERVER_AUTH.to_string(),
                extensions::OID_CLIENT_AUTH.to_string()
            ]
        );

        let info = leaf.info();
        assert_eq!(
            info.subject_alt_name,
            Some(vec!["DNS:host.example".to_string(), "IP:10.0.0.7".to_string()])
        );
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["subject"], "CN=host.example");
        assert!(json.get("notBefore").is_some());
        assert!(json.get("notAfter").is_some());
        assert_eq!(json["fingerprint"], leaf.fingerprint());
        assert_eq!(json["subjectAltName"][1], "IP:10.0.0.7");
    }

    #[test]
    fn test_info_omits_missing_san() {
        let (_, ca) = root("NoSan");
        let json = serde_json::to_value(ca.info()).unwrap();
        assert!(json.get("subjectAltName").is_none());
    }

    #[test]
    fn test_pem_round_trip_keeps_fingerprint() {
        let (_, ca) = root("Pem Root");
        let reparsed = Certificate::from_pem(ca.to_pem().as_bytes()).unwrap();
        assert_eq!(reparsed.fingerprint(), ca.fingerprint());
    }

    #[test]
    fn test_subject_escapes_separators() {
        let (_, ca) = root("Acme, Inc Root");
        assert_eq!(ca.common_name(), Some("Acme, Inc Root"));
        assert_eq!(ca.subject(), "CN=Acme\\, Inc Root");
        assert_eq!(ca.info().subject, ca.subject());
    }

    #[test]
    fn test_normalize_fingerprint() {
        assert_eq!(normalize_fingerprint(" ab12 "), "AB12");
    }
}
