//! X.509v3 Extension Codec
//!
//! Encodes and decodes the extensions this PKI relies on, at the DER level:
//!
//! | Extension | OID | Critical |
//! |---|---|---|
//! | Basic Constraints | 2.5.29.19 | yes |
//! | Key Usage | 2.5.29.15 | yes |
//! | Extended Key Usage | 2.5.29.37 | yes on leaves |
//! | Subject Key Identifier | 2.5.29.14 | no |
//! | Authority Key Identifier | 2.5.29.35 | no |
//! | Subject Alternative Name | 2.5.29.17 | no |
//!
//! Encoders return an [`Extension`] (OID, criticality, DER value) which converts into an
//! OpenSSL `X509Extension` for the certificate builder. The Authority Key Identifier and
//! Subject Alternative Name decoders walk the raw extension value with [`crate::der`]
//! and return `None` for anything malformed; callers treat that as "not present". The
//! remaining extensions are read back through `x509-parser` in [`crate::certificate`].

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::BitOr;

use anyhow::{anyhow, Result};
use openssl::asn1::{Asn1Object, Asn1OctetString};
use openssl::error::ErrorStack;
use openssl::pkey::{HasPublic, PKeyRef};
use openssl::x509::X509Extension;

use crate::der::{
    self, encode_bit_string, encode_boolean, encode_octet_string, encode_sequence, encode_tlv,
    encode_unsigned, DerError, DerReader, Tag,
};

pub const OID_SUBJECT_KEY_IDENTIFIER: &str = "2.5.29.14";
pub const OID_KEY_USAGE: &str = "2.5.29.15";
pub const OID_SUBJECT_ALT_NAME: &str = "2.5.29.17";
pub const OID_BASIC_CONSTRAINTS: &str = "2.5.29.19";
pub const OID_AUTHORITY_KEY_IDENTIFIER: &str = "2.5.29.35";
pub const OID_EXTENDED_KEY_USAGE: &str = "2.5.29.37";

pub const OID_SERVER_AUTH: &str = "1.3.6.1.5.5.7.3.1";
pub const OID_CLIENT_AUTH: &str = "1.3.6.1.5.5.7.3.2";

const GENERAL_NAME_DNS: u32 = 2;
const GENERAL_NAME_IP: u32 = 7;

/// A single encoded extension, ready to be attached to a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub oid: &'static str,
    pub critical: bool,
    pub value: Vec<u8>,
}

impl Extension {
    pub fn to_x509_extension(&self) -> Result<X509Extension, ErrorStack> {
        let oid = Asn1Object::from_str(self.oid)?;
        let contents = Asn1OctetString::new_from_bytes(&self.value)?;
        X509Extension::new_from_der(&oid, self.critical, &contents)
    }
}

/// Key Usage bits, stored in bit-string order (bit 0 is the most significant bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyUsage(u16);

impl KeyUsage {
    pub const DIGITAL_SIGNATURE: KeyUsage = KeyUsage(0x8000);
    pub const NON_REPUDIATION: KeyUsage = KeyUsage(0x4000);
    pub const KEY_ENCIPHERMENT: KeyUsage = KeyUsage(0x2000);
    pub const DATA_ENCIPHERMENT: KeyUsage = KeyUsage(0x1000);
    pub const KEY_AGREEMENT: KeyUsage = KeyUsage(0x0800);
    pub const KEY_CERT_SIGN: KeyUsage = KeyUsage(0x0400);
    pub const CRL_SIGN: KeyUsage = KeyUsage(0x0200);
    pub const ENCIPHER_ONLY: KeyUsage = KeyUsage(0x0100);
    pub const DECIPHER_ONLY: KeyUsage = KeyUsage(0x0080);

    pub fn contains(&self, other: KeyUsage) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for KeyUsage {
    type Output = KeyUsage;

    fn bitor(self, rhs: KeyUsage) -> KeyUsage {
        KeyUsage(self.0 | rhs.0)
    }
}

/// One entry of a Subject Alternative Name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneralName {
    Dns(String),
    Ip(IpAddr),
    /// Any other context-specific choice, kept as raw content octets.
    Other { tag: u32, value: Vec<u8> },
}

impl GeneralName {
    /// IP literals become `iPAddress` names, everything else a `dNSName`.
    pub fn classify(name: &str) -> Self {
        match name.parse::<IpAddr>() {
            Ok(addr) => GeneralName::Ip(addr),
            Err(_) => GeneralName::Dns(name.to_string()),
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            GeneralName::Dns(name) => {
                encode_tlv(Tag::context(GENERAL_NAME_DNS, false), name.as_bytes())
            }
            GeneralName::Ip(IpAddr::V4(addr)) => {
                encode_tlv(Tag::context(GENERAL_NAME_IP, false), &addr.octets())
            }
            GeneralName::Ip(IpAddr::V6(addr)) => {
                encode_tlv(Tag::context(GENERAL_NAME_IP, false), &addr.octets())
            }
            GeneralName::Other { tag, value } => encode_tlv(Tag::context(*tag, false), value),
        }
    }

    fn decode(tag: u32, value: &[u8]) -> Self {
        match (tag, value.len()) {
            (GENERAL_NAME_DNS, _) => GeneralName::Dns(String::from_utf8_lossy(value).into_owned()),
            (GENERAL_NAME_IP, 4) => {
                let mut octets = [0u8; 4];
                octets.copy_from_slice(value);
                GeneralName::Ip(IpAddr::V4(Ipv4Addr::from(octets)))
            }
            (GENERAL_NAME_IP, 16) => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(value);
                GeneralName::Ip(IpAddr::V6(Ipv6Addr::from(octets)))
            }
            _ => GeneralName::Other {
                tag,
                value: value.to_vec(),
            },
        }
    }
}

impl fmt::Display for GeneralName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneralName::Dns(name) => write!(f, "DNS:{}", name),
            GeneralName::Ip(addr) => write!(f, "IP:{}", addr),
            GeneralName::Other { tag, value } => {
                write!(f, "[{}]:{}", tag, hex::encode_upper(value))
            }
        }
    }
}

// ================= Encoders =================

pub fn encode_basic_constraints(is_ca: bool, path_len: Option<u32>) -> Extension {
    let mut fields = Vec::new();
    // cA is DEFAULT FALSE and must be omitted when false
    if is_ca {
        fields.push(encode_boolean(true));
    }
    if let Some(len) = path_len {
        fields.push(encode_unsigned(len));
    }
    Extension {
        oid: OID_BASIC_CONSTRAINTS,
        critical: true,
        value: encode_sequence(&fields),
    }
}

pub fn encode_key_usage(flags: KeyUsage) -> Extension {
    let bytes = flags.0.to_be_bytes();
    let len = if bytes[1] != 0 {
        2
    } else if bytes[0] != 0 {
        1
    } else {
        0
    };
    let unused = if len == 0 {
        0
    } else {
        bytes[len - 1].trailing_zeros() as u8
    };
    Extension {
        oid: OID_KEY_USAGE,
        critical: true,
        value: encode_bit_string(unused, &bytes[..len]),
    }
}

pub fn encode_extended_key_usage(oids: &[&str], critical: bool) -> Result<Extension, DerError> {
    let purposes = oids
        .iter()
        .map(|oid| der::encode_oid(oid))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Extension {
        oid: OID_EXTENDED_KEY_USAGE,
        critical,
        value: encode_sequence(&purposes),
    })
}

/// Subject Key Identifier: SHA-1 over the subjectPublicKey bits (RFC 5280 §4.2.1.2, method 1).
pub fn encode_subject_key_identifier<T: HasPublic>(public_key: &PKeyRef<T>) -> Result<Extension> {
    let spki = public_key
        .public_key_to_der()
        .map_err(|e| anyhow!("Failed to encode public key: {}", e))?;
    let key_id = key_identifier(&spki)
        .ok_or_else(|| anyhow!("Malformed SubjectPublicKeyInfo"))?;
    Ok(Extension {
        oid: OID_SUBJECT_KEY_IDENTIFIER,
        critical: false,
        value: encode_octet_string(&key_id),
    })
}

pub fn encode_authority_key_identifier(key_id: &[u8]) -> Extension {
    let key_identifier = encode_tlv(Tag::context(0, false), key_id);
    Extension {
        oid: OID_AUTHORITY_KEY_IDENTIFIER,
        critical: false,
        value: encode_sequence(&[key_identifier]),
    }
}

pub fn encode_subject_alternative_name(names: &[GeneralName]) -> Extension {
    let entries: Vec<Vec<u8>> = names.iter().map(GeneralName::encode).collect();
    Extension {
        oid: OID_SUBJECT_ALT_NAME,
        critical: false,
        value: encode_sequence(&entries),
    }
}

/// Digest of the public key bits carried in a DER SubjectPublicKeyInfo.
pub fn key_identifier(spki_der: &[u8]) -> Option<Vec<u8>> {
    let mut spki = DerReader::new(spki_der).read_sequence().ok()?;
    spki.read_expected(Tag::SEQUENCE).ok()?;
    let bits = spki.read_expected(Tag::BIT_STRING).ok()?;
    let (_unused, key) = bits.split_first()?;
    Some(openssl::sha::sha1(key).to_vec())
}

// ================= Decoders =================

/// Hex-encoded `[0] keyIdentifier` of an Authority Key Identifier extension.
///
/// The identifier sits inside a SEQUENCE next to optional issuer/serial fields, so the
/// sequence is walked value by value until the context-specific tag 0 shows up.
pub fn decode_authority_key_identifier(value: &[u8]) -> Option<String> {
    let fields = DerReader::new(value).read_sequence().ok()?;
    for field in fields.values() {
        let field = field.ok()?;
        if field.tag.is_context(0) {
            if field.value.is_empty() {
                return None;
            }
            return Some(hex::encode_upper(field.value));
        }
    }
    None
}

pub fn decode_subject_alternative_name(value: &[u8]) -> Option<Vec<GeneralName>> {
    let names = DerReader::new(value).read_sequence().ok()?;
    let mut decoded = Vec::new();
    for name in names.values() {
        let name = name.ok()?;
        if name.tag.class != der::TagClass::ContextSpecific {
            continue;
        }
        decoded.push(GeneralName::decode(name.tag.number, name.value));
    }
    Some(decoded)
}
