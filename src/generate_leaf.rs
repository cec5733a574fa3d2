//! Leaf Certificate Generation Module
//!
//! Generates end-entity TLS certificates signed by one of the stored CAs.
//!
//! ```text
//! CA (self-signed)
//!   └── Leaf (signed by CA) ← This module
//! ```
//!
//! # Certificate Properties
//! - **Basic Constraints**: CA=false, critical
//! - **Key Usage**: digitalSignature, keyEncipherment, critical
//! - **Extended Key Usage**: serverAuth, clientAuth, critical
//! - **Subject/Authority Key Identifier**: own key id, and the issuing CA's key id
//! - **Subject Alternative Name**: DNS names and IP addresses
//! - **Key**: RSA 2048-bit, SHA-256 signature by the CA key
//!
//! # Example
//! ```rust,no_run
//! # use anyhow::Result;
//! # use chrono::{Duration, Utc};
//! # use openssl::pkey::{PKey, Private};
//! # use openssl::x509::X509;
//! # use pki_keeper::extensions::GeneralName;
//! # use pki_keeper::generate_leaf::RsaLeafBuilder;
//! # fn example(ca_key: PKey<Private>, ca_cert: X509, ca_key_id: Vec<u8>) -> Result<()> {
//! let now = Utc::now();
//! let (leaf_key, leaf_cert) = RsaLeafBuilder::new(ca_key, ca_cert)
//!     .subject_common_name("nas.home.arpa".to_string())
//!     .subject_alt_names(vec![GeneralName::classify("nas.home.arpa")])
//!     .authority_key_id(ca_key_id)
//!     .not_before(now)
//!     .not_after(now + Duration::days(398))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509Name, X509};

use crate::extensions::{self, GeneralName, KeyUsage};
use crate::generate_root_ca::{SERIAL_NUMBER_BITS, X509_VERSION_3};
use crate::keys::generate_keypair;

// ================= RSA Leaf Key Pair Builder =================

/// Builder for an RSA key pair and a leaf certificate signed by a CA
///
/// The CA's private key and certificate are supplied up front. The validity window
/// is taken as given; clamping it to the CA's lifetime is the caller's job.
pub struct RsaLeafBuilder {
    subject_common_name: String,
    subject_alt_names: Vec<GeneralName>,
    authority_key_id: Vec<u8>,
    not_before: Option<DateTime<Utc>>,
    not_after: Option<DateTime<Utc>>,
    signing_key: PKey<Private>,
    signing_cert: X509,
}

impl RsaLeafBuilder {
    /// Create a new leaf builder
    ///
    /// # Arguments
    /// * `ca_key` - CA private key used for signing
    /// * `ca_cert` - CA certificate, the source of the issuer name
    pub fn new(ca_key: PKey<Private>, ca_cert: X509) -> Self {
        Self {
            subject_common_name: String::new(),
            subject_alt_names: Vec::new(),
            authority_key_id: Vec::new(),
            not_before: None,
            not_after: None,
            signing_key: ca_key,
            signing_cert: ca_cert,
        }
    }

    pub fn subject_common_name(mut self, cn: String) -> Self {
        self.subject_common_name = cn;
        self
    }

    /// Names for the SAN extension, in the order they should appear
    pub fn subject_alt_names(mut self, names: Vec<GeneralName>) -> Self {
        self.subject_alt_names = names;
        self
    }

    /// The issuing CA's subject key identifier
    pub fn authority_key_id(mut self, key_id: Vec<u8>) -> Self {
        self.authority_key_id = key_id;
        self
    }

    pub fn not_before(mut self, not_before: DateTime<Utc>) -> Self {
        self.not_before = Some(not_before);
        self
    }

    pub fn not_after(mut self, not_after: DateTime<Utc>) -> Self {
        self.not_after = Some(not_after);
        self
    }

    /// Build the RSA key pair and the CA-signed leaf certificate
    ///
    /// # Errors
    /// Returns error if:
    /// - The common name, SAN list, authority key id or a validity bound is missing
    /// - RSA key generation fails
    /// - Certificate signing fails
    pub fn build(self) -> Result<(PKey<Private>, X509)> {
        if self.subject_common_name.is_empty() {
            return Err(anyhow!("Common name is required"));
        }
        if self.subject_alt_names.is_empty() {
            return Err(anyhow!("At least one subject alternative name is required"));
        }
        if self.authority_key_id.is_empty() {
            return Err(anyhow!("Authority key identifier is required"));
        }
        let not_before = self
            .not_before
            .ok_or_else(|| anyhow!("not_before is required"))?;
        let not_after = self
            .not_after
            .ok_or_else(|| anyhow!("not_after is required"))?;

        let private_key = generate_keypair()?;

        let mut builder =
            X509::builder().map_err(|e| anyhow!("Failed to create X509 builder: {}", e))?;

        builder
            .set_version(X509_VERSION_3)
            .map_err(|e| anyhow!("Failed to set version: {}", e))?;

        // Random 128-bit serial number
        let mut serial = BigNum::new()?;
        serial.rand(SERIAL_NUMBER_BITS, MsbOption::MAYBE_ZERO, false)?;
        let asn1_serial = serial.to_asn1_integer()?;
        builder.set_serial_number(&asn1_serial)?;

        let mut name_builder =
            X509Name::builder().map_err(|e| anyhow!("Failed to create name builder: {}", e))?;
        name_builder
            .append_entry_by_nid(Nid::COMMONNAME, &self.subject_common_name)
            .map_err(|e| anyhow!("Failed to set CN: {}", e))?;
        let subject_name = name_builder.build();

        builder
            .set_subject_name(&subject_name)
            .map_err(|e| anyhow!("Failed to set subject: {}", e))?;

        // Issuer is the CA's subject
        builder
            .set_issuer_name(self.signing_cert.subject_name())
            .map_err(|e| anyhow!("Failed to set issuer from CA: {}", e))?;

        let not_before = Asn1Time::from_unix(not_before.timestamp())
            .map_err(|e| anyhow!("Failed to create not_before: {}", e))?;
        builder
            .set_not_before(&not_before)
            .map_err(|e| anyhow!("Failed to set not_before: {}", e))?;

        let not_after = Asn1Time::from_unix(not_after.timestamp())
            .map_err(|e| anyhow!("Failed to create not_after: {}", e))?;
        builder
            .set_not_after(&not_after)
            .map_err(|e| anyhow!("Failed to set not_after: {}", e))?;

        builder
            .set_pubkey(&private_key)
            .map_err(|e| anyhow!("Failed to set public key: {}", e))?;

        let certificate_extensions = [
            extensions::encode_basic_constraints(false, None),
            extensions::encode_key_usage(KeyUsage::DIGITAL_SIGNATURE | KeyUsage::KEY_ENCIPHERMENT),
            extensions::encode_extended_key_usage(
                &[extensions::OID_SERVER_AUTH, extensions::OID_CLIENT_AUTH],
                true,
            )?,
            extensions::encode_subject_key_identifier(&private_key)?,
            extensions::encode_authority_key_identifier(&self.authority_key_id),
            extensions::encode_subject_alternative_name(&self.subject_alt_names),
        ];
        for extension in &certificate_extensions {
            let x509_extension = extension
                .to_x509_extension()
                .map_err(|e| anyhow!("Failed to build extension {}: {}", extension.oid, e))?;
            builder
                .append_extension(x509_extension)
                .map_err(|e| anyhow!("Failed to add extension {}: {}", extension.oid, e))?;
        }

        // Sign with the CA's private key
        builder
            .sign(&self.signing_key, MessageDigest::sha256())
            .map_err(|e| anyhow!("Failed to sign certificate: {}", e))?;

        let x509 = builder.build();

        Ok((private_key, x509))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_root_ca::RsaRootCABuilder;
    use chrono::Duration;

    fn ca() -> (PKey<Private>, X509) {
        let now = Utc::now();
        RsaRootCABuilder::new()
            .subject_common_name("Leaf Test CA".to_string())
            .not_before(now)
            .not_after(now + Duration::days(30))
            .build()
            .unwrap()
    }

    #[test]
    fn test_leaf_signed_by_ca() {
        let (ca_key, ca_cert) = ca();
        let now = Utc::now();
        let (leaf_key, leaf_cert) = RsaLeafBuilder::new(ca_key.clone(), ca_cert.clone())
            .subject_common_name("svc.example".to_string())
            .subject_alt_names(vec![GeneralName::classify("svc.example")])
            .authority_key_id(vec![0xAB; 20])
            .not_before(now)
            .not_after(now + Duration::days(7))
            .build()
            .unwrap();

        assert!(leaf_cert.verify(&ca_key).unwrap());
        assert_eq!(
            leaf_cert.issuer_name().to_der().unwrap(),
            ca_cert.subject_name().to_der().unwrap()
        );
        assert!(leaf_cert.public_key().unwrap().public_eq(&leaf_key));
    }

    #[test]
    fn test_missing_authority_key_id_rejected() {
        let (ca_key, ca_cert) = ca();
        let now = Utc::now();
        let result = RsaLeafBuilder::new(ca_key, ca_cert)
            .subject_common_name("svc.example".to_string())
            .subject_alt_names(vec![GeneralName::classify("svc.example")])
            .not_before(now)
            .not_after(now)
            .build();
        assert!(result.is_err());
    }
}
