//! Self-signed Certificate Authority generation
//!
//! Every CA in this PKI is a self-signed root; there is no intermediate tier.
//!
//! ```text
//! CA (self-signed) ← This module
//!   └── Leaf (signed by CA)
//! ```
//!
//! # Certificate Properties
//! - **Subject**: a single Common Name, also used as the issuer
//! - **Basic Constraints**: CA=true, no path length constraint, critical
//! - **Key Usage**: keyCertSign, cRLSign, critical
//! - **Subject Key Identifier**: SHA-1 of the public key bits
//! - **Key**: RSA 2048-bit, SHA-256 signature
//!
//! # Example
//! ```rust,no_run
//! # use anyhow::Result;
//! # use chrono::{Duration, Utc};
//! # use pki_keeper::generate_root_ca::RsaRootCABuilder;
//! # fn example() -> Result<()> {
//! let now = Utc::now();
//! let (ca_key, ca_cert) = RsaRootCABuilder::new()
//!     .subject_common_name("Home Lab CA".to_string())
//!     .not_before(now)
//!     .not_after(now + Duration::days(3653))
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

use crate::extensions::{self, KeyUsage};
use crate::keys::generate_keypair;

pub(crate) const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
pub(crate) const SERIAL_NUMBER_BITS: i32 = 128;

// ================= RSA CA Key and Certificate Builder =================

/// Builder for an RSA key pair and its self-signed CA certificate
///
/// The common name is taken as-is; callers validate it with
/// [`crate::subject::CommonName`] first. Both ends of the validity window must be set.
pub struct RsaRootCABuilder {
    subject_common_name: String,
    not_before: Option<DateTime<Utc>>,
    not_after: Option<DateTime<Utc>>,
}

impl RsaRootCABuilder {
    pub fn new() -> Self {
        Self {
            subject_common_name: String::new(),
            not_before: None,
            not_after: None,
        }
    }

    /// Set the common name (CN), the only attribute of the subject
    pub fn subject_common_name(mut self, cn: String) -> Self {
        self.subject_common_name = cn;
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

    /// Build the RSA key pair and self-signed CA certificate
    ///
    /// # Returns
    /// * `Ok((PKey<Private>, X509))` - Tuple of (private key, self-signed certificate)
    /// * `Err(anyhow::Error)` - If certificate generation fails
    ///
    /// # Errors
    /// Returns error if:
    /// - The common name or either validity bound is missing
    /// - RSA key generation fails
    /// - Certificate signing fails
    pub fn build(self) -> Result<(PKey<Private>, X509)> {
        if self.subject_common_name.is_empty() {
            return Err(anyhow!("Common name is required"));
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
        let name = name_builder.build();

        builder
            .set_subject_name(&name)
            .map_err(|e| anyhow!("Failed to set subject: {}", e))?;

        builder
            .set_issuer_name(&name)
            .map_err(|e| anyhow!("Failed to set issuer: {}", e))?;

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
            extensions::encode_basic_constraints(true, None),
            extensions::encode_key_usage(KeyUsage::KEY_CERT_SIGN | KeyUsage::CRL_SIGN),
            extensions::encode_subject_key_identifier(&private_key)?,
        ];
        for extension in &certificate_extensions {
            let x509_extension = extension
                .to_x509_extension()
                .map_err(|e| anyhow!("Failed to build extension {}: {}", extension.oid, e))?;
            builder
                .append_extension(x509_extension)
                .map_err(|e| anyhow!("Failed to add extension {}: {}", extension.oid, e))?;
        }

        builder
            .sign(&private_key, MessageDigest::sha256())
            .map_err(|e| anyhow!("Failed to sign certificate: {}", e))?;
        let x509 = builder.build();
        Ok((private_key, x509))
    }
}

impl Default for RsaRootCABuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_build_self_signed_ca() {
        let now = Utc::now();
        let (key, cert) = RsaRootCABuilder::new()
            .subject_common_name("Test CA".to_string())
            .not_before(now)
            .not_after(now + Duration::days(30))
            .build()
            .unwrap();

        assert!(cert.verify(&key).unwrap());
        assert!(cert.public_key().unwrap().public_eq(&key));
        assert_eq!(
            cert.subject_name().to_der().unwrap(),
            cert.issuer_name().to_der().unwrap()
        );
        assert_eq!(cert.version(), X509_VERSION_3);
    }

    #[test]
    fn test_serial_numbers_differ() {
        let now = Utc::now();
        let build = || {
            RsaRootCABuilder::new()
                .subject_common_name("Serial".to_string())
                .not_before(now)
                .not_after(now + Duration::days(1))
                .build()
                .unwrap()
                .1
        };
        let a = build().serial_number().to_bn().unwrap();
        let b = build().serial_number().to_bn().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_missing_fields_rejected() {
        let now = Utc::now();
        assert!(RsaRootCABuilder::new()
            .not_before(now)
            .not_after(now)
            .build()
            .is_err());
        assert!(RsaRootCABuilder::new()
            .subject_common_name("No Window".to_string())
            .build()
            .is_err());
    }
}
