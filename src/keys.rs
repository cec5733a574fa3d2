//! Key generation and the encodings used to hand keys and certificates back out.
//!
//! Every key issued here is RSA-2048 so the issued-certificate profile stays uniform.
//! Private keys held at rest may be *sealed* (encrypted PKCS#8 under a passphrase);
//! [`KeyHandle::make_exportable`] recovers a usable key from either form without
//! touching the stored handle.

use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{anyhow, Context, Result};
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::symm::Cipher;
use openssl::x509::{X509Ref, X509};
use pem::{EncodeConfig, LineEnding, Pem};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};

use crate::certificate::Certificate;

pub const RSA_KEY_BITS: u32 = 2048;

pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";
pub const ENCRYPTED_PRIVATE_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";

static UNSAFE_CHAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r##"[\s"#*/:<>?\\|]+"##).unwrap_or_else(|e| panic!("invalid pattern: {}", e))
});

/// Generate a fresh RSA-2048 key pair.
pub fn generate_keypair() -> Result<PKey<Private>> {
    let rsa = Rsa::generate(RSA_KEY_BITS)
        .map_err(|e| anyhow!("Failed to generate RSA keypair: {}", e))?;
    PKey::from_rsa(rsa).map_err(|e| anyhow!("Failed to create private key: {}", e))
}

/// Frame DER bytes as PEM text with LF line endings.
pub fn pem_encode(label: &str, der: &[u8]) -> String {
    pem::encode_config(
        &Pem::new(label, der.to_vec()),
        EncodeConfig::new().set_line_ending(LineEnding::LF),
    )
}

/// Unencrypted PKCS#8 DER of a private key.
pub fn export_pkcs8(key: &PKeyRef<Private>) -> Result<Vec<u8>> {
    key.private_key_to_pkcs8()
        .map_err(|e| anyhow!("Failed to convert private key to PKCS#8: {}", e))
}

/// Bundle a certificate and its key as PKCS#12.
///
/// Without a passphrase the bundle is protected by the empty password, which every
/// common importer accepts as "no password".
pub fn export_pkcs12(
    cert: &X509Ref,
    key: &PKeyRef<Private>,
    friendly_name: &str,
    passphrase: Option<&str>,
) -> Result<Vec<u8>> {
    let mut builder = Pkcs12::builder();
    builder.name(friendly_name).pkey(key).cert(cert);
    let pkcs12 = builder
        .build2(passphrase.unwrap_or(""))
        .map_err(|e| anyhow!("Failed to build PKCS#12 bundle: {}", e))?;
    pkcs12
        .to_der()
        .map_err(|e| anyhow!("Failed to encode PKCS#12 bundle: {}", e))
}

/// Read an uploaded certificate file: a PKCS#12 bundle, a PEM bundle or a bare
/// DER certificate. Returns `None` when the bytes are none of these.
pub fn read_bundle(data: &[u8], password: Option<&str>) -> Option<(X509, Option<PKey<Private>>)> {
    if let Ok(pkcs12) = Pkcs12::from_der(data) {
        let parsed = pkcs12.parse2(password.unwrap_or("")).ok()?;
        return Some((parsed.cert?, parsed.pkey));
    }
    if let Ok(blocks) = pem::parse_many(data) {
        if !blocks.is_empty() {
            return read_pem_blocks(&blocks, password);
        }
    }
    X509::from_der(data).ok().map(|cert| (cert, None))
}

fn read_pem_blocks(
    blocks: &[Pem],
    password: Option<&str>,
) -> Option<(X509, Option<PKey<Private>>)> {
    let mut cert = None;
    let mut key = None;
    for block in blocks {
        match block.tag() {
            CERTIFICATE_LABEL if cert.is_none() => {
                cert = Some(X509::from_der(block.contents()).ok()?);
            }
            PRIVATE_KEY_LABEL | "RSA PRIVATE KEY" | "EC PRIVATE KEY" if key.is_none() => {
                key = Some(PKey::private_key_from_der(block.contents()).ok()?);
            }
            ENCRYPTED_PRIVATE_KEY_LABEL if key.is_none() => {
                let pass = password?;
                key = Some(
                    PKey::private_key_from_pkcs8_passphrase(block.contents(), pass.as_bytes())
                        .ok()?,
                );
            }
            _ => {}
        }
    }
    Some((cert?, key))
}

/// A stored private key, tagged by whether it can be used directly.
pub enum KeyHandle {
    Exportable(PKey<Private>),
    Sealed {
        pkcs8: Vec<u8>,
        passphrase: SecretString,
    },
}

impl KeyHandle {
    /// Seal a key as AES-256-CBC encrypted PKCS#8.
    pub fn seal(key: &PKeyRef<Private>, passphrase: SecretString) -> Result<Self> {
        let pkcs8 = key
            .private_key_to_pkcs8_passphrase(
                Cipher::aes_256_cbc(),
                passphrase.expose_secret().as_bytes(),
            )
            .map_err(|e| anyhow!("Failed to convert private key to encrypted PKCS#8: {}", e))?;
        Ok(KeyHandle::Sealed { pkcs8, passphrase })
    }

    pub fn is_exportable(&self) -> bool {
        matches!(self, KeyHandle::Exportable(_))
    }

    /// Obtain a key that can sign and be exported.
    ///
    /// Sealed handles go through an encrypted-PKCS#8 import into a fresh key; the
    /// handle itself is left as it was.
    pub fn make_exportable(&self) -> Result<PKey<Private>> {
        match self {
            KeyHandle::Exportable(key) => Ok(key.clone()),
            KeyHandle::Sealed { pkcs8, passphrase } => PKey::private_key_from_pkcs8_passphrase(
                pkcs8,
                passphrase.expose_secret().as_bytes(),
            )
            .map_err(|e| anyhow!("Failed to unseal private key: {}", e)),
        }
    }

    /// The PEM form written to the key file.
    pub fn to_stored_pem(&self) -> Result<String> {
        match self {
            KeyHandle::Exportable(key) => Ok(pem_encode(PRIVATE_KEY_LABEL, &export_pkcs8(key)?)),
            KeyHandle::Sealed { pkcs8, .. } => Ok(pem_encode(ENCRYPTED_PRIVATE_KEY_LABEL, pkcs8)),
        }
    }

    /// Parse a key file written by [`KeyHandle::to_stored_pem`].
    pub fn from_stored_pem(data: &[u8], passphrase: Option<&SecretString>) -> Result<Self> {
        let block = pem::parse(data).map_err(|e| anyhow!("Failed to parse key PEM: {}", e))?;
        match (block.tag(), passphrase) {
            (ENCRYPTED_PRIVATE_KEY_LABEL, Some(passphrase)) => {
                let handle = KeyHandle::Sealed {
                    pkcs8: block.contents().to_vec(),
                    passphrase: SecretString::new(passphrase.expose_secret().to_string()),
                };
                // a wrong passphrase surfaces at load time
                handle.make_exportable()?;
                Ok(handle)
            }
            (ENCRYPTED_PRIVATE_KEY_LABEL, None) => {
                Err(anyhow!("Key is sealed but no passphrase is configured"))
            }
            (_, _) => {
                let key = PKey::private_key_from_der(block.contents())
                    .map_err(|e| anyhow!("Failed to parse private key: {}", e))?;
                Ok(KeyHandle::Exportable(key))
            }
        }
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyHandle::Exportable(_) => f.write_str("KeyHandle::Exportable(<redacted>)"),
            KeyHandle::Sealed { .. } => f.write_str("KeyHandle::Sealed(<redacted>)"),
        }
    }
}

/// Replace every run of whitespace or `"#*/:<>?\|` with a single underscore.
pub fn sanitize_file_name(name: &str) -> String {
    UNSAFE_CHAR_PATTERN.replace_all(name, "_").into_owned()
}

/// Download name for a certificate: its CN made path-safe, plus `suffix`.
pub fn safe_file_name(cert: &Certificate, suffix: &str) -> String {
    let stem = cert.common_name().unwrap_or(cert.fingerprint());
    format!("{}{}", sanitize_file_name(stem), suffix)
}

/// Write private key material, replacing any existing file at `path`.
///
/// The bytes go to a `.tmp` sibling that is created owner-only (0600 on Unix) and
/// then renamed over `path`.
pub fn write_private_file(path: &Path, contents: &[u8]) -> Result<()> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);

    match fs::remove_file(&staging) {
        Err(e) if e.kind() != ErrorKind::NotFound => {
            return Err(e)
                .with_context(|| format!("Failed to remove stale {}", staging.display()))
        }
        _ => {}
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options
        .open(&staging)
        .and_then(|mut file| {
            file.write_all(contents)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&staging, path))
        .or_else(|e| {
            // Drop the partial staging file
            let _ = fs::remove_file(&staging);
            Err(e)
        })
        .with_context(|| format!("Failed to write {}", path.display()))
}
