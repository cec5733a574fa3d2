//! Error types for certificate issuance, import and export.

use thiserror::Error;

/// Coarse classification of a [`PkiError`].
///
/// `InvalidInput` and `NotFound` are recoverable by the caller supplying
/// corrected input; `Internal` means the crypto provider or the filesystem failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Internal,
}

#[derive(Debug, Error)]
pub enum PkiError {
    #[error("Invalid CN or SAN: {value}")]
    InvalidSubject { value: String },

    #[error("Validity period out of range: {days} days")]
    InvalidValidity { days: u32 },

    #[error("Invalid certificate file: {name}")]
    InvalidFormat { name: String },

    #[error("Certificate not found: {fingerprint}")]
    NotFound { fingerprint: String },

    #[error("Private key required: {fingerprint}")]
    NoPrivateKey { fingerprint: String },

    #[error("Internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

pub type PkiResult<T> = Result<T, PkiError>;

impl PkiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PkiError::InvalidSubject { .. }
            | PkiError::InvalidValidity { .. }
            | PkiError::InvalidFormat { .. } => ErrorKind::InvalidInput,
            PkiError::NotFound { .. } | PkiError::NoPrivateKey { .. } => ErrorKind::NotFound,
            PkiError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn invalid_subject(value: impl Into<String>) -> Self {
        PkiError::InvalidSubject {
            value: value.into(),
        }
    }

    pub(crate) fn not_found(fingerprint: impl Into<String>) -> Self {
        PkiError::NotFound {
            fingerprint: fingerprint.into(),
        }
    }
}

impl From<openssl::error::ErrorStack> for PkiError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        PkiError::Internal(anyhow::Error::new(e).context("OpenSSL operation failed"))
    }
}
