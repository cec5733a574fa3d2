//! PKI Keeper - a small self-hosted Certificate Authority
//!
//! Keeps a set of self-signed CAs and the TLS leaf certificates they issue in one
//! repository of certificate/key pairs, addressed by SHA-1 fingerprint.
//!
//! # Overview
//!
//! ```text
//! CA (self-signed, CA=true, keyCertSign|cRLSign)
//!   └── Leaf (signed by CA, CA=false, serverAuth+clientAuth, SAN)
//! ```
//!
//! The parent/child link is never stored. A leaf belongs to the CA whose Subject Key
//! Identifier equals the leaf's Authority Key Identifier, and the store indexes that
//! relation when it is opened. Deleting a CA deletes everything it issued.
//!
//! # Quick Start
//!
//! ```no_run
//! use pki_keeper::issuance::{AuthorityRequest, LeafRequest};
//! use pki_keeper::pki::Pki;
//!
//! # fn main() -> Result<(), pki_keeper::error::PkiError> {
//! let mut pki = Pki::in_memory();
//! let ca = pki.issue_authority(&AuthorityRequest::new("Home Lab CA"))?;
//! let leaf = pki.issue_leaf(
//!     &ca,
//!     &LeafRequest::new("nas.home.arpa").subject_alt_names(["192.168.1.10"]),
//! )?;
//! println!("{}", pki.certificate_pem(&leaf)?);
//! # Ok(())
//! # }
//! ```
//!
//! # Module Overview
//!
//! - [`der`]: minimal DER reader/writer (tag/length/value iteration)
//! - [`extensions`]: X.509v3 extension encoders and decoders built on [`der`]
//! - [`keys`]: RSA keys, PEM, PKCS#8, PKCS#12, sealed key handles, download names
//! - [`subject`]: Common Name and SAN validation
//! - [`certificate`]: parsed view of a stored certificate and its display metadata
//! - [`storage`]: the fingerprint-keyed repository, in memory or on disk
//! - [`generate_root_ca`], [`generate_leaf`]: certificate builders
//! - [`issuance`]: the CA and leaf issuance flows
//! - [`hierarchy`]: children queries and cascading delete
//! - [`pki`]: the facade a transport layer calls
//! - [`configs`]: TOML configuration
//!
//! # Error Handling
//!
//! The facade returns [`error::PkiError`]; [`error::PkiError::kind`] sorts failures into
//! invalid input, not found and internal errors. Lower layers use `anyhow::Result`.

pub mod certificate;
pub mod configs;
pub mod der;
pub mod error;
pub mod extensions;
pub mod generate_leaf;
pub mod generate_root_ca;
pub mod hierarchy;
pub mod issuance;
pub mod keys;
pub mod pki;
pub mod storage;
pub mod subject;

pub use error::{ErrorKind, PkiError, PkiResult};
pub use pki::Pki;
