//! Certificate issuance: self-signed CAs and CA-signed leaves.
//!
//! Both flows validate their input, build and sign the certificate completely, and
//! only then hand it to the store. A failure at any step leaves the store untouched.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use tracing::{debug, info};

use crate::configs::IssuanceConfig;
use crate::error::{PkiError, PkiResult};
use crate::generate_leaf::RsaLeafBuilder;
use crate::generate_root_ca::RsaRootCABuilder;
use crate::storage::{Filter, Storage};
use crate::subject::{subject_alt_names, CommonName};

/// Request for a new self-signed CA.
#[derive(Debug, Clone)]
pub struct AuthorityRequest {
    pub common_name: String,
    /// Falls back to `issuance.authority_validity_days`
    pub validity_days: Option<u32>,
    /// Falls back to the current time
    pub not_before: Option<DateTime<Utc>>,
}

impl AuthorityRequest {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            validity_days: None,
            not_before: None,
        }
    }

    pub fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = Some(days);
        self
    }

    pub fn not_before(mut self, not_before: DateTime<Utc>) -> Self {
        self.not_before = Some(not_before);
        self
    }
}

/// Request for a leaf certificate under an existing CA.
#[derive(Debug, Clone)]
pub struct LeafRequest {
    pub common_name: String,
    /// Falls back to `issuance.leaf_validity_days`
    pub validity_days: Option<u32>,
    /// Falls back to the current time
    pub not_before: Option<DateTime<Utc>>,
    /// Extra SAN entries; the common name is always included
    pub subject_alt_names: Vec<String>,
}

impl LeafRequest {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            validity_days: None,
            not_before: None,
            subject_alt_names: Vec::new(),
        }
    }

    pub fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = Some(days);
        self
    }

    pub fn not_before(mut self, not_before: DateTime<Utc>) -> Self {
        self.not_before = Some(not_before);
        self
    }

    pub fn subject_alt_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subject_alt_names = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Fit a requested window inside the issuer's lifetime.
///
/// `not_after` is capped at `parent_not_after`; if that puts it before `not_before`,
/// `not_before` is pulled down to match, giving a zero-length window. A request too long
/// to represent ends with the parent.
pub fn clamp_validity(
    not_before: DateTime<Utc>,
    validity_days: u32,
    parent_not_after: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let not_after = validity_end(not_before, validity_days)
        .map_or(parent_not_after, |requested| requested.min(parent_not_after));
    (not_before.min(not_after), not_after)
}

/// `not_before + days`, or `None` when that falls outside the representable range.
fn validity_end(not_before: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    Duration::try_days(i64::from(days)).and_then(|span| not_before.checked_add_signed(span))
}

// X.509 times carry whole seconds
fn start_time(requested: Option<DateTime<Utc>>) -> DateTime<Utc> {
    requested.unwrap_or_else(Utc::now).trunc_subsecs(0)
}

/// Create and store a self-signed CA; returns its fingerprint.
pub fn issue_authority(
    storage: &mut Storage,
    request: &AuthorityRequest,
    config: &IssuanceConfig,
) -> PkiResult<String> {
    let common_name = CommonName::parse(&request.common_name)?;
    let not_before = start_time(request.not_before);
    let days = request
        .validity_days
        .unwrap_or(config.authority_validity_days);
    let not_after = validity_end(not_before, days).ok_or_else(|| {
        debug!("Validity out of range: {} days", days);
        PkiError::InvalidValidity { days }
    })?;

    let (private_key, x509) = RsaRootCABuilder::new()
        .subject_common_name(common_name.as_str().to_string())
        .not_before(not_before)
        .not_after(not_after)
        .build()?;

    let fingerprint = storage.add(&x509, Some(&private_key))?;
    info!(
        "Issued CA {} for CN={} valid until {}",
        fingerprint,
        common_name.as_str(),
        not_after
    );
    Ok(fingerprint)
}

/// Create and store a leaf signed by the CA `parent_fingerprint`; returns its fingerprint.
///
/// Fails with `NotFound` when the parent is unknown, not a CA, or lacks a Subject
/// Key Identifier.
pub fn issue_leaf(
    storage: &mut Storage,
    parent_fingerprint: &str,
    request: &LeafRequest,
    config: &IssuanceConfig,
) -> PkiResult<String> {
    let parent = storage
        .find(parent_fingerprint, Filter::Authorities)
        .ok_or_else(|| PkiError::not_found(parent_fingerprint))?;
    let parent_key_id = parent
        .subject_key_id()
        .and_then(|ski| hex::decode(ski).ok())
        .ok_or_else(|| PkiError::not_found(parent_fingerprint))?;
    let signing_key = storage
        .private_key(parent.fingerprint())
        .ok_or_else(|| PkiError::not_found(parent_fingerprint))?
        .make_exportable()?;

    let days = request.validity_days.unwrap_or(config.leaf_validity_days);
    let (not_before, not_after) =
        clamp_validity(start_time(request.not_before), days, parent.not_after());

    let common_name = CommonName::parse(&request.common_name)?;
    let names = subject_alt_names(&common_name, &request.subject_alt_names)?;

    let (private_key, x509) = RsaLeafBuilder::new(signing_key, parent.x509().clone())
        .subject_common_name(common_name.as_str().to_string())
        .subject_alt_names(names)
        .authority_key_id(parent_key_id)
        .not_before(not_before)
        .not_after(not_after)
        .build()?;
    let parent_fingerprint = parent.fingerprint().to_string();

    let fingerprint = storage.add(&x509, Some(&private_key))?;
    info!(
        "Issued leaf {} for CN={} under CA {}",
        fingerprint,
        common_name.as_str(),
        parent_fingerprint
    );
    Ok(fingerprint)
}
