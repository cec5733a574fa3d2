//! Parent/child queries over the flat store, and cascading delete.
//!
//! A certificate is a child of the CA whose Subject Key Identifier equals its
//! Authority Key Identifier. CAs here only ever issue leaves, so one level of
//! cascade removes everything a CA issued.

use tracing::{debug, info};

use crate::certificate::Certificate;
use crate::error::{PkiError, PkiResult};
use crate::storage::{Filter, Storage};

/// Direct children of the CA `fingerprint`, excluding the CA itself.
///
/// Fails with `NotFound` when `fingerprint` is not a stored CA or the CA has no
/// Subject Key Identifier.
pub fn children_of<'a>(
    storage: &'a Storage,
    fingerprint: &str,
) -> PkiResult<Vec<&'a Certificate>> {
    let authority = storage
        .find(fingerprint, Filter::Authorities)
        .ok_or_else(|| PkiError::not_found(fingerprint))?;
    let key_id = authority
        .subject_key_id()
        .ok_or_else(|| PkiError::not_found(fingerprint))?;
    Ok(storage
        .issued_by(key_id, Filter::Ownable)
        .into_iter()
        .filter(|child| child.fingerprint() != authority.fingerprint())
        .collect())
}

/// Delete a certificate; deleting a CA first deletes its direct children.
///
/// An unknown fingerprint is a no-op. Only filesystem failures are reported.
pub fn delete_certificate(storage: &mut Storage, fingerprint: &str) -> PkiResult<()> {
    let Some(target) = storage.find(fingerprint, Filter::Ownable) else {
        debug!("Nothing to delete for {}", fingerprint);
        return Ok(());
    };
    let target_fingerprint = target.fingerprint().to_string();

    let children: Vec<String> = if target.is_ca() {
        match children_of(storage, &target_fingerprint) {
            Ok(children) => children
                .into_iter()
                .map(|child| child.fingerprint().to_string())
                .collect(),
            Err(PkiError::NotFound { .. }) => Vec::new(),
            Err(e) => return Err(e),
        }
    } else {
        Vec::new()
    };

    for child in &children {
        storage.remove(child)?;
    }
    storage.remove(&target_fingerprint)?;
    info!(
        "Deleted certificate {} and {} issued certificate(s)",
        target_fingerprint,
        children.len()
    );
    Ok(())
}
