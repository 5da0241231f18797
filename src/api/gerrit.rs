//! Gerrit-specific identifiers: Change-Ids and change refs.

use sha2::{Digest, Sha256};

use crate::error::FerryError;

/// The Gerrit trailer carrying a change identifier.
pub const CHANGE_ID_LABEL: &str = "Change-Id";

/// Validate a Gerrit Change-Id: `I` followed by exactly 40 lowercase hex
/// characters. Uppercase hex is rejected.
///
/// # Errors
/// [`FerryError::Validation`] with a message naming the expected pattern.
pub fn validate_change_id(change_id: &str) -> Result<(), FerryError> {
    let valid = change_id.len() == 41
        && change_id.starts_with('I')
        && change_id[1..]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
    if valid {
        Ok(())
    } else {
        Err(FerryError::validation(format!(
            "'{change_id}' does not match Gerrit Change ID pattern: I[0-9a-f]{{40}}"
        )))
    }
}

/// Derive a deterministic Change-Id from a workflow identity and the origin
/// revision, so re-running the same migration updates the same review.
#[must_use]
pub fn derive_change_id(workflow_identity: &str, origin_rev: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(workflow_identity.as_bytes());
    hasher.update(b"\0");
    hasher.update(origin_rev.as_bytes());
    let digest = hasher.finalize();
    let mut id = String::with_capacity(41);
    id.push('I');
    for byte in digest.iter().take(20) {
        id.push_str(&format!("{byte:02x}"));
    }
    id
}

/// The ref holding patch set `patch_set` of `change`:
/// `refs/changes/<last-two-digits>/<change>/<patch_set>`.
#[must_use]
pub fn change_ref(change: u64, patch_set: u32) -> String {
    format!("refs/changes/{:02}/{change}/{patch_set}", change % 100)
}
