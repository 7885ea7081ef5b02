//! Content hashing

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a byte slice.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Resolve the content hash for an upload.
///
/// The hash is always recomputed server-side; a client-supplied hash is a
/// hint only. A mismatch is logged and the computed value wins.
#[must_use]
pub fn resolve_content_hash(bytes: &[u8], client_hash: Option<&str>) -> String {
    let computed = sha256_hex(bytes);
    if let Some(claimed) = client_hash.map(str::trim).filter(|value| !value.is_empty()) {
        if !claimed.eq_ignore_ascii_case(&computed) {
            tracing::warn!(
                claimed = %claimed,
                computed = %computed,
                "client-supplied content hash does not match bytes, using computed hash"
            );
        }
    }
    computed
}
