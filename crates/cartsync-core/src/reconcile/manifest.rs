//! Latest-version selection and manifest types
//!
//! Selecting "the" version of a save is a policy decision, not a simple
//! max(): versions with real mtimes are preferred over fallback-timestamped
//! ones, except when a much newer fallback upload indicates that the real
//! mtimes are coming from a broken clock.

use serde::Serialize;

use crate::models::{SaveId, SaveVersion, SaveVersionId};
use crate::reconcile::timestamp::has_real_mtime;

/// If the newest fallback upload is this much newer than the newest real
/// mtime, fallback ordering wins globally for the save (7 days)
pub const SAFETY_THRESHOLD_MS: i64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy)]
struct Classified<'a> {
    version: &'a SaveVersion,
    real: bool,
}

impl Classified<'_> {
    /// The timestamp this version sorts by within its group
    const fn sort_ms(&self) -> i64 {
        if self.real {
            self.version.local_modified_at
        } else {
            self.version.uploaded_at
        }
    }
}

/// Select the authoritative latest version for a save.
///
/// Default ordering puts real-mtime versions first, each group sorted by its
/// own timestamp descending. The safety override flips group priority when
/// the newest fallback upload is more than [`SAFETY_THRESHOLD_MS`] newer
/// than the newest real mtime, guarding against a device whose broken clock
/// produces real-looking-but-old mtimes that would otherwise suppress a
/// legitimately newer upload.
#[must_use]
pub fn select_latest_version(versions: &[SaveVersion]) -> Option<&SaveVersion> {
    let mut classified: Vec<Classified<'_>> = versions
        .iter()
        .map(|version| Classified {
            version,
            real: has_real_mtime(version.local_modified_at, version.uploaded_at),
        })
        .collect();

    if classified.is_empty() {
        return None;
    }

    let newest_real_ms = classified
        .iter()
        .filter(|entry| entry.real)
        .map(|entry| entry.version.local_modified_at)
        .max();
    let newest_fallback_ms = classified
        .iter()
        .filter(|entry| !entry.real)
        .map(|entry| entry.version.uploaded_at)
        .max();

    let prefer_fallback = match (newest_real_ms, newest_fallback_ms) {
        (Some(real_ms), Some(fallback_ms)) => fallback_ms - real_ms > SAFETY_THRESHOLD_MS,
        _ => false,
    };

    if prefer_fallback {
        tracing::info!(
            save_id = %classified[0].version.save_id,
            "preferring fallback timestamps over real mtimes for latest-version selection"
        );
    }

    classified.sort_by(|a, b| {
        if a.real != b.real {
            // Group priority: real first by default, fallback first under the override
            let a_first = if prefer_fallback { !a.real } else { a.real };
            return if a_first {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Greater
            };
        }
        b.sort_ms()
            .cmp(&a.sort_ms())
            .then_with(|| b.version.uploaded_at.cmp(&a.version.uploaded_at))
    });

    classified.first().map(|entry| entry.version)
}

/// Compact version description embedded in manifest entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionSummary {
    pub id: SaveVersionId,
    pub content_hash: String,
    pub byte_size: u64,
    pub local_modified_at: i64,
    pub uploaded_at: i64,
}

impl From<&SaveVersion> for VersionSummary {
    fn from(version: &SaveVersion) -> Self {
        Self {
            id: version.id,
            content_hash: version.content_hash.clone(),
            byte_size: version.byte_size,
            local_modified_at: version.local_modified_at,
            uploaded_at: version.uploaded_at,
        }
    }
}

/// One save as presented to a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub save_id: SaveId,
    pub save_key: String,
    pub display_name: String,
    /// Where this device keeps the save; `None` until the device has
    /// uploaded once and established a mapping
    pub local_path: Option<String>,
    /// The device must upload once before it can receive this save
    pub needs_mapping: bool,
    /// Authoritative version to download, when any exist
    pub latest_version: Option<VersionSummary>,
}

/// The full per-device download view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
    pub mapped_count: usize,
    pub unmapped_count: usize,
}
