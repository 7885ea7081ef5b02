//! Save reconciliation engine
//!
//! Decision logic for the upload pipeline and manifest construction:
//! timestamp sanitization, save-key normalization, content hashing, version
//! admission, and latest-version selection — all deterministic, pure
//! functions — plus the per-save upload locks. The orchestration (and all
//! I/O) lives in [`crate::services::SyncService`].

mod admission;
mod hasher;
mod locks;
mod manifest;
mod save_key;
mod timestamp;

pub use admission::{
    decide_admission, AdmissionDecision, IncomingUpload, SkipReason, MTIME_EPSILON_MS,
};
pub use hasher::{resolve_content_hash, sha256_hex};
pub use locks::KeyedLocks;
pub use manifest::{
    select_latest_version, Manifest, ManifestEntry, VersionSummary, SAFETY_THRESHOLD_MS,
};
pub use save_key::{
    display_name_from_path, effective_local_path, normalize_save_key, safe_file_path,
};
pub use timestamp::{
    has_real_mtime, sanitize_timestamp, RawTimestamp, FALLBACK_DELTA_MS, MAX_FUTURE_DRIFT_MS,
    MIN_VALID_MTIME_MS,
};
