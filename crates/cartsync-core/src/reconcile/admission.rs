//! Version admission control
//!
//! The per-upload decision of whether an incoming snapshot becomes a new
//! version, is skipped as a duplicate, or is rejected as older than known
//! state. The checks run in strict order and the first match wins.

use crate::models::{SaveVersion, SaveVersionId, SyncMode};

/// Tolerance for mtime comparisons (clock / filesystem granularity)
pub const MTIME_EPSILON_MS: i64 = 2000;

/// The sanitized, hashed upload as seen by the admission check
#[derive(Debug, Clone, Copy)]
pub struct IncomingUpload<'a> {
    /// Sanitized local mtime (Unix ms)
    pub local_modified_at: i64,
    /// Recomputed SHA-256 hex digest
    pub content_hash: &'a str,
    pub byte_size: u64,
}

/// Why an upload was skipped without creating a version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Sync is disabled for this device location
    SyncDisabled,
    /// Byte-identical content already exists somewhere in the save's history
    ContentExists,
    /// Incoming mtime is older than the device's latest known version
    OlderThanExisting {
        /// How much older, in milliseconds
        delta_ms: i64,
    },
    /// Idempotent re-upload of the device's latest version
    Unchanged,
}

impl SkipReason {
    /// Human-readable reason string surfaced to the device
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::SyncDisabled => "sync disabled for this device".to_string(),
            Self::ContentExists => "content already exists (path registered)".to_string(),
            Self::OlderThanExisting { delta_ms } => {
                format!("file is older than existing version ({delta_ms}ms older)")
            }
            Self::Unchanged => "content unchanged".to_string(),
        }
    }
}

/// Outcome of the admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Create a new version and write the blob
    Accept,
    /// No version is created; the upload still succeeds from the
    /// device's point of view
    Skip {
        reason: SkipReason,
        /// The version the skip resolves to, when one exists
        existing: Option<SaveVersionId>,
    },
}

/// Run the admission state machine for one upload.
///
/// `duplicate` is the byte-identical match from anywhere in the save's
/// history (any device); `latest_for_device` is the uploading device's most
/// recent version by local mtime.
///
/// The idempotent-re-upload check runs before the cross-history dedup check:
/// an exact re-upload of the device's own latest version would otherwise
/// always be reported as a cross-path duplicate, and the unchanged outcome
/// could never occur.
#[must_use]
pub fn decide_admission(
    sync_mode: SyncMode,
    duplicate: Option<&SaveVersion>,
    latest_for_device: Option<&SaveVersion>,
    incoming: &IncomingUpload<'_>,
) -> AdmissionDecision {
    if !sync_mode.accepts_uploads() {
        return AdmissionDecision::Skip {
            reason: SkipReason::SyncDisabled,
            existing: None,
        };
    }

    if let Some(latest) = latest_for_device {
        let delta_ms = latest.local_modified_at - incoming.local_modified_at;
        let mtime_close = delta_ms.abs() <= MTIME_EPSILON_MS;
        let same_hash = latest.content_hash == incoming.content_hash;
        let same_size = latest.byte_size == incoming.byte_size;
        if mtime_close && same_hash && same_size {
            return AdmissionDecision::Skip {
                reason: SkipReason::Unchanged,
                existing: Some(latest.id),
            };
        }
    }

    if let Some(existing) = duplicate {
        return AdmissionDecision::Skip {
            reason: SkipReason::ContentExists,
            existing: Some(existing.id),
        };
    }

    if let Some(latest) = latest_for_device {
        let delta_ms = latest.local_modified_at - incoming.local_modified_at;
        if delta_ms > MTIME_EPSILON_MS {
            return AdmissionDecision::Skip {
                reason: SkipReason::OlderThanExisting { delta_ms },
                existing: Some(latest.id),
            };
        }
    }

    AdmissionDecision::Accept
}
