//! Save version model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{DeviceId, SaveId};

/// A unique identifier for a save version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SaveVersionId(Uuid);

impl SaveVersionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SaveVersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SaveVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SaveVersionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// One immutable uploaded snapshot of a save's bytes.
///
/// Versions are append-only history; rows are created once and never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveVersion {
    pub id: SaveVersionId,
    pub save_id: SaveId,
    /// Device that produced this snapshot
    pub device_id: DeviceId,
    /// SHA-256 hex digest of the bytes, recomputed server-side
    pub content_hash: String,
    pub byte_size: u64,
    /// Sanitized client-reported mtime (Unix ms)
    pub local_modified_at: i64,
    /// Server receipt time (Unix ms)
    pub uploaded_at: i64,
    /// Opaque locator in the blob store
    pub storage_key: String,
}

impl SaveVersion {
    /// Build the deterministic blob-store key for a version.
    #[must_use]
    pub fn build_storage_key(user_id: &str, save_id: &SaveId, version_id: &SaveVersionId) -> String {
        format!("{user_id}/saves/{save_id}/versions/{version_id}")
    }
}
