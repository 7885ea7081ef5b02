//! Save location model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{DeviceId, SaveId};

/// A unique identifier for a save location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SaveLocationId(Uuid);

impl SaveLocationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SaveLocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SaveLocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SaveLocationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Per-location sync behavior.
///
/// `Sync` uploads and receives downloads, `UploadOnly` backs up without
/// receiving downloads, `Disabled` does neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Sync,
    UploadOnly,
    Disabled,
}

impl SyncMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::UploadOnly => "upload_only",
            Self::Disabled => "disabled",
        }
    }

    /// Whether uploads from this location are accepted at all
    #[must_use]
    pub const fn accepts_uploads(self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Whether this location is offered downloads in the manifest
    #[must_use]
    pub const fn receives_downloads(self) -> bool {
        matches!(self, Self::Sync)
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(Self::Sync),
            "upload_only" => Ok(Self::UploadOnly),
            "disabled" => Ok(Self::Disabled),
            other => Err(format!("unknown sync mode: {other}")),
        }
    }
}

/// "Device D has seen this save at path P."
///
/// At most one location exists per (save, device, `local_path`) triple.
/// `local_path` is immutable after creation (first write wins) so concurrent
/// uploads from the same device cannot stomp each other's path pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveLocation {
    pub id: SaveLocationId,
    pub save_id: SaveId,
    pub device_id: DeviceId,
    /// Device class copied from the device at upsert time
    pub device_type: String,
    /// Absolute path on the device; first-write-wins
    pub local_path: String,
    pub sync_mode: SyncMode,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SaveLocation {
    #[must_use]
    pub fn new(
        save_id: SaveId,
        device_id: DeviceId,
        device_type: impl Into<String>,
        local_path: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: SaveLocationId::new(),
            save_id,
            device_id,
            device_type: device_type.into(),
            local_path: local_path.into(),
            sync_mode: SyncMode::Sync,
            created_at: now,
            updated_at: now,
        }
    }
}
