//! Sync log model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{DeviceId, SaveId, SaveVersionId};

/// What the device was doing when the event was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Upload,
    Download,
    Delete,
    Conflict,
}

impl SyncAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Delete => "delete",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(Self::Upload),
            "download" => Ok(Self::Download),
            "delete" => Ok(Self::Delete),
            "conflict" => Ok(Self::Conflict),
            other => Err(format!("unknown sync action: {other}")),
        }
    }
}

/// Terminal outcome of a sync event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Failed,
    Skipped,
    Pending,
}

impl SyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Pending => "pending",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            "pending" => Ok(Self::Pending),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// One recorded sync event. Every upload attempt writes exactly one
/// terminal log row; downloads are logged best-effort in the background.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: String,
    pub device_id: DeviceId,
    pub action: SyncAction,
    pub file_path: String,
    pub file_size: Option<u64>,
    pub status: SyncStatus,
    pub error_msg: Option<String>,
    pub save_id: Option<SaveId>,
    pub save_version_id: Option<SaveVersionId>,
    pub created_at: i64,
}

impl SyncLog {
    #[must_use]
    pub fn new(
        device_id: DeviceId,
        action: SyncAction,
        file_path: impl Into<String>,
        status: SyncStatus,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            device_id,
            action,
            file_path: file_path.into(),
            file_size: None,
            status,
            error_msg: None,
            save_id: None,
            save_version_id: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    #[must_use]
    pub fn with_file_size(mut self, file_size: u64) -> Self {
        self.file_size = Some(file_size);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error_msg: impl Into<String>) -> Self {
        self.error_msg = Some(error_msg.into());
        self
    }

    #[must_use]
    pub const fn with_save(mut self, save_id: SaveId) -> Self {
        self.save_id = Some(save_id);
        self
    }

    #[must_use]
    pub const fn with_version(mut self, version_id: SaveVersionId) -> Self {
        self.save_version_id = Some(version_id);
        self
    }
}

/// Scope for sync-log listings.
///
/// Tagged so callers handle every listing shape exhaustively instead of
/// passing dynamically-typed query filters through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFilter {
    /// Events from a single device
    ByDevice(DeviceId),
    /// Events from any of the user's devices
    ByUserDevices(Vec<DeviceId>),
}
