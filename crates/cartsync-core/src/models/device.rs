//! Device model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::UserId;

/// A unique identifier for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(Uuid);

impl DeviceId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A paired device (handheld, desktop emulator) that uploads and
/// downloads saves on behalf of its owning user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub user_id: UserId,
    pub name: String,
    /// Free-form device class reported at pairing, e.g. "muos" or "desktop"
    pub device_type: String,
    /// Device credential; unique per device
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Last heartbeat or sync activity (Unix ms)
    pub last_sync_at: Option<i64>,
    pub is_active: bool,
    pub created_at: i64,
}

impl Device {
    #[must_use]
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        device_type: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            id: DeviceId::new(),
            user_id,
            name: name.into(),
            device_type: device_type.into(),
            api_key: api_key.into(),
            last_sync_at: None,
            is_active: true,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}
