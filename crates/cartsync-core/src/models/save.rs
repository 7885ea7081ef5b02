//! Logical save model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::UserId;

/// A unique identifier for a logical save, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SaveId(Uuid);

impl SaveId {
    /// Create a new unique save ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SaveId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SaveId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Whether a save's versions propagate across a user's devices
/// or stay siloed per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// One version syncs to all devices (latest wins)
    Shared,
    /// Each device has its own version; all backed up, no cross-device sync
    PerDevice,
}

impl SyncStrategy {
    /// Database/wire representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::PerDevice => "per_device",
        }
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" => Ok(Self::Shared),
            "per_device" => Ok(Self::PerDevice),
            other => Err(format!("unknown sync strategy: {other}")),
        }
    }
}

/// A logical save: the game-save identity independent of which
/// device or path produced it, keyed by normalized save key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Save {
    /// Unique identifier
    pub id: SaveId,
    /// Owning user
    pub user_id: UserId,
    /// Normalized, extension-agnostic save key (identity within the user)
    pub save_key: String,
    /// Human-readable name, refreshed from the latest upload's basename
    pub display_name: String,
    /// Cross-device sync strategy
    pub sync_strategy: SyncStrategy,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Save {
    /// Create a new save owned by `user_id`.
    ///
    /// New saves start as `per_device`; promoting to `shared` is an explicit,
    /// quota-gated user action.
    #[must_use]
    pub fn new(
        user_id: UserId,
        save_key: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: SaveId::new(),
            user_id,
            save_key: save_key.into(),
            display_name: display_name.into(),
            sync_strategy: SyncStrategy::PerDevice,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this save participates in cross-device manifest distribution
    #[must_use]
    pub const fn is_shared(&self) -> bool {
        matches!(self.sync_strategy, SyncStrategy::Shared)
    }
}
