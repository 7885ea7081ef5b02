//! Data models for cartsync

mod device;
mod save;
mod save_location;
mod save_version;
mod sync_log;
mod user;

pub use device::{Device, DeviceId};
pub use save::{Save, SaveId, SyncStrategy};
pub use save_location::{SaveLocation, SaveLocationId, SyncMode};
pub use save_version::{SaveVersion, SaveVersionId};
pub use sync_log::{LogFilter, SyncAction, SyncLog, SyncStatus};
pub use user::{SubscriptionTier, User, UserId};
