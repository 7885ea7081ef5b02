//! Service layer: orchestration over repositories and blob storage

mod plan;
mod sync_service;

pub use plan::{can_enable_shared_save, PlanDecision, FREE_MAX_SHARED_SAVES};
pub use sync_service::{
    DownloadPayload, SaveOverview, SyncService, UploadOutcome, UploadRequest,
};
