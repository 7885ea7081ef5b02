//! Sync service: the upload, manifest, and policy orchestrator
//!
//! Each operation is request-scoped and runs its database and blob-store
//! steps sequentially, because each step's outcome gates the next. There is
//! no cross-request state beyond the per-save upload locks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    Database, LibSqlDeviceRepository, LibSqlLocationRepository, LibSqlLogRepository,
    LibSqlSaveRepository, LibSqlVersionRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    Device, DeviceId, LogFilter, Save, SaveId, SaveLocation, SaveLocationId, SaveVersion,
    SaveVersionId, SyncAction, SyncLog, SyncMode, SyncStatus, SyncStrategy, UserId,
};
use crate::reconcile::{
    decide_admission, display_name_from_path, effective_local_path, normalize_save_key,
    resolve_content_hash, safe_file_path, sanitize_timestamp, select_latest_version,
    AdmissionDecision, IncomingUpload, KeyedLocks, Manifest, ManifestEntry, RawTimestamp,
    SkipReason, VersionSummary,
};
use crate::services::plan::{self, PlanDecision};
use crate::storage::BlobStore;

/// One upload intake, after transport-level decoding
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Path of the file on the device, as reported by the client
    pub file_path: String,
    /// Claimed size; informational, the stored size comes from the bytes
    pub file_size: Option<u64>,
    /// Decoded save bytes
    pub bytes: Vec<u8>,
    /// Explicit device-local path override
    pub local_path: Option<String>,
    /// Client-reported mtime, sanitized before use
    pub local_modified_at: Option<RawTimestamp>,
    /// Explicit save-key override; defaults to the file path
    pub save_key: Option<String>,
    /// Client-computed hash; hint only, always recomputed
    pub content_hash: Option<String>,
}

/// Terminal outcome of one upload attempt.
///
/// Skips are expected control flow, not errors: the device must treat them
/// as success and not retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// A new version was created and its bytes are stored
    Uploaded { version: SaveVersion },
    /// No version was created; the path mapping is registered
    Skipped {
        save_id: SaveId,
        reason: SkipReason,
        existing_version_id: Option<SaveVersionId>,
        content_hash: String,
    },
    /// The blob write failed; the attempt is logged as failed and no
    /// version row exists
    StorageFailed { save_id: SaveId },
}

/// Bytes plus metadata for a version download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPayload {
    pub bytes: Vec<u8>,
    pub version: SaveVersion,
}

/// A save as presented in the user's library listing
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SaveOverview {
    pub save: Save,
    pub locations: Vec<SaveLocation>,
    pub latest_version: Option<VersionSummary>,
}

/// Thread-safe service coordinating repositories and blob storage.
#[derive(Clone)]
pub struct SyncService {
    db: Arc<Mutex<Database>>,
    blobs: Arc<dyn BlobStore>,
    upload_locks: KeyedLocks,
}

impl SyncService {
    #[must_use]
    pub fn new(db: Database, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            blobs,
            upload_locks: KeyedLocks::new(),
        }
    }

    /// Resolve the device behind an API key, if any
    pub async fn authenticate_device(&self, api_key: &str) -> Result<Option<Device>> {
        let db = self.db.lock().await;
        LibSqlDeviceRepository::new(db.connection())
            .find_by_api_key(api_key)
            .await
    }

    /// Run the full upload pipeline for one snapshot from `device`.
    ///
    /// Identity resolve, dedup check, staleness check, blob write, version
    /// create, log write, in that order. Uploads for the same (user, save
    /// key) are serialized through an advisory lock so the read-then-decide
    /// admission checks cannot race each other.
    pub async fn upload(&self, device: &Device, request: UploadRequest) -> Result<UploadOutcome> {
        if request.file_path.trim().is_empty() {
            return Err(Error::InvalidInput("file_path is required".to_string()));
        }

        let now_ms = chrono::Utc::now().timestamp_millis();
        let safe_path = safe_file_path(&request.file_path)?;
        let effective_path = effective_local_path(&safe_path, request.local_path.as_deref());
        let save_key = normalize_save_key(request.save_key.as_deref().unwrap_or(&safe_path));
        if save_key.is_empty() {
            return Err(Error::InvalidInput("save key must not be empty".to_string()));
        }
        let display_name = display_name_from_path(&safe_path);
        let local_modified_at = sanitize_timestamp(request.local_modified_at.as_ref(), now_ms);
        let content_hash = resolve_content_hash(&request.bytes, request.content_hash.as_deref());
        let byte_size = request.bytes.len() as u64;
        if let Some(claimed) = request.file_size {
            if claimed != byte_size {
                tracing::debug!(claimed, actual = byte_size, "claimed file size differs");
            }
        }

        let lock_key = format!("{}:{save_key}", device.user_id);
        let _guard = self.upload_locks.acquire(&lock_key).await;

        // Resolve identity and gather admission inputs under one DB guard
        let (save, location, duplicate, latest) = {
            let db = self.db.lock().await;
            let conn = db.connection();
            let save = LibSqlSaveRepository::new(conn)
                .upsert(&device.user_id, &save_key, &display_name)
                .await?;
            let location = LibSqlLocationRepository::new(conn)
                .upsert(save.id, device.id, &device.device_type, &effective_path)
                .await?;
            let versions = LibSqlVersionRepository::new(conn);
            let duplicate = versions.find_by_content_hash(save.id, &content_hash).await?;
            let latest = versions.latest_for_device(save.id, device.id).await?;
            (save, location, duplicate, latest)
        };

        let incoming = IncomingUpload {
            local_modified_at,
            content_hash: &content_hash,
            byte_size,
        };
        let decision = decide_admission(
            location.sync_mode,
            duplicate.as_ref(),
            latest.as_ref(),
            &incoming,
        );

        match decision {
            AdmissionDecision::Skip { reason, existing } => {
                let mut log = SyncLog::new(
                    device.id,
                    SyncAction::Upload,
                    safe_path.clone(),
                    SyncStatus::Skipped,
                )
                .with_file_size(byte_size)
                .with_save(save.id)
                .with_error(reason.message());
                if let Some(version_id) = existing {
                    log = log.with_version(version_id);
                }
                self.append_log(&log).await?;

                tracing::info!(
                    save_id = %save.id,
                    device_id = %device.id,
                    reason = %reason.message(),
                    "upload skipped"
                );
                Ok(UploadOutcome::Skipped {
                    save_id: save.id,
                    reason,
                    existing_version_id: existing,
                    content_hash,
                })
            }
            AdmissionDecision::Accept => {
                let version_id = SaveVersionId::new();
                let storage_key =
                    SaveVersion::build_storage_key(&device.user_id.as_str(), &save.id, &version_id);

                // The blob write must complete before the version row exists;
                // a failed write leaves no metadata behind, only a failed log.
                match self.blobs.put(&storage_key, &request.bytes).await {
                    Ok(()) => {
                        let version = SaveVersion {
                            id: version_id,
                            save_id: save.id,
                            device_id: device.id,
                            content_hash: content_hash.clone(),
                            byte_size,
                            local_modified_at,
                            uploaded_at: now_ms,
                            storage_key,
                        };
                        {
                            let db = self.db.lock().await;
                            let conn = db.connection();
                            LibSqlVersionRepository::new(conn).create(&version).await?;
                            LibSqlLogRepository::new(conn)
                                .create(
                                    &SyncLog::new(
                                        device.id,
                                        SyncAction::Upload,
                                        safe_path.clone(),
                                        SyncStatus::Success,
                                    )
                                    .with_file_size(byte_size)
                                    .with_save(save.id)
                                    .with_version(version.id),
                                )
                                .await?;
                        }
                        tracing::info!(
                            save_id = %save.id,
                            version_id = %version.id,
                            device_id = %device.id,
                            byte_size,
                            "version uploaded"
                        );
                        Ok(UploadOutcome::Uploaded { version })
                    }
                    Err(error) => {
                        tracing::error!(
                            save_id = %save.id,
                            device_id = %device.id,
                            %error,
                            "blob write failed, degrading to logged-but-not-stored"
                        );
                        self.append_log(
                            &SyncLog::new(
                                device.id,
                                SyncAction::Upload,
                                safe_path.clone(),
                                SyncStatus::Failed,
                            )
                            .with_file_size(byte_size)
                            .with_save(save.id)
                            .with_error(error.to_string()),
                        )
                        .await?;
                        Ok(UploadOutcome::StorageFailed { save_id: save.id })
                    }
                }
            }
        }
    }

    /// Build the download view for `device`: every shared save the device
    /// has a sync-enabled mapping for, plus the user's shared saves it has
    /// not seen yet (`needs_mapping`).
    pub async fn build_manifest(&self, device: &Device) -> Result<Manifest> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let saves = LibSqlSaveRepository::new(conn)
            .list_for_user(&device.user_id)
            .await?;
        let device_locations = LibSqlLocationRepository::new(conn)
            .list_for_device(device.id)
            .await?;
        let versions_repo = LibSqlVersionRepository::new(conn);

        let mut locations_by_save: HashMap<SaveId, Vec<SaveLocation>> = HashMap::new();
        for location in device_locations {
            locations_by_save
                .entry(location.save_id)
                .or_default()
                .push(location);
        }

        let mut entries = Vec::new();
        let mut mapped_count = 0;
        let mut unmapped_count = 0;

        for save in saves.into_iter().filter(|save| save.is_shared()) {
            let versions = versions_repo.list_for_save(save.id).await?;
            let latest_version = select_latest_version(&versions).map(VersionSummary::from);

            match locations_by_save.get(&save.id) {
                Some(locations) => {
                    // A device can hold several paths for one save (e.g. two
                    // emulator cores); offer the most recently active one.
                    let Some(chosen) = locations
                        .iter()
                        .filter(|location| location.sync_mode.receives_downloads())
                        .max_by_key(|location| location.updated_at)
                    else {
                        // Mapped but not receiving downloads; not unmapped either
                        continue;
                    };
                    entries.push(ManifestEntry {
                        save_id: save.id,
                        save_key: save.save_key,
                        display_name: save.display_name,
                        local_path: Some(chosen.local_path.clone()),
                        needs_mapping: false,
                        latest_version,
                    });
                    mapped_count += 1;
                }
                None => {
                    // Signal the client to run the game once before this
                    // save can auto-sync; the server never guesses a path.
                    entries.push(ManifestEntry {
                        save_id: save.id,
                        save_key: save.save_key,
                        display_name: save.display_name,
                        local_path: None,
                        needs_mapping: true,
                        latest_version,
                    });
                    unmapped_count += 1;
                }
            }
        }

        tracing::debug!(
            device_id = %device.id,
            mapped_count,
            unmapped_count,
            "manifest built"
        );
        Ok(Manifest {
            entries,
            mapped_count,
            unmapped_count,
        })
    }

    /// Fetch the bytes for a version owned by the device's user.
    ///
    /// Returns `None` when the version does not exist or belongs to another
    /// user. The download event is recorded in the background; a logging
    /// failure never fails the download.
    pub async fn download(
        &self,
        device: &Device,
        version_id: &SaveVersionId,
    ) -> Result<Option<DownloadPayload>> {
        let (version, save) = {
            let db = self.db.lock().await;
            let conn = db.connection();
            let Some(version) = LibSqlVersionRepository::new(conn).get(version_id).await? else {
                return Ok(None);
            };
            let Some(save) = LibSqlSaveRepository::new(conn).get(&version.save_id).await? else {
                return Ok(None);
            };
            (version, save)
        };
        if save.user_id != device.user_id {
            return Ok(None);
        }

        let bytes = self.blobs.get(&version.storage_key).await?;

        let log = SyncLog::new(
            device.id,
            SyncAction::Download,
            save.display_name.clone(),
            SyncStatus::Success,
        )
        .with_file_size(version.byte_size)
        .with_save(version.save_id)
        .with_version(version.id);
        let db = self.db.clone();
        tokio::spawn(async move {
            let db = db.lock().await;
            if let Err(error) = LibSqlLogRepository::new(db.connection()).create(&log).await {
                tracing::warn!(%error, "failed to record download event");
            }
        });

        Ok(Some(DownloadPayload { bytes, version }))
    }

    /// The user's save library with per-save locations and latest version
    pub async fn list_saves(&self, user_id: &UserId) -> Result<Vec<SaveOverview>> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let saves = LibSqlSaveRepository::new(conn).list_for_user(user_id).await?;
        let locations_repo = LibSqlLocationRepository::new(conn);
        let versions_repo = LibSqlVersionRepository::new(conn);

        let mut overviews = Vec::with_capacity(saves.len());
        for save in saves {
            let locations = locations_repo.list_for_save(save.id).await?;
            let versions = versions_repo.list_for_save(save.id).await?;
            let latest_version = select_latest_version(&versions).map(VersionSummary::from);
            overviews.push(SaveOverview {
                save,
                locations,
                latest_version,
            });
        }
        Ok(overviews)
    }

    /// Flip a save's sync strategy. Promotion to `shared` is quota-gated.
    pub async fn set_sync_strategy(
        &self,
        user_id: &UserId,
        save_id: &SaveId,
        strategy: SyncStrategy,
    ) -> Result<Save> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let saves = LibSqlSaveRepository::new(conn);

        let save = saves
            .get(save_id)
            .await?
            .filter(|save| save.user_id == *user_id)
            .ok_or_else(|| Error::NotFound(save_id.to_string()))?;

        if strategy == SyncStrategy::Shared && save.sync_strategy != SyncStrategy::Shared {
            let PlanDecision {
                allowed, reason, ..
            } = plan::can_enable_shared_save(conn, user_id, Some(save_id)).await?;
            if !allowed {
                return Err(Error::PlanLimit(
                    reason.unwrap_or_else(|| "Shared save limit reached".to_string()),
                ));
            }
        }

        let now_ms = chrono::Utc::now().timestamp_millis();
        saves.set_sync_strategy(save_id, strategy, now_ms).await?;
        tracing::info!(save_id = %save_id, strategy = %strategy, "sync strategy changed");

        saves
            .get(save_id)
            .await?
            .ok_or_else(|| Error::NotFound(save_id.to_string()))
    }

    /// Change the sync mode of one device location
    pub async fn set_sync_mode(
        &self,
        user_id: &UserId,
        location_id: &SaveLocationId,
        sync_mode: SyncMode,
    ) -> Result<SaveLocation> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let locations = LibSqlLocationRepository::new(conn);

        let location = locations
            .get(location_id)
            .await?
            .ok_or_else(|| Error::NotFound(location_id.to_string()))?;
        let owned = LibSqlSaveRepository::new(conn)
            .get(&location.save_id)
            .await?
            .is_some_and(|save| save.user_id == *user_id);
        if !owned {
            return Err(Error::NotFound(location_id.to_string()));
        }

        let now_ms = chrono::Utc::now().timestamp_millis();
        locations.set_sync_mode(location_id, sync_mode, now_ms).await?;
        tracing::info!(location_id = %location_id, sync_mode = %sync_mode, "sync mode changed");

        locations
            .get(location_id)
            .await?
            .ok_or_else(|| Error::NotFound(location_id.to_string()))
    }

    /// Delete a save and its whole history on explicit user request.
    ///
    /// Version rows and locations cascade with the save; blob objects are
    /// removed best-effort, so a storage hiccup never strands the metadata
    /// deletion.
    pub async fn delete_save(&self, user_id: &UserId, save_id: &SaveId) -> Result<()> {
        let versions = {
            let db = self.db.lock().await;
            let conn = db.connection();
            let owned = LibSqlSaveRepository::new(conn)
                .get(save_id)
                .await?
                .is_some_and(|save| save.user_id == *user_id);
            if !owned {
                return Err(Error::NotFound(save_id.to_string()));
            }
            LibSqlVersionRepository::new(conn).list_for_save(*save_id).await?
        };

        for version in &versions {
            if let Err(error) = self.blobs.delete(&version.storage_key).await {
                tracing::warn!(
                    storage_key = %version.storage_key,
                    %error,
                    "failed to delete version blob, continuing"
                );
            }
        }

        let db = self.db.lock().await;
        LibSqlSaveRepository::new(db.connection()).delete(save_id).await?;
        tracing::info!(save_id = %save_id, version_count = versions.len(), "save deleted");
        Ok(())
    }

    /// Record a client-reported sync event
    pub async fn record_client_event(&self, log: &SyncLog) -> Result<()> {
        self.append_log(log).await
    }

    /// Newest-first page of sync events for the user's devices.
    ///
    /// With `device_id`, the listing narrows to that device after verifying
    /// it belongs to the user.
    pub async fn list_logs(
        &self,
        user_id: &UserId,
        device_id: Option<DeviceId>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<SyncLog>, u64)> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let devices = LibSqlDeviceRepository::new(conn);

        let filter = match device_id {
            Some(id) => {
                let owned = devices
                    .get(&id)
                    .await?
                    .is_some_and(|device| device.user_id == *user_id);
                if !owned {
                    return Err(Error::NotFound(id.to_string()));
                }
                LogFilter::ByDevice(id)
            }
            None => LogFilter::ByUserDevices(devices.list_ids_for_user(user_id).await?),
        };

        let logs_repo = LibSqlLogRepository::new(conn);
        let logs = logs_repo.list(&filter, limit, offset).await?;
        let total = logs_repo.count(&filter).await?;
        Ok((logs, total))
    }

    /// Record device liveness
    pub async fn heartbeat(&self, device: &Device) -> Result<()> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let db = self.db.lock().await;
        LibSqlDeviceRepository::new(db.connection())
            .touch_last_sync(&device.id, now_ms)
            .await
    }

    async fn append_log(&self, log: &SyncLog) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlLogRepository::new(db.connection()).create(log).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LibSqlUserRepository;
    use crate::models::{SubscriptionTier, User};
    use crate::reconcile::FALLBACK_DELTA_MS;
    use crate::storage::MemoryBlobStore;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    /// Blob store whose writes always fail, for degraded-path tests
    struct FailingBlobStore;

    #[async_trait]
    impl BlobStore for FailingBlobStore {
        async fn put(&self, _key: &str, _bytes: &[u8]) -> crate::Result<()> {
            Err(Error::Storage("simulated outage".to_string()))
        }

        async fn get(&self, key: &str) -> crate::Result<Vec<u8>> {
            Err(Error::Storage(format!("object not found: {key}")))
        }

        async fn delete(&self, _key: &str) -> crate::Result<()> {
            Ok(())
        }

        async fn head_exists(&self, _key: &str) -> crate::Result<bool> {
            Ok(false)
        }
    }

    struct Fixture {
        service: SyncService,
        blobs: Arc<MemoryBlobStore>,
        user: User,
        handheld: Device,
        desktop: Device,
    }

    async fn setup() -> Fixture {
        setup_with_tier(SubscriptionTier::Paid).await
    }

    async fn setup_with_tier(tier: SubscriptionTier) -> Fixture {
        let db = Database::open_in_memory().await.unwrap();
        let mut user = User::new("player@example.com");
        user.subscription_tier = tier;
        LibSqlUserRepository::new(db.connection())
            .create(&user)
            .await
            .unwrap();

        let handheld = Device::new(user.id, "Handheld", "muos", "key-handheld");
        let desktop = Device::new(user.id, "Desktop", "desktop", "key-desktop");
        let devices = LibSqlDeviceRepository::new(db.connection());
        devices.create(&handheld).await.unwrap();
        devices.create(&desktop).await.unwrap();

        let blobs = Arc::new(MemoryBlobStore::new());
        Fixture {
            service: SyncService::new(db, blobs.clone()),
            blobs,
            user,
            handheld,
            desktop,
        }
    }

    fn request(path: &str, bytes: &[u8], mtime_ms: i64) -> UploadRequest {
        UploadRequest {
            file_path: path.to_string(),
            file_size: Some(bytes.len() as u64),
            bytes: bytes.to_vec(),
            local_path: None,
            local_modified_at: Some(RawTimestamp::Millis(mtime_ms)),
            save_key: None,
            content_hash: None,
        }
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn uploaded_version(outcome: UploadOutcome) -> SaveVersion {
        match outcome {
            UploadOutcome::Uploaded { version } => version,
            other => panic!("expected upload, got {other:?}"),
        }
    }

    async fn log_count(fixture: &Fixture) -> u64 {
        let (_, total) = fixture
            .service
            .list_logs(&fixture.user.id, None, 1, 0)
            .await
            .unwrap();
        total
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_upload_creates_version_and_blob() {
        let fixture = setup().await;
        let outcome = fixture
            .service
            .upload(
                &fixture.handheld,
                request("/saves/zelda.srm", b"H1", now_ms() - DAY_MS),
            )
            .await
            .unwrap();

        let version = uploaded_version(outcome);
        assert_eq!(version.device_id, fixture.handheld.id);
        assert_eq!(version.byte_size, 2);
        assert!(fixture
            .blobs
            .head_exists(&version.storage_key)
            .await
            .unwrap());
        assert_eq!(log_count(&fixture).await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn idempotent_reupload_is_skipped_unchanged() {
        let fixture = setup().await;
        let mtime = now_ms() - DAY_MS;
        let first = fixture
            .service
            .upload(&fixture.handheld, request("/saves/zelda.srm", b"H1", mtime))
            .await
            .unwrap();
        let version = uploaded_version(first);

        let second = fixture
            .service
            .upload(&fixture.handheld, request("/saves/zelda.srm", b"H1", mtime))
            .await
            .unwrap();
        match second {
            UploadOutcome::Skipped {
                reason,
                existing_version_id,
                ..
            } => {
                assert_eq!(reason, SkipReason::Unchanged);
                assert_eq!(existing_version_id, Some(version.id));
            }
            other => panic!("expected skip, got {other:?}"),
        }
        assert_eq!(fixture.blobs.len().await, 1);
        assert_eq!(log_count(&fixture).await, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dedup_across_paths_keeps_one_version_two_locations() {
        let fixture = setup().await;
        let mtime = now_ms() - DAY_MS;
        let first = fixture
            .service
            .upload(
                &fixture.handheld,
                UploadRequest {
                    save_key: Some("saves/zelda".to_string()),
                    ..request("/core-a/zelda.srm", b"H1", mtime)
                },
            )
            .await
            .unwrap();
        let version = uploaded_version(first);

        let second = fixture
            .service
            .upload(
                &fixture.handheld,
                UploadRequest {
                    save_key: Some("saves/zelda".to_string()),
                    ..request("/core-b/zelda.srm", b"H1", mtime + 60_000)
                },
            )
            .await
            .unwrap();
        match second {
            UploadOutcome::Skipped { reason, .. } => {
                assert_eq!(reason, SkipReason::ContentExists);
            }
            other => panic!("expected skip, got {other:?}"),
        }

        // One version, one blob, two registered paths
        assert_eq!(fixture.blobs.len().await, 1);
        let overviews = fixture.service.list_saves(&fixture.user.id).await.unwrap();
        assert_eq!(overviews.len(), 1);
        assert_eq!(overviews[0].locations.len(), 2);
        assert_eq!(
            overviews[0].latest_version.as_ref().unwrap().id,
            version.id
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dedup_spans_devices() {
        let fixture = setup().await;
        let mtime = now_ms() - DAY_MS;
        fixture
            .service
            .upload(&fixture.handheld, request("/saves/zelda.srm", b"H1", mtime))
            .await
            .unwrap();

        let from_desktop = fixture
            .service
            .upload(
                &fixture.desktop,
                request("/saves/zelda.srm", b"H1", mtime + 60_000),
            )
            .await
            .unwrap();
        match from_desktop {
            UploadOutcome::Skipped { reason, .. } => {
                assert_eq!(reason, SkipReason::ContentExists);
            }
            other => panic!("expected skip, got {other:?}"),
        }
        assert_eq!(fixture.blobs.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stale_upload_is_rejected_and_newer_accepted() {
        let fixture = setup().await;
        let mtime = now_ms() - DAY_MS;
        fixture
            .service
            .upload(&fixture.handheld, request("/saves/zelda.srm", b"H1", mtime))
            .await
            .unwrap();

        let stale = fixture
            .service
            .upload(
                &fixture.handheld,
                request("/saves/zelda.srm", b"H0", mtime - 10_000),
            )
            .await
            .unwrap();
        match stale {
            UploadOutcome::Skipped { reason, .. } => {
                assert_eq!(reason, SkipReason::OlderThanExisting { delta_ms: 10_000 });
            }
            other => panic!("expected skip, got {other:?}"),
        }
        assert_eq!(fixture.blobs.len().await, 1);

        let newer = fixture
            .service
            .upload(
                &fixture.handheld,
                request("/saves/zelda.srm", b"H2", mtime + 10_000),
            )
            .await
            .unwrap();
        let version = uploaded_version(newer);
        assert_eq!(version.local_modified_at, mtime + 10_000);
        assert_eq!(fixture.blobs.len().await, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn corrupted_future_mtime_is_clamped_to_upload_time() {
        let fixture = setup().await;
        let outcome = fixture
            .service
            .upload(
                &fixture.handheld,
                UploadRequest {
                    local_modified_at: Some(RawTimestamp::Text(
                        "2099-01-01T00:00:00Z".to_string(),
                    )),
                    ..request("/saves/zelda.srm", b"H1", 0)
                },
            )
            .await
            .unwrap();

        let version = uploaded_version(outcome);
        // Clamped to server receipt time, i.e. classified as fallback
        assert!((version.uploaded_at - version.local_modified_at).abs() <= FALLBACK_DELTA_MS);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn local_path_is_immutable_after_first_upload() {
        let fixture = setup().await;
        let mtime = now_ms() - DAY_MS;
        fixture
            .service
            .upload(
                &fixture.handheld,
                UploadRequest {
                    save_key: Some("saves/zelda".to_string()),
                    local_path: Some("/a/b.sav".to_string()),
                    ..request("/a/b.sav", b"H1", mtime)
                },
            )
            .await
            .unwrap();

        // Re-scan reports a differently-formatted path for the same save
        fixture
            .service
            .upload(
                &fixture.handheld,
                UploadRequest {
                    save_key: Some("saves/zelda".to_string()),
                    local_path: Some("/A/B.SAV".to_string()),
                    ..request("/a/b.sav", b"H2", mtime + 60_000)
                },
            )
            .await
            .unwrap();

        let overviews = fixture.service.list_saves(&fixture.user.id).await.unwrap();
        let paths: Vec<&str> = overviews[0]
            .locations
            .iter()
            .map(|location| location.local_path.as_str())
            .collect();
        // The original mapping survives untouched; the new path is its own mapping
        assert!(paths.contains(&"/a/b.sav"));
        assert!(paths.contains(&"/A/B.SAV"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disabled_location_skips_without_version() {
        let fixture = setup().await;
        let mtime = now_ms() - DAY_MS;
        fixture
            .service
            .upload(&fixture.handheld, request("/saves/zelda.srm", b"H1", mtime))
            .await
            .unwrap();

        let overviews = fixture.service.list_saves(&fixture.user.id).await.unwrap();
        let location_id = overviews[0].locations[0].id;
        fixture
            .service
            .set_sync_mode(&fixture.user.id, &location_id, SyncMode::Disabled)
            .await
            .unwrap();

        let outcome = fixture
            .service
            .upload(
                &fixture.handheld,
                request("/saves/zelda.srm", b"H2", mtime + 60_000),
            )
            .await
            .unwrap();
        match outcome {
            UploadOutcome::Skipped { reason, .. } => {
                assert_eq!(reason, SkipReason::SyncDisabled);
            }
            other => panic!("expected skip, got {other:?}"),
        }
        assert_eq!(fixture.blobs.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn per_device_saves_never_appear_in_manifests() {
        let fixture = setup().await;
        fixture
            .service
            .upload(
                &fixture.handheld,
                request("/saves/zelda.srm", b"H1", now_ms() - DAY_MS),
            )
            .await
            .unwrap();

        // Default strategy is per_device: nothing is distributed
        let manifest = fixture
            .service
            .build_manifest(&fixture.desktop)
            .await
            .unwrap();
        assert!(manifest.entries.is_empty());

        let own_manifest = fixture
            .service
            .build_manifest(&fixture.handheld)
            .await
            .unwrap();
        assert!(own_manifest.entries.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn end_to_end_two_devices_converge() {
        let fixture = setup().await;
        let m1 = now_ms() - 2 * DAY_MS;

        // D1 uploads H1 at mtime M1
        let first = fixture
            .service
            .upload(&fixture.handheld, request("/saves/zelda.srm", b"H1", m1))
            .await
            .unwrap();
        let v1 = uploaded_version(first);

        let save_id = v1.save_id;
        fixture
            .service
            .set_sync_strategy(&fixture.user.id, &save_id, SyncStrategy::Shared)
            .await
            .unwrap();

        // D2 has no mapping yet: unmapped entry pointing at H1
        let manifest = fixture
            .service
            .build_manifest(&fixture.desktop)
            .await
            .unwrap();
        assert_eq!(manifest.unmapped_count, 1);
        assert_eq!(manifest.mapped_count, 0);
        let entry = &manifest.entries[0];
        assert!(entry.needs_mapping);
        assert_eq!(entry.local_path, None);
        assert_eq!(
            entry.latest_version.as_ref().unwrap().content_hash,
            v1.content_hash
        );

        // D2 uploads H2 at M2 > M1; D1's next manifest returns H2
        let m2 = m1 + DAY_MS;
        let second = fixture
            .service
            .upload(&fixture.desktop, request("/saves/zelda.srm", b"H2", m2))
            .await
            .unwrap();
        let v2 = uploaded_version(second);

        let manifest = fixture
            .service
            .build_manifest(&fixture.handheld)
            .await
            .unwrap();
        assert_eq!(manifest.mapped_count, 1);
        let entry = &manifest.entries[0];
        assert!(!entry.needs_mapping);
        assert_eq!(entry.local_path.as_deref(), Some("/saves/zelda.srm"));
        assert_eq!(
            entry.latest_version.as_ref().unwrap().content_hash,
            v2.content_hash
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn safety_override_prefers_fresh_fallback_upload() {
        let fixture = setup().await;

        // Device A has a real mtime from 30 days ago
        let stale = fixture
            .service
            .upload(
                &fixture.handheld,
                request("/saves/zelda.srm", b"OLD", now_ms() - 30 * DAY_MS),
            )
            .await
            .unwrap();
        let save_id = uploaded_version(stale).save_id;
        fixture
            .service
            .set_sync_strategy(&fixture.user.id, &save_id, SyncStrategy::Shared)
            .await
            .unwrap();

        // Device B has no real clock: mtime omitted, falls back to upload time
        let fresh = fixture
            .service
            .upload(
                &fixture.desktop,
                UploadRequest {
                    local_modified_at: None,
                    ..request("/saves/zelda.srm", b"NEW", 0)
                },
            )
            .await
            .unwrap();
        let fresh_version = uploaded_version(fresh);

        let manifest = fixture
            .service
            .build_manifest(&fixture.handheld)
            .await
            .unwrap();
        let entry = &manifest.entries[0];
        assert_eq!(
            entry.latest_version.as_ref().unwrap().id,
            fresh_version.id,
            "fallback upload a month newer than the real mtime must win"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn storage_failure_degrades_to_failed_log() {
        let db = Database::open_in_memory().await.unwrap();
        let user = User::new("player@example.com");
        LibSqlUserRepository::new(db.connection())
            .create(&user)
            .await
            .unwrap();
        let device = Device::new(user.id, "Handheld", "muos", "key-handheld");
        LibSqlDeviceRepository::new(db.connection())
            .create(&device)
            .await
            .unwrap();
        let service = SyncService::new(db, Arc::new(FailingBlobStore));

        let outcome = service
            .upload(&device, request("/saves/zelda.srm", b"H1", now_ms() - DAY_MS))
            .await
            .unwrap();
        match outcome {
            UploadOutcome::StorageFailed { save_id } => {
                // No version row was created for the failed write
                let overviews = service.list_saves(&user.id).await.unwrap();
                assert_eq!(overviews[0].save.id, save_id);
                assert!(overviews[0].latest_version.is_none());
            }
            other => panic!("expected storage failure, got {other:?}"),
        }

        // Exactly one terminal log row, status failed
        let (logs, total) = service.list_logs(&user.id, None, 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(logs[0].status, SyncStatus::Failed);
        assert!(logs[0].error_msg.as_ref().unwrap().contains("outage"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn every_upload_attempt_writes_one_log_row() {
        let fixture = setup().await;
        let mtime = now_ms() - DAY_MS;
        // accepted, unchanged, stale
        fixture
            .service
            .upload(&fixture.handheld, request("/saves/zelda.srm", b"H1", mtime))
            .await
            .unwrap();
        fixture
            .service
            .upload(&fixture.handheld, request("/saves/zelda.srm", b"H1", mtime))
            .await
            .unwrap();
        fixture
            .service
            .upload(
                &fixture.handheld,
                request("/saves/zelda.srm", b"H0", mtime - 60_000),
            )
            .await
            .unwrap();

        assert_eq!(log_count(&fixture).await, 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn free_tier_cannot_exceed_shared_save_quota() {
        let fixture = setup_with_tier(SubscriptionTier::Free).await;
        let mtime = now_ms() - DAY_MS;

        for index in 0..4 {
            fixture
                .service
                .upload(
                    &fixture.handheld,
                    request(&format!("/saves/game-{index}.srm"), b"H1", mtime),
                )
                .await
                .unwrap();
        }

        let overviews = fixture.service.list_saves(&fixture.user.id).await.unwrap();
        let mut save_ids: Vec<SaveId> = overviews
            .iter()
            .map(|overview| overview.save.id)
            .collect();
        let last = save_ids.pop().unwrap();

        for save_id in &save_ids {
            fixture
                .service
                .set_sync_strategy(&fixture.user.id, save_id, SyncStrategy::Shared)
                .await
                .unwrap();
        }

        let denied = fixture
            .service
            .set_sync_strategy(&fixture.user.id, &last, SyncStrategy::Shared)
            .await;
        assert!(matches!(denied, Err(Error::PlanLimit(_))));

        // Re-promoting an already-shared save is always allowed
        fixture
            .service
            .set_sync_strategy(&fixture.user.id, &save_ids[0], SyncStrategy::Shared)
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn policy_endpoints_reject_foreign_owners() {
        let fixture = setup().await;
        fixture
            .service
            .upload(
                &fixture.handheld,
                request("/saves/zelda.srm", b"H1", now_ms() - DAY_MS),
            )
            .await
            .unwrap();
        let overviews = fixture.service.list_saves(&fixture.user.id).await.unwrap();
        let save_id = overviews[0].save.id;
        let location_id = overviews[0].locations[0].id;

        let stranger = UserId::new();
        assert!(matches!(
            fixture
                .service
                .set_sync_strategy(&stranger, &save_id, SyncStrategy::Shared)
                .await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            fixture
                .service
                .set_sync_mode(&stranger, &location_id, SyncMode::Disabled)
                .await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn download_returns_bytes_and_records_event() {
        let fixture = setup().await;
        let outcome = fixture
            .service
            .upload(
                &fixture.desktop,
                request("/saves/zelda.srm", b"H1", now_ms() - DAY_MS),
            )
            .await
            .unwrap();
        let version = uploaded_version(outcome);

        let payload = fixture
            .service
            .download(&fixture.handheld, &version.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload.bytes, b"H1");
        assert_eq!(payload.version.id, version.id);

        // The download log is written in the background
        let mut saw_download_log = false;
        for _attempt in 0..20 {
            let (logs, _) = fixture
                .service
                .list_logs(&fixture.user.id, Some(fixture.handheld.id), 10, 0)
                .await
                .unwrap();
            if logs
                .iter()
                .any(|log| log.action == SyncAction::Download && log.status == SyncStatus::Success)
            {
                saw_download_log = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
        assert!(saw_download_log);

        assert!(fixture
            .service
            .download(&fixture.handheld, &SaveVersionId::new())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn log_listing_scopes_to_device_or_user() {
        let fixture = setup().await;
        let mtime = now_ms() - DAY_MS;
        fixture
            .service
            .upload(&fixture.handheld, request("/saves/a.srm", b"A", mtime))
            .await
            .unwrap();
        fixture
            .service
            .upload(&fixture.desktop, request("/saves/b.srm", b"B", mtime))
            .await
            .unwrap();

        let (all, total) = fixture
            .service
            .list_logs(&fixture.user.id, None, 10, 0)
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(all.len(), 2);

        let (scoped, scoped_total) = fixture
            .service
            .list_logs(&fixture.user.id, Some(fixture.handheld.id), 10, 0)
            .await
            .unwrap();
        assert_eq!(scoped_total, 1);
        assert_eq!(scoped[0].device_id, fixture.handheld.id);

        // A device the user does not own is not a valid scope
        assert!(fixture
            .service
            .list_logs(&UserId::new(), Some(fixture.handheld.id), 10, 0)
            .await
            .is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_save_removes_history_and_blobs() {
        let fixture = setup().await;
        let mtime = now_ms() - DAY_MS;
        fixture
            .service
            .upload(&fixture.handheld, request("/saves/zelda.srm", b"H1", mtime))
            .await
            .unwrap();
        fixture
            .service
            .upload(
                &fixture.handheld,
                request("/saves/zelda.srm", b"H2", mtime + 60_000),
            )
            .await
            .unwrap();
        assert_eq!(fixture.blobs.len().await, 2);

        let save_id = fixture.service.list_saves(&fixture.user.id).await.unwrap()[0]
            .save
            .id;
        fixture
            .service
            .delete_save(&fixture.user.id, &save_id)
            .await
            .unwrap();

        assert!(fixture.blobs.is_empty().await);
        assert!(fixture
            .service
            .list_saves(&fixture.user.id)
            .await
            .unwrap()
            .is_empty());

        // A stranger can neither see nor delete
        assert!(matches!(
            fixture.service.delete_save(&UserId::new(), &save_id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn heartbeat_touches_last_sync() {
        let fixture = setup().await;
        fixture.service.heartbeat(&fixture.handheld).await.unwrap();

        let device = fixture
            .service
            .authenticate_device("key-handheld")
            .await
            .unwrap()
            .unwrap();
        assert!(device.last_sync_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn traversal_paths_are_rejected_before_any_state() {
        let fixture = setup().await;
        let result = fixture
            .service
            .upload(
                &fixture.handheld,
                request("/saves/../../etc/passwd", b"H1", now_ms()),
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(fixture.blobs.is_empty().await);
        assert_eq!(log_count(&fixture).await, 0);
        assert!(fixture
            .service
            .list_saves(&fixture.user.id)
            .await
            .unwrap()
            .is_empty());
    }
}
