//! Save location repository implementation

use libsql::Connection;

use crate::error::{Error, Result};
use crate::models::{DeviceId, SaveId, SaveLocation, SaveLocationId, SyncMode};

/// libSQL implementation of save-location storage
pub struct LibSqlLocationRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlLocationRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Ensure the (save, device, path) mapping exists.
    ///
    /// `local_path` is part of the identity and is therefore never rewritten;
    /// on conflict only the device type and updated_at are refreshed.
    pub async fn upsert(
        &self,
        save_id: SaveId,
        device_id: DeviceId,
        device_type: &str,
        local_path: &str,
    ) -> Result<SaveLocation> {
        let candidate = SaveLocation::new(save_id, device_id, device_type, local_path);
        self.conn
            .execute(
                "INSERT INTO save_locations
                 (id, save_id, device_id, device_type, local_path, sync_mode, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(save_id, device_id, local_path) DO UPDATE SET
                     device_type = excluded.device_type,
                     updated_at = excluded.updated_at",
                libsql::params![
                    candidate.id.as_str(),
                    candidate.save_id.as_str(),
                    candidate.device_id.as_str(),
                    candidate.device_type.clone(),
                    candidate.local_path.clone(),
                    candidate.sync_mode.as_str(),
                    candidate.created_at,
                    candidate.updated_at
                ],
            )
            .await?;

        self.find(save_id, device_id, local_path)
            .await?
            .ok_or_else(|| Error::Database("Save location upsert did not persist".into()))
    }

    /// Fetch a location by id
    pub async fn get(&self, id: &SaveLocationId) -> Result<Option<SaveLocation>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, save_id, device_id, device_type, local_path, sync_mode,
                        created_at, updated_at
                 FROM save_locations WHERE id = ?",
                libsql::params![id.as_str()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(parse_location(&row)?))
    }

    /// Fetch the location for an exact (save, device, path) triple
    pub async fn find(
        &self,
        save_id: SaveId,
        device_id: DeviceId,
        local_path: &str,
    ) -> Result<Option<SaveLocation>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, save_id, device_id, device_type, local_path, sync_mode,
                        created_at, updated_at
                 FROM save_locations
                 WHERE save_id = ? AND device_id = ? AND local_path = ?",
                libsql::params![
                    save_id.as_str(),
                    device_id.as_str(),
                    local_path.to_string()
                ],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(parse_location(&row)?))
    }

    /// All locations registered by a device, most recently updated first
    pub async fn list_for_device(&self, device_id: DeviceId) -> Result<Vec<SaveLocation>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, save_id, device_id, device_type, local_path, sync_mode,
                        created_at, updated_at
                 FROM save_locations WHERE device_id = ? ORDER BY updated_at DESC",
                libsql::params![device_id.as_str()],
            )
            .await?;

        let mut locations = Vec::new();
        while let Some(row) = rows.next().await? {
            locations.push(parse_location(&row)?);
        }
        Ok(locations)
    }

    /// All locations (across devices) pointing at a save
    pub async fn list_for_save(&self, save_id: SaveId) -> Result<Vec<SaveLocation>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, save_id, device_id, device_type, local_path, sync_mode,
                        created_at, updated_at
                 FROM save_locations WHERE save_id = ? ORDER BY updated_at DESC",
                libsql::params![save_id.as_str()],
            )
            .await?;

        let mut locations = Vec::new();
        while let Some(row) = rows.next().await? {
            locations.push(parse_location(&row)?);
        }
        Ok(locations)
    }

    /// Change the sync mode for a location
    pub async fn set_sync_mode(
        &self,
        id: &SaveLocationId,
        sync_mode: SyncMode,
        now_ms: i64,
    ) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE save_locations SET sync_mode = ?, updated_at = ? WHERE id = ?",
                libsql::params![sync_mode.as_str(), now_ms, id.as_str()],
            )
            .await?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }
}

fn parse_location(row: &libsql::Row) -> Result<SaveLocation> {
    let id: String = row.get(0)?;
    let save_id: String = row.get(1)?;
    let device_id: String = row.get(2)?;
    let sync_mode: String = row.get(5)?;
    Ok(SaveLocation {
        id: id
            .parse()
            .map_err(|_| Error::Database("Invalid location ID".into()))?,
        save_id: save_id
            .parse()
            .map_err(|_| Error::Database("Invalid save ID".into()))?,
        device_id: device_id
            .parse()
            .map_err(|_| Error::Database("Invalid device ID".into()))?,
        device_type: row.get(3)?,
        local_path: row.get(4)?,
        sync_mode: sync_mode.parse().map_err(Error::Database)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
