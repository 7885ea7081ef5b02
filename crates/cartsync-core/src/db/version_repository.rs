//! Save version repository implementation
//!
//! Versions are append-only history: rows are inserted once and never
//! updated or deleted except through the owning save's cascade.

use libsql::Connection;

use crate::error::{Error, Result};
use crate::models::{DeviceId, SaveId, SaveVersion, SaveVersionId};

/// libSQL implementation of version storage
pub struct LibSqlVersionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlVersionRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a new immutable version row
    pub async fn create(&self, version: &SaveVersion) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO save_versions
                 (id, save_id, device_id, content_hash, byte_size, local_modified_at,
                  uploaded_at, storage_key)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    version.id.as_str(),
                    version.save_id.as_str(),
                    version.device_id.as_str(),
                    version.content_hash.clone(),
                    i64::try_from(version.byte_size)
                        .map_err(|_| Error::InvalidInput("byte_size overflows i64".into()))?,
                    version.local_modified_at,
                    version.uploaded_at,
                    version.storage_key.clone()
                ],
            )
            .await?;
        Ok(())
    }

    /// Fetch a version by id
    pub async fn get(&self, id: &SaveVersionId) -> Result<Option<SaveVersion>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, save_id, device_id, content_hash, byte_size, local_modified_at,
                        uploaded_at, storage_key
                 FROM save_versions WHERE id = ?",
                libsql::params![id.as_str()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(parse_version(&row)?))
    }

    /// Find a byte-identical version anywhere in the save's history
    /// (any device), newest upload first
    pub async fn find_by_content_hash(
        &self,
        save_id: SaveId,
        content_hash: &str,
    ) -> Result<Option<SaveVersion>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, save_id, device_id, content_hash, byte_size, local_modified_at,
                        uploaded_at, storage_key
                 FROM save_versions
                 WHERE save_id = ? AND content_hash = ?
                 ORDER BY uploaded_at DESC LIMIT 1",
                libsql::params![save_id.as_str(), content_hash.to_string()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(parse_version(&row)?))
    }

    /// The uploading device's most recent version for a save,
    /// by local mtime then upload time
    pub async fn latest_for_device(
        &self,
        save_id: SaveId,
        device_id: DeviceId,
    ) -> Result<Option<SaveVersion>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, save_id, device_id, content_hash, byte_size, local_modified_at,
                        uploaded_at, storage_key
                 FROM save_versions
                 WHERE save_id = ? AND device_id = ?
                 ORDER BY local_modified_at DESC, uploaded_at DESC LIMIT 1",
                libsql::params![save_id.as_str(), device_id.as_str()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(parse_version(&row)?))
    }

    /// Full version history for a save, newest upload first
    pub async fn list_for_save(&self, save_id: SaveId) -> Result<Vec<SaveVersion>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, save_id, device_id, content_hash, byte_size, local_modified_at,
                        uploaded_at, storage_key
                 FROM save_versions WHERE save_id = ? ORDER BY uploaded_at DESC",
                libsql::params![save_id.as_str()],
            )
            .await?;

        let mut versions = Vec::new();
        while let Some(row) = rows.next().await? {
            versions.push(parse_version(&row)?);
        }
        Ok(versions)
    }
}

fn parse_version(row: &libsql::Row) -> Result<SaveVersion> {
    let id: String = row.get(0)?;
    let save_id: String = row.get(1)?;
    let device_id: String = row.get(2)?;
    let byte_size: i64 = row.get(4)?;
    Ok(SaveVersion {
        id: id
            .parse()
            .map_err(|_| Error::Database("Invalid version ID".into()))?,
        save_id: save_id
            .parse()
            .map_err(|_| Error::Database("Invalid save ID".into()))?,
        device_id: device_id
            .parse()
            .map_err(|_| Error::Database("Invalid device ID".into()))?,
        content_hash: row.get(3)?,
        byte_size: u64::try_from(byte_size).unwrap_or(0),
        local_modified_at: row.get(5)?,
        uploaded_at: row.get(6)?,
        storage_key: row.get(7)?,
    })
}
