//! Device repository implementation

use libsql::Connection;

use crate::error::{Error, Result};
use crate::models::{Device, DeviceId, UserId};

/// libSQL implementation of device storage
pub struct LibSqlDeviceRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlDeviceRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a new device
    pub async fn create(&self, device: &Device) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO devices
                 (id, user_id, name, device_type, api_key, last_sync_at, is_active, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    device.id.as_str(),
                    device.user_id.as_str(),
                    device.name.clone(),
                    device.device_type.clone(),
                    device.api_key.clone(),
                    device.last_sync_at,
                    i32::from(device.is_active),
                    device.created_at
                ],
            )
            .await?;
        Ok(())
    }

    /// Fetch a device by id
    pub async fn get(&self, id: &DeviceId) -> Result<Option<Device>> {
        self.query_one("WHERE id = ?", id.as_str()).await
    }

    /// Authenticate: fetch an active device by its API key
    pub async fn find_by_api_key(&self, api_key: &str) -> Result<Option<Device>> {
        self.query_one("WHERE api_key = ? AND is_active = 1", api_key.to_string())
            .await
    }

    async fn query_one(&self, where_clause: &str, param: String) -> Result<Option<Device>> {
        let sql = format!(
            "SELECT id, user_id, name, device_type, api_key, last_sync_at, is_active, created_at
             FROM devices {where_clause}"
        );
        let mut rows = self.conn.query(&sql, libsql::params![param]).await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(parse_device(&row)?))
    }

    /// All device ids owned by a user
    pub async fn list_ids_for_user(&self, user_id: &UserId) -> Result<Vec<DeviceId>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM devices WHERE user_id = ? ORDER BY created_at",
                libsql::params![user_id.as_str()],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            ids.push(
                id.parse()
                    .map_err(|_| Error::Database("Invalid device ID".into()))?,
            );
        }
        Ok(ids)
    }

    /// Record sync activity (heartbeat)
    pub async fn touch_last_sync(&self, id: &DeviceId, now_ms: i64) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE devices SET last_sync_at = ? WHERE id = ?",
                libsql::params![now_ms, id.as_str()],
            )
            .await?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }
}

fn parse_device(row: &libsql::Row) -> Result<Device> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    Ok(Device {
        id: id
            .parse()
            .map_err(|_| Error::Database("Invalid device ID".into()))?,
        user_id: user_id
            .parse()
            .map_err(|_| Error::Database("Invalid user ID".into()))?,
        name: row.get(2)?,
        device_type: row.get(3)?,
        api_key: row.get(4)?,
        last_sync_at: row.get(5)?,
        is_active: row.get::<i32>(6)? != 0,
        created_at: row.get(7)?,
    })
}
