//! Save repository implementation

use libsql::Connection;

use crate::error::{Error, Result};
use crate::models::{Save, SaveId, SyncStrategy, UserId};

/// libSQL implementation of logical-save storage
pub struct LibSqlSaveRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSaveRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Resolve or create the logical save for (user, normalized key).
    ///
    /// On conflict the display name and updated_at are refreshed
    /// (last-writer-wins for display only); identity fields never change.
    pub async fn upsert(
        &self,
        user_id: &UserId,
        save_key: &str,
        display_name: &str,
    ) -> Result<Save> {
        let candidate = Save::new(*user_id, save_key, display_name);
        self.conn
            .execute(
                "INSERT INTO saves
                 (id, user_id, save_key, display_name, sync_strategy, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(user_id, save_key) DO UPDATE SET
                     display_name = excluded.display_name,
                     updated_at = excluded.updated_at",
                libsql::params![
                    candidate.id.as_str(),
                    candidate.user_id.as_str(),
                    candidate.save_key.clone(),
                    candidate.display_name.clone(),
                    candidate.sync_strategy.as_str(),
                    candidate.created_at,
                    candidate.updated_at
                ],
            )
            .await?;

        self.get_by_key(user_id, save_key)
            .await?
            .ok_or_else(|| Error::Database("Save upsert did not persist".into()))
    }

    /// Fetch a save by id
    pub async fn get(&self, id: &SaveId) -> Result<Option<Save>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, save_key, display_name, sync_strategy, created_at, updated_at
                 FROM saves WHERE id = ?",
                libsql::params![id.as_str()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(parse_save(&row)?))
    }

    /// Fetch a save by its identity key
    pub async fn get_by_key(&self, user_id: &UserId, save_key: &str) -> Result<Option<Save>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, save_key, display_name, sync_strategy, created_at, updated_at
                 FROM saves WHERE user_id = ? AND save_key = ?",
                libsql::params![user_id.as_str(), save_key.to_string()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(parse_save(&row)?))
    }

    /// All saves owned by a user, most recently updated first
    pub async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Save>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, save_key, display_name, sync_strategy, created_at, updated_at
                 FROM saves WHERE user_id = ? ORDER BY updated_at DESC",
                libsql::params![user_id.as_str()],
            )
            .await?;

        let mut saves = Vec::new();
        while let Some(row) = rows.next().await? {
            saves.push(parse_save(&row)?);
        }
        Ok(saves)
    }

    /// Flip the cross-device sync strategy for a save
    pub async fn set_sync_strategy(
        &self,
        id: &SaveId,
        strategy: SyncStrategy,
        now_ms: i64,
    ) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE saves SET sync_strategy = ?, updated_at = ? WHERE id = ?",
                libsql::params![strategy.as_str(), now_ms, id.as_str()],
            )
            .await?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete a save; locations and versions go with it via cascade
    pub async fn delete(&self, id: &SaveId) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM saves WHERE id = ?", libsql::params![id.as_str()])
            .await?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Count a user's shared saves, optionally excluding one save
    /// (the one currently being promoted)
    pub async fn count_shared(
        &self,
        user_id: &UserId,
        exclude: Option<&SaveId>,
    ) -> Result<u64> {
        let mut rows = match exclude {
            Some(save_id) => {
                self.conn
                    .query(
                        "SELECT COUNT(*) FROM saves
                         WHERE user_id = ? AND sync_strategy = 'shared' AND id != ?",
                        libsql::params![user_id.as_str(), save_id.as_str()],
                    )
                    .await?
            }
            None => {
                self.conn
                    .query(
                        "SELECT COUNT(*) FROM saves
                         WHERE user_id = ? AND sync_strategy = 'shared'",
                        libsql::params![user_id.as_str()],
                    )
                    .await?
            }
        };

        let Some(row) = rows.next().await? else {
            return Ok(0);
        };
        let count: i64 = row.get(0)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

fn parse_save(row: &libsql::Row) -> Result<Save> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let strategy: String = row.get(4)?;
    Ok(Save {
        id: id
            .parse()
            .map_err(|_| Error::Database("Invalid save ID".into()))?,
        user_id: user_id
            .parse()
            .map_err(|_| Error::Database("Invalid user ID".into()))?,
        save_key: row.get(2)?,
        display_name: row.get(3)?,
        sync_strategy: strategy.parse().map_err(Error::Database)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
