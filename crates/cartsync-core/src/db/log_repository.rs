//! Sync log repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use libsql::Connection;

use crate::error::{Error, Result};
use crate::models::{DeviceId, LogFilter, SyncLog};

/// libSQL implementation of sync-log storage
pub struct LibSqlLogRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlLogRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Append a sync event
    pub async fn create(&self, log: &SyncLog) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_logs
                 (id, device_id, action, file_path, file_size, status, error_msg,
                  save_id, save_version_id, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    log.id.clone(),
                    log.device_id.as_str(),
                    log.action.as_str(),
                    log.file_path.clone(),
                    log.file_size.map(|size| i64::try_from(size).unwrap_or(i64::MAX)),
                    log.status.as_str(),
                    log.error_msg.clone(),
                    log.save_id.map(|id| id.as_str()),
                    log.save_version_id.map(|id| id.as_str()),
                    log.created_at
                ],
            )
            .await?;
        Ok(())
    }

    /// Newest-first page of sync events within the filter's scope
    pub async fn list(
        &self,
        filter: &LogFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SyncLog>> {
        let (scope_sql, scope_ids) = scope_clause(filter);
        if scope_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, device_id, action, file_path, file_size, status, error_msg,
                    save_id, save_version_id, created_at
             FROM sync_logs WHERE {scope_sql}
             ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );

        let mut params: Vec<libsql::Value> = scope_ids
            .into_iter()
            .map(libsql::Value::Text)
            .collect();
        params.push(libsql::Value::Integer(limit as i64));
        params.push(libsql::Value::Integer(offset as i64));

        let mut rows = self
            .conn
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut logs = Vec::new();
        while let Some(row) = rows.next().await? {
            logs.push(parse_log(&row)?);
        }
        Ok(logs)
    }

    /// Total number of sync events within the filter's scope
    pub async fn count(&self, filter: &LogFilter) -> Result<u64> {
        let (scope_sql, scope_ids) = scope_clause(filter);
        if scope_ids.is_empty() {
            return Ok(0);
        }

        let sql = format!("SELECT COUNT(*) FROM sync_logs WHERE {scope_sql}");
        let params: Vec<libsql::Value> = scope_ids
            .into_iter()
            .map(libsql::Value::Text)
            .collect();

        let mut rows = self
            .conn
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(0);
        };
        let count: i64 = row.get(0)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

/// Expand a [`LogFilter`] into a WHERE fragment plus its bound device ids
fn scope_clause(filter: &LogFilter) -> (String, Vec<String>) {
    match filter {
        LogFilter::ByDevice(device_id) => ("device_id = ?".to_string(), vec![device_id.as_str()]),
        LogFilter::ByUserDevices(device_ids) => {
            let placeholders = vec!["?"; device_ids.len()].join(", ");
            (
                format!("device_id IN ({placeholders})"),
                device_ids.iter().map(DeviceId::as_str).collect(),
            )
        }
    }
}

fn parse_log(row: &libsql::Row) -> Result<SyncLog> {
    let device_id: String = row.get(1)?;
    let action: String = row.get(2)?;
    let status: String = row.get(5)?;
    let save_id: Option<String> = row.get(7)?;
    let version_id: Option<String> = row.get(8)?;
    Ok(SyncLog {
        id: row.get(0)?,
        device_id: device_id
            .parse()
            .map_err(|_| Error::Database("Invalid device ID".into()))?,
        action: action.parse().map_err(Error::Database)?,
        file_path: row.get(3)?,
        file_size: row
            .get::<Option<i64>>(4)?
            .map(|size| u64::try_from(size).unwrap_or(0)),
        status: status.parse().map_err(Error::Database)?,
        error_msg: row.get(6)?,
        save_id: save_id
            .map(|id| {
                id.parse()
                    .map_err(|_| Error::Database("Invalid save ID".into()))
            })
            .transpose()?,
        save_version_id: version_id
            .map(|id| {
                id.parse()
                    .map_err(|_| Error::Database("Invalid version ID".into()))
            })
            .transpose()?,
        created_at: row.get(9)?,
    })
}
