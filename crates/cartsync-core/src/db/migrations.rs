//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Migration to version 1: Initial schema
async fn migrate_v1(conn: &Connection) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    // inside a transaction for atomicity

    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Users
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            subscription_tier TEXT NOT NULL DEFAULT 'free',
            created_at INTEGER NOT NULL
        )",
        // Devices
        "CREATE TABLE IF NOT EXISTS devices (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            device_type TEXT NOT NULL,
            api_key TEXT NOT NULL UNIQUE,
            last_sync_at INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_devices_user ON devices(user_id)",
        // Logical saves, unique per (user, normalized save key)
        "CREATE TABLE IF NOT EXISTS saves (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            save_key TEXT NOT NULL,
            display_name TEXT NOT NULL,
            sync_strategy TEXT NOT NULL DEFAULT 'per_device',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(user_id, save_key)
        )",
        "CREATE INDEX IF NOT EXISTS idx_saves_user ON saves(user_id)",
        // Device+path bindings; local_path is write-once per triple
        "CREATE TABLE IF NOT EXISTS save_locations (
            id TEXT PRIMARY KEY,
            save_id TEXT NOT NULL REFERENCES saves(id) ON DELETE CASCADE,
            device_id TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
            device_type TEXT NOT NULL,
            local_path TEXT NOT NULL,
            sync_mode TEXT NOT NULL DEFAULT 'sync',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(save_id, device_id, local_path)
        )",
        "CREATE INDEX IF NOT EXISTS idx_save_locations_device ON save_locations(device_id)",
        // Immutable version history
        "CREATE TABLE IF NOT EXISTS save_versions (
            id TEXT PRIMARY KEY,
            save_id TEXT NOT NULL REFERENCES saves(id) ON DELETE CASCADE,
            device_id TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
            content_hash TEXT NOT NULL,
            byte_size INTEGER NOT NULL,
            local_modified_at INTEGER NOT NULL,
            uploaded_at INTEGER NOT NULL,
            storage_key TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_save_versions_hash ON save_versions(save_id, content_hash)",
        "CREATE INDEX IF NOT EXISTS idx_save_versions_device
             ON save_versions(save_id, device_id, local_modified_at DESC)",
        // Sync event log
        "CREATE TABLE IF NOT EXISTS sync_logs (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
            action TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_size INTEGER,
            status TEXT NOT NULL,
            error_msg TEXT,
            save_id TEXT,
            save_version_id TEXT,
            created_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_sync_logs_device ON sync_logs(device_id, created_at DESC)",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    for statement in statements {
        if let Err(error) = conn.execute(statement, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(error.into());
        }
    }

    conn.execute("COMMIT", ()).await?;
    Ok(())
}
