//! Durable sync bookkeeping: per-record metadata and per-run logs.
//!
//! The journal lives in the local endpoint's database file, next to the
//! record tables, so it is available while the cloud is unreachable.

use crate::error::{StoreError, StoreResult};
use crate::open_connection;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tandem_types::timestamp::{from_db_string, to_db_string};
use tandem_types::{
    MetadataStatus, RecordId, SyncDirection, SyncLog, SyncMetadata, TypeSummary,
};
use uuid::Uuid;

const METADATA_COLUMNS: &str =
    "id, entity_type, entity_id, last_synced_at, content_hash, direction, status, message";

const LOG_COLUMNS: &str = "id, session_id, started_at, completed_at, sync_type, status, \
     entities_synced, entities_failed, conflicts_detected, conflicts_resolved, error_message, details";

/// Extra per-run detail kept as JSON next to the aggregate counts.
#[derive(Serialize, Deserialize, Default)]
struct LogDetails {
    per_type: Vec<TypeSummary>,
    errors: Vec<String>,
}

/// Persistent store for sync metadata and sync logs backed by SQLite.
#[derive(Debug, Clone)]
pub struct SyncJournal {
    path: PathBuf,
}

impl SyncJournal {
    /// Opens (or creates) the journal tables in the given database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let journal = Self {
            path: path.as_ref().to_path_buf(),
        };
        journal.init_schema()?;
        Ok(journal)
    }

    fn connect(&self) -> StoreResult<Connection> {
        open_connection(&self.path, true)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sync_metadata (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                last_synced_at TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                direction TEXT NOT NULL,
                status TEXT NOT NULL,
                message TEXT,
                UNIQUE(entity_type, entity_id)
            );

            CREATE TABLE IF NOT EXISTS sync_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL UNIQUE,
                started_at TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                sync_type TEXT NOT NULL,
                status TEXT NOT NULL,
                entities_synced INTEGER NOT NULL,
                entities_failed INTEGER NOT NULL,
                conflicts_detected INTEGER NOT NULL,
                conflicts_resolved INTEGER NOT NULL,
                error_message TEXT,
                details TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| StoreError::InvalidData(format!("failed to init journal schema: {e}")))?;
        Ok(())
    }

    // ── Sync metadata ────────────────────────────────────────────

    /// Loads the metadata entry for a record, if any.
    pub fn get_metadata(
        &self,
        entity_type: &str,
        entity_id: &RecordId,
    ) -> StoreResult<Option<SyncMetadata>> {
        let conn = self.connect()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {METADATA_COLUMNS} FROM sync_metadata
                     WHERE entity_type = ?1 AND entity_id = ?2"
                ),
                params![entity_type, entity_id.as_str()],
                RawMetadata::from_row,
            )
            .optional()?;
        raw.map(RawMetadata::parse).transpose()
    }

    /// Loads a metadata entry by its row identifier.
    pub fn get_metadata_by_id(&self, id: i64) -> StoreResult<Option<SyncMetadata>> {
        let conn = self.connect()?;
        let raw = conn
            .query_row(
                &format!("SELECT {METADATA_COLUMNS} FROM sync_metadata WHERE id = ?1"),
                params![id],
                RawMetadata::from_row,
            )
            .optional()?;
        raw.map(RawMetadata::parse).transpose()
    }

    /// Inserts or replaces the metadata entry for a record. Returns the row id.
    pub fn upsert_metadata(&self, meta: &SyncMetadata) -> StoreResult<i64> {
        let conn = self.connect()?;
        let id: i64 = conn.query_row(
            "INSERT INTO sync_metadata
                (entity_type, entity_id, last_synced_at, content_hash, direction, status, message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(entity_type, entity_id) DO UPDATE SET
                last_synced_at = excluded.last_synced_at,
                content_hash = excluded.content_hash,
                direction = excluded.direction,
                status = excluded.status,
                message = excluded.message
             RETURNING id",
            params![
                meta.entity_type,
                meta.entity_id.as_str(),
                to_db_string(&meta.last_synced_at),
                meta.content_hash,
                meta.direction.to_string(),
                meta.status.to_string(),
                meta.message,
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Records an unresolved conflict for an operator to settle later.
    pub fn record_conflict(
        &self,
        entity_type: &str,
        entity_id: &RecordId,
        content_hash: &str,
        direction: SyncDirection,
        message: &str,
    ) -> StoreResult<i64> {
        let mut meta = SyncMetadata::synced(entity_type, entity_id.clone(), content_hash, direction);
        meta.status = MetadataStatus::Conflict;
        meta.message = Some(message.to_string());
        self.upsert_metadata(&meta)
    }

    /// Lists metadata entries awaiting manual conflict resolution.
    pub fn pending_conflicts(&self) -> StoreResult<Vec<SyncMetadata>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {METADATA_COLUMNS} FROM sync_metadata WHERE status = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(
            params![MetadataStatus::Conflict.to_string()],
            RawMetadata::from_row,
        )?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?.parse()?);
        }
        Ok(result)
    }

    /// Returns the number of metadata entries.
    pub fn metadata_count(&self) -> StoreResult<usize> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sync_metadata", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ── Sync log ─────────────────────────────────────────────────

    /// Appends a run to the log. Returns the row id.
    pub fn save_log(&self, log: &SyncLog) -> StoreResult<i64> {
        let details = serde_json::to_string(&LogDetails {
            per_type: log.per_type.clone(),
            errors: log.errors.clone(),
        })?;
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO sync_log (session_id, started_at, completed_at, sync_type, status,
                entities_synced, entities_failed, conflicts_detected, conflicts_resolved,
                error_message, details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                log.session_id.to_string(),
                to_db_string(&log.started_at),
                to_db_string(&log.completed_at),
                log.sync_type.to_string(),
                log.status.to_string(),
                log.entities_synced as i64,
                log.entities_failed as i64,
                log.conflicts_detected as i64,
                log.conflicts_resolved as i64,
                log.error_message,
                details,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Returns the most recent successful run that reconciled every type in
    /// both directions (a full or incremental run).
    pub fn last_successful_sync(&self) -> StoreResult<Option<SyncLog>> {
        let conn = self.connect()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {LOG_COLUMNS} FROM sync_log
                     WHERE status = 'Completed' AND sync_type IN ('Full', 'Incremental')
                     ORDER BY id DESC LIMIT 1"
                ),
                [],
                RawLog::from_row,
            )
            .optional()?;
        raw.map(RawLog::parse).transpose()
    }

    /// Loads the most recent runs, newest first.
    pub fn recent_logs(&self, limit: usize) -> StoreResult<Vec<SyncLog>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM sync_log ORDER BY id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], RawLog::from_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?.parse()?);
        }
        Ok(result)
    }

    /// Returns the total number of logged runs.
    pub fn log_count(&self) -> StoreResult<usize> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sync_log", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

struct RawMetadata {
    id: i64,
    entity_type: String,
    entity_id: String,
    last_synced_at: String,
    content_hash: String,
    direction: String,
    status: String,
    message: Option<String>,
}

impl RawMetadata {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            last_synced_at: row.get(3)?,
            content_hash: row.get(4)?,
            direction: row.get(5)?,
            status: row.get(6)?,
            message: row.get(7)?,
        })
    }

    fn parse(self) -> StoreResult<SyncMetadata> {
        Ok(SyncMetadata {
            id: Some(self.id),
            entity_type: self.entity_type,
            entity_id: RecordId::new(self.entity_id),
            last_synced_at: from_db_string(&self.last_synced_at)?,
            content_hash: self.content_hash,
            direction: self.direction.parse()?,
            status: self.status.parse()?,
            message: self.message,
        })
    }
}

struct RawLog {
    id: i64,
    session_id: String,
    started_at: String,
    completed_at: String,
    sync_type: String,
    status: String,
    entities_synced: i64,
    entities_failed: i64,
    conflicts_detected: i64,
    conflicts_resolved: i64,
    error_message: Option<String>,
    details: String,
}

impl RawLog {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            started_at: row.get(2)?,
            completed_at: row.get(3)?,
            sync_type: row.get(4)?,
            status: row.get(5)?,
            entities_synced: row.get(6)?,
            entities_failed: row.get(7)?,
            conflicts_detected: row.get(8)?,
            conflicts_resolved: row.get(9)?,
            error_message: row.get(10)?,
            details: row.get(11)?,
        })
    }

    fn parse(self) -> StoreResult<SyncLog> {
        let session_id = Uuid::parse_str(&self.session_id)
            .map_err(|e| StoreError::InvalidData(format!("invalid session_id in log: {e}")))?;
        let details: LogDetails = serde_json::from_str(&self.details)?;
        Ok(SyncLog {
            id: Some(self.id),
            session_id,
            started_at: from_db_string(&self.started_at)?,
            completed_at: from_db_string(&self.completed_at)?,
            sync_type: self.sync_type.parse()?,
            status: self.status.parse()?,
            entities_synced: self.entities_synced as u64,
            entities_failed: self.entities_failed as u64,
            conflicts_detected: self.conflicts_detected as u64,
            conflicts_resolved: self.conflicts_resolved as u64,
            error_message: self.error_message,
            per_type: details.per_type,
            errors: details.errors,
        })
    }
}
