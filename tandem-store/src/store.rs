//! Record tables on one endpoint.
//!
//! Each registered record type gets its own table. The lifecycle columns are
//! extracted from the record so they can be filtered in SQL, and the full
//! record is kept as canonical JSON in `data`.

use crate::error::{StoreError, StoreResult};
use crate::open_connection;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tandem_types::timestamp::to_db_string;
use tandem_types::{KeyStrategy, RecordId, SyncRecord};
use tracing::debug;

/// Which soft-deleted rows a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletedFilter {
    /// Hide soft-deleted rows (the default filter).
    #[default]
    Exclude,
    /// Only soft-deleted rows, bypassing the default filter.
    Only,
    /// Everything.
    Include,
}

/// Row selection for [`RecordStore::query`].
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    pub deleted: DeletedFilter,
    /// Only rows changed strictly after this instant.
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl RowFilter {
    /// Live rows changed after `since` (all live rows when `None`).
    #[must_use]
    pub fn changed_since(since: Option<DateTime<Utc>>) -> Self {
        Self {
            deleted: DeletedFilter::Exclude,
            since,
            ..Default::default()
        }
    }

    /// Soft-deleted rows deleted after `since` (all tombstones when `None`).
    #[must_use]
    pub fn deleted_since(since: Option<DateTime<Utc>>) -> Self {
        Self {
            deleted: DeletedFilter::Only,
            since,
            ..Default::default()
        }
    }

    /// Every row regardless of delete state.
    #[must_use]
    pub fn all() -> Self {
        Self {
            deleted: DeletedFilter::Include,
            ..Default::default()
        }
    }

    /// Restricts the filter to one page, ordered by key.
    #[must_use]
    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }
}

/// One database endpoint (the local store or the cloud store).
///
/// No connection is held between operations: each call opens a connection,
/// does its work and drops it.
#[derive(Debug, Clone)]
pub struct RecordStore {
    name: String,
    path: PathBuf,
    /// Whether connecting may create a missing database file.
    create: bool,
}

impl RecordStore {
    /// Describes a remote endpoint without touching it. Reachability is
    /// checked later with [`ping`](Self::ping); a missing database file
    /// counts as unreachable and is never created.
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
            create: false,
        }
    }

    /// Opens an endpoint owned by this node, creating its database file if
    /// needed.
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>) -> StoreResult<Self> {
        let store = Self {
            create: true,
            ..Self::new(name, path)
        };
        store.ping()?;
        Ok(store)
    }

    /// Returns the endpoint's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the endpoint's database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> StoreResult<Connection> {
        open_connection(&self.path, self.create).map_err(|e| match e {
            StoreError::Database(err) => StoreError::Unavailable {
                name: self.name.clone(),
                reason: err.to_string(),
            },
            other => other,
        })
    }

    /// Opens a connection and runs a trivial query.
    pub fn ping(&self) -> StoreResult<()> {
        let conn = self.connect()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    /// Runs administrative SQL (indexes, triggers) against the endpoint.
    pub fn execute_batch(&self, sql: &str) -> StoreResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Creates the table for a record type if it does not exist yet.
    pub fn ensure_table<T: SyncRecord>(&self) -> StoreResult<()> {
        let table = table_name::<T>()?;
        let key_column = match T::KEY {
            KeyStrategy::Natural => "id TEXT PRIMARY KEY NOT NULL",
            KeyStrategy::Identity => "id INTEGER PRIMARY KEY AUTOINCREMENT",
        };
        let conn = self.connect()?;
        conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS \"{table}\" (
                {key_column},
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT,
                updated_at TEXT,
                deleted_at TEXT,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS \"{table}_changed\"
                ON \"{table}\" (is_deleted, updated_at, created_at);
            "
        ))?;
        debug!("Ensured table {} on {}", table, self.name);
        Ok(())
    }

    /// Loads one record by key, including soft-deleted rows.
    pub fn get<T: SyncRecord>(&self, id: &RecordId) -> StoreResult<Option<T>> {
        let table = table_name::<T>()?;
        let key = key_value::<T>(id)?;
        let conn = self.connect()?;
        let data: Option<String> = conn
            .query_row(
                &format!("SELECT data FROM \"{table}\" WHERE id = ?1"),
                [key],
                |row| row.get(0),
            )
            .optional()?;
        data.map(|d| serde_json::from_str(&d).map_err(StoreError::from))
            .transpose()
    }

    /// Loads the records selected by `filter`, ordered by key.
    pub fn query<T: SyncRecord>(&self, filter: &RowFilter) -> StoreResult<Vec<T>> {
        let table = table_name::<T>()?;
        let (where_sql, mut args) = where_clause(filter);
        let mut sql = format!("SELECT data FROM \"{table}\"{where_sql} ORDER BY id");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT ?{} OFFSET ?{}", args.len() + 1, args.len() + 2));
            args.push(Value::Integer(limit as i64));
            args.push(Value::Integer(filter.offset as i64));
        }

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), |row| row.get::<_, String>(0))?;

        let mut result = Vec::new();
        for row in rows {
            let data = row?;
            result.push(serde_json::from_str(&data)?);
        }
        Ok(result)
    }

    /// Counts the records selected by `filter` (paging is ignored).
    pub fn count<T: SyncRecord>(&self, filter: &RowFilter) -> StoreResult<usize> {
        let table = table_name::<T>()?;
        let (where_sql, args) = where_clause(filter);
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{table}\"{where_sql}"),
            params_from_iter(args),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Inserts a record under its own key, inside one transaction.
    ///
    /// Identity keys are written verbatim instead of being generated; the
    /// table's AUTOINCREMENT sequence then moves past the preserved key, so
    /// later generated keys cannot collide with it. The insert is refused
    /// when the key is taken, and any failure rolls the transaction back.
    pub fn insert<T: SyncRecord>(&self, record: &T) -> StoreResult<()> {
        let table = table_name::<T>()?;
        let id = record.record_id();
        let key = key_value::<T>(&id)?;
        let row = RowColumns::of(record)?;

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let taken: bool = tx.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM \"{table}\" WHERE id = ?1)"),
            [&key],
            |r| r.get(0),
        )?;
        if taken {
            return Err(StoreError::DuplicateKey(format!("{table}/{id}")));
        }
        tx.execute(
            &format!(
                "INSERT INTO \"{table}\" (id, is_deleted, created_at, updated_at, deleted_at, data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ),
            params![key, row.is_deleted, row.created_at, row.updated_at, row.deleted_at, row.data],
        )?;
        tx.commit()?;
        debug!("Inserted {}/{} on {}", table, id, self.name);
        Ok(())
    }

    /// Inserts a new identity-keyed record whose key the store generates.
    ///
    /// `build` receives the generated key and returns the record to store
    /// under it.
    pub fn insert_generated<T, F>(&self, build: F) -> StoreResult<T>
    where
        T: SyncRecord,
        F: FnOnce(RecordId) -> T,
    {
        if T::KEY != KeyStrategy::Identity {
            return Err(StoreError::InvalidData(format!(
                "{} does not use generated keys",
                T::TYPE_NAME
            )));
        }
        let table = table_name::<T>()?;

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(&format!("INSERT INTO \"{table}\" (data) VALUES ('{{}}')"), [])?;
        let id = RecordId::from(tx.last_insert_rowid());
        let record = build(id.clone());
        if record.record_id() != id {
            return Err(StoreError::InvalidData(format!(
                "record built for key {id} reports key {}",
                record.record_id()
            )));
        }
        let row = RowColumns::of(&record)?;
        tx.execute(
            &format!(
                "UPDATE \"{table}\" SET is_deleted = ?1, created_at = ?2, updated_at = ?3,
                 deleted_at = ?4, data = ?5 WHERE id = ?6"
            ),
            params![
                row.is_deleted,
                row.created_at,
                row.updated_at,
                row.deleted_at,
                row.data,
                key_value::<T>(&id)?
            ],
        )?;
        tx.commit()?;
        Ok(record)
    }

    /// Overwrites an existing record. Returns false if no row has its key.
    pub fn update<T: SyncRecord>(&self, record: &T) -> StoreResult<bool> {
        let table = table_name::<T>()?;
        let key = key_value::<T>(&record.record_id())?;
        let row = RowColumns::of(record)?;
        let conn = self.connect()?;
        let changed = conn.execute(
            &format!(
                "UPDATE \"{table}\" SET is_deleted = ?1, created_at = ?2, updated_at = ?3,
                 deleted_at = ?4, data = ?5 WHERE id = ?6"
            ),
            params![row.is_deleted, row.created_at, row.updated_at, row.deleted_at, row.data, key],
        )?;
        Ok(changed > 0)
    }

    /// Removes a row. Returns false if it did not exist.
    pub fn delete<T: SyncRecord>(&self, id: &RecordId) -> StoreResult<bool> {
        let table = table_name::<T>()?;
        let key = key_value::<T>(id)?;
        let conn = self.connect()?;
        let changed = conn.execute(&format!("DELETE FROM \"{table}\" WHERE id = ?1"), [key])?;
        Ok(changed > 0)
    }
}

/// Lifecycle columns extracted from a record.
struct RowColumns {
    is_deleted: bool,
    created_at: Option<String>,
    updated_at: Option<String>,
    deleted_at: Option<String>,
    data: String,
}

impl RowColumns {
    fn of<T: SyncRecord>(record: &T) -> StoreResult<Self> {
        Ok(Self {
            is_deleted: record.is_deleted(),
            created_at: record.created_at().as_ref().map(to_db_string),
            updated_at: record.updated_at().as_ref().map(to_db_string),
            deleted_at: record.deleted_at().as_ref().map(to_db_string),
            data: serde_json::to_string(&serde_json::to_value(record)?)?,
        })
    }
}

fn where_clause(filter: &RowFilter) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut args = Vec::new();

    match filter.deleted {
        DeletedFilter::Exclude => clauses.push("is_deleted = 0".into()),
        DeletedFilter::Only => clauses.push("is_deleted = 1".into()),
        DeletedFilter::Include => {}
    }

    if let Some(since) = filter.since {
        let changed = match filter.deleted {
            DeletedFilter::Only => "COALESCE(deleted_at, updated_at, created_at)",
            _ => "COALESCE(updated_at, created_at)",
        };
        args.push(Value::Text(to_db_string(&since)));
        clauses.push(format!("{changed} > ?{}", args.len()));
    }

    if clauses.is_empty() {
        (String::new(), args)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), args)
    }
}

/// Validates a record type's table name.
fn table_name<T: SyncRecord>() -> StoreResult<&'static str> {
    let name = T::TYPE_NAME;
    let valid = !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    let lowered = name.to_ascii_lowercase();
    if !valid || lowered.starts_with("sqlite_") || lowered.starts_with("sync_") {
        return Err(StoreError::InvalidData(format!("invalid record type name: {name:?}")));
    }
    Ok(name)
}

/// Binds a key with the column's storage class.
fn key_value<T: SyncRecord>(id: &RecordId) -> StoreResult<Value> {
    match T::KEY {
        KeyStrategy::Natural => Ok(Value::Text(id.as_str().to_string())),
        KeyStrategy::Identity => id.as_i64().map(Value::Integer).ok_or_else(|| {
            StoreError::InvalidData(format!("{} key {id} is not an integer", T::TYPE_NAME))
        }),
    }
}
