//! SQLite storage layer for tandem.
//!
//! Provides the two kinds of persistence the sync engine works against:
//!
//! - [`RecordStore`]: one endpoint's record tables (the local store or the
//!   cloud store), one table per registered record type
//! - [`SyncJournal`]: the durable bookkeeping kept next to the local store
//!   (per-record sync metadata and the append-only sync log)
//!
//! Connections are short-lived: every operation opens its own connection
//! and drops it when done, so a store handle is cheap to clone and share
//! across tasks.

mod error;
mod journal;
mod store;

pub use error::{StoreError, StoreResult};
pub use journal::SyncJournal;
pub use store::{DeletedFilter, RecordStore, RowFilter};

use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;

/// How long a connection waits on a locked database before giving up.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a SQLite connection configured for concurrent short-lived use.
///
/// With `create` unset a missing database file is an error instead of a
/// fresh empty database. The parent directory must exist either way. WAL
/// journaling lets readers proceed while another connection writes; the
/// busy timeout covers the remaining writer/writer contention.
pub(crate) fn open_connection(path: &Path, create: bool) -> StoreResult<Connection> {
    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    if create {
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }
    let conn = Connection::open_with_flags(path, flags)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    Ok(conn)
}
