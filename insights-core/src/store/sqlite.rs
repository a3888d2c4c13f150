//! SQLite-backed event queue
//!
//! All indices share one database file; each [`SqliteEventStore`] is a view
//! scoped to a single `index_name`.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rusqlite::{params, Connection};

use super::{EventStore, Seq, Snapshot};
use crate::error::Result;
use crate::event::{codec, EventInternal};

/// Database handle (single connection behind a mutex)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL keeps readers off the writer's back; NORMAL sync still survives
        // process crashes once a statement has committed.
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.connection();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a half-applied statement
        // behind, so the connection is still usable.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ============================================
    // Queue operations
    // ============================================

    /// Append a serialized record to an index queue
    pub fn append_event(&self, index: &str, payload: &str) -> Result<Seq> {
        let conn = self.connection();
        conn.execute(
            "INSERT INTO pending_events (index_name, payload, enqueued_at) VALUES (?1, ?2, ?3)",
            params![index, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Raw rows of an index queue, in append order
    pub fn pending_rows(&self, index: &str) -> Result<Vec<(Seq, String)>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT seq, payload FROM pending_events WHERE index_name = ? ORDER BY seq ASC",
        )?;

        let rows = stmt
            .query_map([index], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Delete the given rows of an index queue in one transaction
    pub fn delete_events(&self, index: &str, seqs: impl IntoIterator<Item = Seq>) -> Result<usize> {
        let mut conn = self.connection();
        let tx = conn.transaction()?;
        let mut removed = 0;

        {
            let mut stmt =
                tx.prepare("DELETE FROM pending_events WHERE index_name = ?1 AND seq = ?2")?;
            for seq in seqs {
                removed += stmt.execute(params![index, seq])?;
            }
        }

        tx.commit()?;
        Ok(removed)
    }

    /// Number of rows queued for an index, undecodable ones included
    pub fn count_pending(&self, index: &str) -> Result<usize> {
        let conn = self.connection();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pending_events WHERE index_name = ?",
            [index],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Indices that currently have queued rows, with their counts
    pub fn pending_counts(&self) -> Result<Vec<(String, usize)>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT index_name, COUNT(*) FROM pending_events GROUP BY index_name ORDER BY index_name",
        )?;

        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(counts)
    }

    /// Indices that currently have queued rows
    pub fn indices(&self) -> Result<Vec<String>> {
        Ok(self
            .pending_counts()?
            .into_iter()
            .map(|(index, _)| index)
            .collect())
    }
}

/// Event queue for one index, stored in a shared [`Database`]
pub struct SqliteEventStore {
    db: Arc<Database>,
    index: String,
}

impl SqliteEventStore {
    pub fn new(db: Arc<Database>, index: impl Into<String>) -> Self {
        Self {
            db,
            index: index.into(),
        }
    }
}

impl EventStore for SqliteEventStore {
    fn index(&self) -> &str {
        &self.index
    }

    fn append(&self, event: &EventInternal) -> Result<()> {
        let seq = self
            .db
            .append_event(&self.index, &codec::to_json_string(event))?;
        tracing::trace!(index = %self.index, seq, "Event queued");
        Ok(())
    }

    fn read(&self) -> Result<Snapshot> {
        let rows = self.db.pending_rows(&self.index)?;
        let mut entries = Vec::with_capacity(rows.len());
        let mut poisoned = Vec::new();

        for (seq, payload) in rows {
            match codec::from_json_str(&payload) {
                Ok(event) => entries.push((seq, event)),
                Err(e) => {
                    tracing::warn!(
                        index = %self.index,
                        seq,
                        error = %e,
                        "Skipping undecodable queued event"
                    );
                    poisoned.push(seq);
                }
            }
        }

        Ok(Snapshot::new(entries, poisoned))
    }

    fn clear(&self, snapshot: &Snapshot) -> Result<usize> {
        self.db.delete_events(&self.index, snapshot.sequence_numbers())
    }

    fn count(&self) -> Result<usize> {
        self.db.count_pending(&self.index)
    }
}
