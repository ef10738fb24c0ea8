//! SQLite-backed log of received messages.
//!
//! The store is the single durable artifact of the service: one table of
//! received messages with uniqueness constraints that make ingestion
//! idempotent. Deduplication lives in the storage layer (`INSERT OR
//! IGNORE` against the unique indexes) rather than in application logic,
//! so concurrent or retried deliveries of the same event race safely
//! without a read-modify-write step.
//!
//! # Uniqueness
//!
//! - `event_id` is globally unique: a redelivered event is a silent no-op.
//! - (`phone_number`, `message`, `received_at`) is unique: identical
//!   content at the identical claimed time is treated as the same event
//!   even when the sender omits or reuses the event id.
//!
//! # Concurrency
//!
//! The connection is opened with WAL journaling and a 5 s busy timeout
//! and guarded by a mutex; handlers share the store through `AppState`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

pub mod message;
pub mod timestamp;

pub use message::{ListFilter, NewMessage, ReceivedMessage, Stats};

use crate::types::EventId;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS received_messages (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id     TEXT UNIQUE NOT NULL,
    message_id   TEXT NOT NULL,
    device_id    TEXT NOT NULL DEFAULT '',
    phone_number TEXT NOT NULL,
    message      TEXT NOT NULL,
    sim_number   INTEGER NOT NULL DEFAULT 1,
    received_at  DATETIME NOT NULL,
    created_at   DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    processed    BOOLEAN NOT NULL DEFAULT 0
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_dedup
    ON received_messages(phone_number, message, received_at);
CREATE INDEX IF NOT EXISTS idx_received_phone ON received_messages(phone_number);
CREATE INDEX IF NOT EXISTS idx_received_at ON received_messages(received_at);
CREATE INDEX IF NOT EXISTS idx_processed ON received_messages(processed);
";

const SELECT_COLUMNS: &str = "SELECT id, event_id, message_id, device_id, phone_number, \
     message, sim_number, received_at, created_at, processed FROM received_messages";

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row with the given id. Distinct from engine faults so callers
    /// can report 404 instead of 500.
    #[error("message {0} not found")]
    NotFound(i64),

    /// Engine-level failure (I/O, constraint other than the expected
    /// duplicate case, corruption).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to create the database's parent directory.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Handle to the received-message database.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (or creates) the database at `path`, creating parent
    /// directories as needed, and applies the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// Opens an in-memory database. Test-oriented, but also usable for
    /// ephemeral runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    /// A poisoned lock only means another thread panicked mid-call; the
    /// connection itself is still transactionally consistent.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a received message.
    ///
    /// Duplicates (by `event_id` or by the content triple) are silently
    /// ignored: the call succeeds without writing.
    pub fn save(&self, msg: &NewMessage) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO received_messages
                 (event_id, message_id, device_id, phone_number, message, sim_number, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                msg.event_id.as_str(),
                msg.message_id,
                msg.device_id,
                msg.phone_number,
                msg.message,
                msg.sim_number,
                timestamp::format_stored(&msg.received_at),
            ],
        )?;
        Ok(())
    }

    /// Fetches a single message by its row id.
    pub fn get(&self, id: i64) -> Result<Option<ReceivedMessage>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let conn = self.conn();
        conn.query_row(&sql, params![id], row_to_message)
            .optional()
            .map_err(Into::into)
    }

    /// Lists messages matching `filter`, most recent `received_at` first.
    ///
    /// The descending order and the default limit of 100 are the only
    /// ordering guarantees consumers can rely on for "most recent N".
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<ReceivedMessage>> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE 1=1");
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(phone) = &filter.phone {
            sql.push_str(" AND phone_number = ?");
            args.push(Box::new(phone.clone()));
        }
        if let Some(since) = &filter.since {
            sql.push_str(" AND received_at >= ?");
            args.push(Box::new(timestamp::format_stored(since)));
        }
        if let Some(before) = &filter.before {
            sql.push_str(" AND received_at < ?");
            args.push(Box::new(timestamp::format_stored(before)));
        }
        if let Some(processed) = filter.processed {
            sql.push_str(" AND processed = ?");
            args.push(Box::new(processed));
        }

        sql.push_str(" ORDER BY received_at DESC LIMIT ? OFFSET ?");
        args.push(Box::new(filter.effective_limit()));
        args.push(Box::new(filter.effective_offset()));

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let rows = stmt.query_map(refs.as_slice(), row_to_message)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Sets the processed flag. Fails with [`StoreError::NotFound`] when
    /// no row matches.
    pub fn mark_processed(&self, id: i64) -> Result<()> {
        self.set_processed(id, true)
    }

    /// Clears the processed flag. Fails with [`StoreError::NotFound`]
    /// when no row matches.
    pub fn mark_unprocessed(&self, id: i64) -> Result<()> {
        self.set_processed(id, false)
    }

    fn set_processed(&self, id: i64, processed: bool) -> Result<()> {
        let n = self.conn().execute(
            "UPDATE received_messages SET processed = ?1 WHERE id = ?2",
            params![processed, id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Marks every unprocessed message processed, returning how many
    /// rows were flipped.
    pub fn mark_all_processed(&self) -> Result<usize> {
        let n = self.conn().execute(
            "UPDATE received_messages SET processed = 1 WHERE processed = 0",
            [],
        )?;
        Ok(n)
    }

    /// Summary counts, computed fresh on each call.
    pub fn stats(&self) -> Result<Stats> {
        let conn = self.conn();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM received_messages", [], |r| r.get(0))?;
        let unprocessed: i64 = conn.query_row(
            "SELECT COUNT(*) FROM received_messages WHERE processed = 0",
            [],
            |r| r.get(0),
        )?;
        Ok(Stats {
            total,
            unprocessed,
            processed: total - unprocessed,
        })
    }
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<ReceivedMessage> {
    let received_at: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    Ok(ReceivedMessage {
        id: row.get(0)?,
        event_id: EventId::new(row.get::<_, String>(1)?),
        message_id: row.get(2)?,
        device_id: row.get(3)?,
        phone_number: row.get(4)?,
        message: row.get(5)?,
        sim_number: row.get(6)?,
        received_at: timestamp::parse_stored(&received_at),
        created_at: timestamp::parse_stored(&created_at),
        processed: row.get(9)?,
    })
}
