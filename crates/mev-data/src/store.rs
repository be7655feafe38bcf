//! SQLite document store for observed events.
//!
//! Each document is an opaque JSON body filed under a collection name. Uses
//! WAL mode for concurrent read performance and prepared statements for
//! batch insert throughput.

use eyre::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::cell::RefCell;

/// Collection of watched pending transactions.
pub const TRANSACTIONS: &str = "transactions";

/// Collection of decoded pool swaps with their gas cost.
pub const SWAP_EVENTS: &str = "swap_events";

/// Persistence contract for telemetry documents.
///
/// The engine only needs "accepts an opaque document"; no schema is negotiated.
pub trait DocumentStore {
    /// Stores one document and returns its identifier.
    fn put<T: Serialize>(&self, document: &T, collection: &str) -> Result<String>;

    /// Stores all documents in one batch. Either every document is stored or none is.
    fn bulk_put<T: Serialize>(&self, documents: &[T], collection: &str) -> Result<()>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for &S {
    fn put<T: Serialize>(&self, document: &T, collection: &str) -> Result<String> {
        (**self).put(document, collection)
    }

    fn bulk_put<T: Serialize>(&self, documents: &[T], collection: &str) -> Result<()> {
        (**self).bulk_put(documents, collection)
    }
}

pub struct Store {
    conn: RefCell<Connection>,
}

impl Store {
    /// Creates or opens a SQLite database with WAL mode enabled.
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or migrations fail.
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .wrap_err_with(|| format!("failed to open document store at {path}"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self {
            conn: RefCell::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn.borrow_mut().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                stored_at TEXT NOT NULL,
                body TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS documents_collection_idx
                ON documents (collection);
            ",
        )?;
        Ok(())
    }

    /// Number of documents in a collection.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn count(&self, collection: &str) -> Result<u64> {
        let conn = self.conn.borrow();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?",
            rusqlite::params![collection],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// All documents of a collection in insertion order.
    ///
    /// # Errors
    /// Returns error if the query fails or a stored body is not valid JSON.
    pub fn documents(&self, collection: &str) -> Result<Vec<serde_json::Value>> {
        let conn = self.conn.borrow();
        let mut stmt =
            conn.prepare("SELECT body FROM documents WHERE collection = ? ORDER BY id")?;
        let bodies = stmt
            .query_map(rusqlite::params![collection], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).wrap_err("stored document is not valid JSON"))
            .collect()
    }
}

impl DocumentStore for Store {
    fn put<T: Serialize>(&self, document: &T, collection: &str) -> Result<String> {
        let body = serde_json::to_string(document).wrap_err("failed to serialize document")?;
        let conn = self.conn.borrow_mut();
        conn.execute(
            "INSERT INTO documents (collection, stored_at, body) VALUES (?, ?, ?)",
            rusqlite::params![collection, chrono::Utc::now().to_rfc3339(), body],
        )?;
        Ok(conn.last_insert_rowid().to_string())
    }

    fn bulk_put<T: Serialize>(&self, documents: &[T], collection: &str) -> Result<()> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO documents (collection, stored_at, body) VALUES (?, ?, ?)")?;
            let stored_at = chrono::Utc::now().to_rfc3339();

            for doc in documents {
                let body = serde_json::to_string(doc).wrap_err("failed to serialize document")?;
                stmt.execute(rusqlite::params![collection, stored_at, body])?;
            }
        }
        tx.commit()?;

        tracing::debug!(collection, count = documents.len(), "bulk stored documents");
        Ok(())
    }
}
