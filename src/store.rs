//! Persistent store trait and SQLite implementation.
//!
//! The store is byte-agnostic about what it holds: values are JSON documents
//! keyed by a `(kind, key)` composite. This crate only ever writes under
//! `DbKind::SigHints`, keyed by the owning identity.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{HintError, Result};
use crate::hint::UserId;

/// Namespace of a stored object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DbKind {
  SigHints,
}

impl DbKind {
  fn code(self) -> i64 {
    match self {
      DbKind::SigHints => 1,
    }
  }
}

/// Composite key of a stored object.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DbKey {
  pub kind: DbKind,
  pub key: String,
}

impl DbKey {
  /// Key of the hint cache document for one identity.
  pub fn sig_hints(uid: &UserId) -> Self {
    Self {
      kind: DbKind::SigHints,
      key: uid.as_str().to_string(),
    }
  }
}

/// Trait for persistent store backends.
pub trait HintStore: Send + Sync {
  /// Read the document at `key`. `Ok(None)` is the not-found signal.
  fn get(&self, key: &DbKey) -> Result<Option<Value>>;

  /// Write `value` under `key`, replacing any prior value in a single put.
  /// `index_keys` are secondary lookup keys maintained alongside the object.
  fn put(&self, key: &DbKey, index_keys: &[DbKey], value: &Value) -> Result<()>;
}

/// SQLite-based store implementation.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| HintError::Store(format!("failed to create store directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      HintError::Store(format!("failed to open store at {}: {}", path.display(), e))
    })?;

    Self::with_connection(conn)
  }

  /// In-memory store, used by tests.
  pub fn open_in_memory() -> Result<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| HintError::Store("could not determine data directory".into()))?;

    Ok(data_dir.join("sighints").join("store.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| HintError::Store(format!("failed to run store migrations: {}", e)))?;
    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| HintError::Store(format!("lock poisoned: {}", e)))
  }
}

/// Schema for store tables.
const STORE_SCHEMA: &str = r#"
-- Primary object table (stores serialized JSON)
CREATE TABLE IF NOT EXISTS objects (
    kind INTEGER NOT NULL,
    key TEXT NOT NULL,
    data BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (kind, key)
);

-- Secondary index keys pointing back at a primary object
CREATE TABLE IF NOT EXISTS object_index (
    idx_kind INTEGER NOT NULL,
    idx_key TEXT NOT NULL,
    kind INTEGER NOT NULL,
    key TEXT NOT NULL,
    PRIMARY KEY (idx_kind, idx_key)
);

CREATE INDEX IF NOT EXISTS idx_object_index_target ON object_index(kind, key);
"#;

impl HintStore for SqliteStore {
  fn get(&self, key: &DbKey) -> Result<Option<Value>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT data FROM objects WHERE kind = ? AND key = ?")
      .map_err(|e| HintError::Store(format!("failed to prepare get: {}", e)))?;

    // Only an absent row is None; a genuine read fault propagates.
    let data: Option<Vec<u8>> = stmt
      .query_row(params![key.kind.code(), key.key], |row| row.get(0))
      .optional()?;

    match data {
      Some(data) => {
        let doc = serde_json::from_slice(&data)
          .map_err(|e| HintError::Store(format!("corrupt stored document: {}", e)))?;
        Ok(Some(doc))
      }
      None => Ok(None),
    }
  }

  fn put(&self, key: &DbKey, index_keys: &[DbKey], value: &Value) -> Result<()> {
    let conn = self.lock()?;

    let data = serde_json::to_vec(value)
      .map_err(|e| HintError::Store(format!("failed to serialize document: {}", e)))?;

    conn
      .execute("BEGIN TRANSACTION", [])
      .map_err(|e| HintError::Store(format!("failed to begin transaction: {}", e)))?;

    let result = (|| -> Result<()> {
      conn.execute(
        "DELETE FROM object_index WHERE kind = ? AND key = ?",
        params![key.kind.code(), key.key],
      )?;

      conn.execute(
        "INSERT OR REPLACE INTO objects (kind, key, data, stored_at)
         VALUES (?, ?, ?, datetime('now'))",
        params![key.kind.code(), key.key, data],
      )?;

      for idx in index_keys {
        conn.execute(
          "INSERT OR REPLACE INTO object_index (idx_kind, idx_key, kind, key)
           VALUES (?, ?, ?, ?)",
          params![idx.kind.code(), idx.key, key.kind.code(), key.key],
        )?;
      }

      Ok(())
    })();

    match result {
      Ok(()) => {
        conn
          .execute("COMMIT", [])
          .map_err(|e| HintError::Store(format!("failed to commit transaction: {}", e)))?;
        Ok(())
      }
      Err(e) => {
        let _ = conn.execute("ROLLBACK", []);
        Err(e)
      }
    }
  }
}

/// In-memory store. Counts writes so tests can assert that clean caches
/// perform zero puts.
#[derive(Default)]
pub struct MemStore {
  objects: Mutex<HashMap<(DbKind, String), Value>>,
  puts: AtomicUsize,
}

impl MemStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of `put` calls seen so far.
  pub fn put_count(&self) -> usize {
    self.puts.load(Ordering::SeqCst)
  }
}

impl HintStore for MemStore {
  fn get(&self, key: &DbKey) -> Result<Option<Value>> {
    let objects = self
      .objects
      .lock()
      .map_err(|e| HintError::Store(format!("lock poisoned: {}", e)))?;
    Ok(objects.get(&(key.kind, key.key.clone())).cloned())
  }

  fn put(&self, key: &DbKey, _index_keys: &[DbKey], value: &Value) -> Result<()> {
    let mut objects = self
      .objects
      .lock()
      .map_err(|e| HintError::Store(format!("lock poisoned: {}", e)))?;
    objects.insert((key.kind, key.key.clone()), value.clone());
    self.puts.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}
