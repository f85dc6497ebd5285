pub mod schema;

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Database connection wrapper shared by the cache store and the offline queue
pub struct Database {
  conn: Mutex<Connection>,
}

impl Database {
  /// Open or create the database at `path`
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;

    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations()?;
    Ok(db)
  }

  /// Run database migrations
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(schema::SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(())
  }

  /// Lock the connection for a sequence of statements
  pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run `f` inside a transaction, committing only if it returns `Ok`.
  pub fn transaction<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Transaction<'_>) -> Result<T>,
  {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;
    let value = f(&tx)?;
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(value)
  }
}

/// Read a kv value inside an open transaction or connection.
pub fn kv_get(conn: &Connection, key: &str) -> Result<Option<String>> {
  conn
    .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
      row.get(0)
    })
    .optional()
    .map_err(|e| eyre!("Failed to read '{}': {}", key, e))
}

/// Write a kv value inside an open transaction or connection.
pub fn kv_set(conn: &Connection, key: &str, value: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR REPLACE INTO kv (key, value) VALUES (?, ?)",
      params![key, value],
    )
    .map_err(|e| eyre!("Failed to write '{}': {}", key, e))?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_kv_roundtrip_and_overwrite() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.lock().unwrap();

    assert_eq!(kv_get(&conn, "missing").unwrap(), None);
    kv_set(&conn, "k", "1").unwrap();
    kv_set(&conn, "k", "2").unwrap();
    assert_eq!(kv_get(&conn, "k").unwrap().as_deref(), Some("2"));
  }

  #[test]
  fn test_failed_transaction_rolls_back() {
    let db = Database::open_in_memory().unwrap();

    let result: Result<()> = db.transaction(|tx| {
      kv_set(tx, "k", "written")?;
      Err(eyre!("boom"))
    });
    assert!(result.is_err());

    let conn = db.lock().unwrap();
    assert_eq!(kv_get(&conn, "k").unwrap(), None);
  }

  #[test]
  fn test_open_creates_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("paysync.db");

    Database::open(&path).unwrap();
    assert!(path.exists());
  }
}
