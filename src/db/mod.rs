//! SQLite store handle and base schema bootstrap.

pub mod employees;
pub mod fields;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;

use crate::error::{Error, Result};

/// Schema for the employee table. Dynamic columns are added to this table at
/// runtime via `ALTER TABLE`; only the base columns are known here.
const BASE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS employees (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    title TEXT NOT NULL,
    division TEXT NOT NULL,
    salary REAL NOT NULL,
    pay_type TEXT NOT NULL
);
"#;

/// Handle to the relational store. Opened once at startup and passed (shared)
/// into every component that talks to the database.
pub struct Store {
  conn: Mutex<Connection>,
}

impl Store {
  /// Open or create the database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::Config(format!("failed to create {}: {}", parent.display(), e)))?;
    }

    let conn = Connection::open(path)?;
    Self::from_connection(conn)
  }

  /// Open an in-memory database. Used by tests and throwaway sessions.
  pub fn open_in_memory() -> Result<Self> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  /// Default database path under the user data directory.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| Error::Config("could not determine data directory".to_string()))?;

    Ok(data_dir.join("staffdb").join("staff.db"))
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn.busy_timeout(Duration::from_millis(5000))?;
    conn.execute_batch(BASE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Deadline for store calls that hit a locked database. A timeout surfaces
  /// as `Error::Timeout`, never a silent retry.
  pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
    self.conn()?.busy_timeout(timeout)?;
    Ok(())
  }

  pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    Ok(self.conn.lock()?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_open_in_memory_creates_base_table() {
    let store = Store::open_in_memory().unwrap();
    let conn = store.conn().unwrap();
    let count: i64 = conn
      .query_row("SELECT count(*) FROM employees", [], |row| row.get(0))
      .unwrap();
    assert_eq!(count, 0);
  }
}
