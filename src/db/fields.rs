//! Durable read/write of dynamic column values, independent of the cache.
//!
//! Column names reaching this module have already passed the extender's
//! identifier validation; they are quoted when interpolated, and values are
//! always bound as parameters.

use std::collections::BTreeMap;
use std::sync::Arc;

use rusqlite::params;

use super::Store;
use crate::error::{Error, Result};
use crate::schema::ColumnDescriptor;
use crate::value::FieldValue;

#[derive(Clone)]
pub struct FieldStore {
  store: Arc<Store>,
}

impl FieldStore {
  pub fn new(store: Arc<Store>) -> Self {
    Self { store }
  }

  /// Read the requested columns for one employee in a single round trip.
  ///
  /// The returned map holds an entry per non-NULL column; a missing key means
  /// the store value is NULL. Fails with `EmployeeNotFound` when the row
  /// itself does not exist.
  pub fn read_fields(
    &self,
    id: i64,
    columns: &[ColumnDescriptor],
  ) -> Result<BTreeMap<String, FieldValue>> {
    let conn = self.store.conn()?;

    // Selecting id first doubles as the row-existence check.
    let mut select = String::from("SELECT id");
    for column in columns {
      select.push_str(", \"");
      select.push_str(&column.name);
      select.push('"');
    }
    select.push_str(" FROM employees WHERE id = ?1");

    let mut stmt = conn.prepare(&select)?;
    let mut rows = stmt.query(params![id])?;
    let row = rows.next()?.ok_or(Error::EmployeeNotFound(id))?;

    let mut fields = BTreeMap::new();
    for (i, column) in columns.iter().enumerate() {
      let value = FieldValue::from_column(row.get_ref(i + 1)?, column.ty);
      if !value.is_null() {
        fields.insert(column.name.clone(), value);
      }
    }
    Ok(fields)
  }

  /// Write one column for one employee as its own atomic statement.
  pub fn write_field(&self, id: i64, name: &str, value: &FieldValue) -> Result<()> {
    let conn = self.store.conn()?;
    let sql = format!("UPDATE employees SET \"{}\" = ?1 WHERE id = ?2", name);
    let changed = conn
      .execute(&sql, params![value, id])
      .map_err(|e| Error::WriteRejected {
        column: name.to_string(),
        source: e,
      })?;
    if changed == 0 {
      return Err(Error::EmployeeNotFound(id));
    }
    Ok(())
  }

  /// Identifiers of rows whose column equals the value exactly.
  pub fn find_ids_exact(&self, name: &str, value: &FieldValue) -> Result<Vec<i64>> {
    let conn = self.store.conn()?;
    if value.is_null() {
      let sql = format!("SELECT id FROM employees WHERE \"{}\" IS NULL ORDER BY id", name);
      let mut stmt = conn.prepare(&sql)?;
      let rows = stmt.query_map([], |row| row.get(0))?;
      return rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into);
    }

    let sql = format!("SELECT id FROM employees WHERE \"{}\" = ?1 ORDER BY id", name);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![value], |row| row.get(0))?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
  }

  /// Identifiers of rows whose column contains the pattern, case-insensitive.
  pub fn find_ids_pattern(&self, name: &str, pattern: &str) -> Result<Vec<i64>> {
    let conn = self.store.conn()?;
    let sql = format!(
      "SELECT id FROM employees WHERE \"{}\" LIKE ?1 ESCAPE '\\' ORDER BY id",
      name
    );
    let needle = format!("%{}%", escape_like(pattern));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![needle], |row| row.get(0))?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
  }
}

/// Escape LIKE metacharacters so the pattern is a literal substring.
pub(crate) fn escape_like(pattern: &str) -> String {
  let mut out = String::with_capacity(pattern.len());
  for c in pattern.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::value::FieldType;

  fn setup() -> (Arc<Store>, FieldStore, i64) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    {
      let conn = store.conn().unwrap();
      conn
        .execute_batch(
          "ALTER TABLE employees ADD COLUMN badge TEXT;
           ALTER TABLE employees ADD COLUMN clearance INTEGER;
           INSERT INTO employees (name, title, division, salary, pay_type)
             VALUES ('Ada', 'Engineer', 'IT', 100000, 'salaried');",
        )
        .unwrap();
    }
    let fields = FieldStore::new(Arc::clone(&store));
    (store, fields, 1)
  }

  fn columns() -> Vec<ColumnDescriptor> {
    vec![
      ColumnDescriptor {
        name: "badge".into(),
        ty: FieldType::Text,
      },
      ColumnDescriptor {
        name: "clearance".into(),
        ty: FieldType::Integer,
      },
    ]
  }

  #[test]
  fn test_read_fields_omits_null_columns() {
    let (_store, fields, id) = setup();
    fields
      .write_field(id, "badge", &FieldValue::Text("B-17".into()))
      .unwrap();

    let loaded = fields.read_fields(id, &columns()).unwrap();
    assert_eq!(loaded.get("badge"), Some(&FieldValue::Text("B-17".into())));
    assert!(!loaded.contains_key("clearance"));
  }

  #[test]
  fn test_read_fields_missing_row_is_not_found() {
    let (_store, fields, _) = setup();
    assert!(matches!(
      fields.read_fields(42, &columns()),
      Err(Error::EmployeeNotFound(42))
    ));
  }

  #[test]
  fn test_write_field_missing_row_and_bad_column() {
    let (_store, fields, id) = setup();
    assert!(matches!(
      fields.write_field(42, "badge", &FieldValue::Text("x".into())),
      Err(Error::EmployeeNotFound(42))
    ));
    assert!(matches!(
      fields.write_field(id, "no_such_column", &FieldValue::Null),
      Err(Error::WriteRejected { .. })
    ));
  }

  #[test]
  fn test_find_ids_exact_and_null() {
    let (store, fields, id) = setup();
    {
      let conn = store.conn().unwrap();
      conn
        .execute(
          "INSERT INTO employees (name, title, division, salary, pay_type)
           VALUES ('Bob', 'Analyst', 'HR', 50000, 'hourly')",
          [],
        )
        .unwrap();
    }
    fields
      .write_field(id, "clearance", &FieldValue::Integer(3))
      .unwrap();

    assert_eq!(
      fields.find_ids_exact("clearance", &FieldValue::Integer(3)).unwrap(),
      vec![id]
    );
    assert_eq!(
      fields.find_ids_exact("clearance", &FieldValue::Null).unwrap(),
      vec![2]
    );
  }

  #[test]
  fn test_find_ids_pattern_is_substring_and_escaped() {
    let (_store, fields, id) = setup();
    fields
      .write_field(id, "badge", &FieldValue::Text("A_100%".into()))
      .unwrap();

    assert_eq!(fields.find_ids_pattern("badge", "_100").unwrap(), vec![id]);
    assert_eq!(fields.find_ids_pattern("badge", "100%").unwrap(), vec![id]);
    // A literal underscore must not act as a single-char wildcard.
    assert!(fields.find_ids_pattern("badge", "X100").unwrap().is_empty());
  }
}
