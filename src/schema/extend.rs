//! Live schema extension: adding a dynamic column to the employee table.

use std::sync::Arc;

use tracing::info;

use super::ColumnCatalog;
use crate::cache::FieldCache;
use crate::db::Store;
use crate::error::{Error, Result};
use crate::model::is_base_column;
use crate::value::{FieldType, FieldValue};

const MAX_COLUMN_NAME_LEN: usize = 64;

/// Adds columns to the employee table and registers them with the catalog.
///
/// Column names become structural identifiers in the store, so they are
/// validated here rather than escaped: administrator input only.
pub struct SchemaExtender {
  store: Arc<Store>,
  catalog: Arc<ColumnCatalog>,
  cache: Arc<FieldCache>,
}

impl SchemaExtender {
  pub fn new(store: Arc<Store>, catalog: Arc<ColumnCatalog>, cache: Arc<FieldCache>) -> Self {
    Self {
      store,
      catalog,
      cache,
    }
  }

  /// Add a new dynamic column, optionally with a default value.
  ///
  /// The default goes into the `ALTER TABLE` statement itself, so every
  /// existing row gets it in the store; already-cached employees are seeded
  /// write-through, uncached ones pick it up on their next load. On store
  /// failure nothing is registered in the catalog.
  pub fn add_column(
    &self,
    name: &str,
    ty: FieldType,
    default: Option<&FieldValue>,
  ) -> Result<()> {
    validate_column_name(name)?;
    if self.catalog.contains(name)? {
      return Err(Error::DuplicateColumn(name.to_string()));
    }

    let mut sql = format!(
      "ALTER TABLE employees ADD COLUMN \"{}\" {}",
      name,
      ty.sql_decl()
    );
    if let Some(value) = default.filter(|v| !v.is_null()) {
      // ALTER TABLE cannot take bound parameters; the literal is quoted.
      sql.push_str(" DEFAULT ");
      sql.push_str(&sql_literal(value));
    }

    {
      let conn = self.store.conn()?;
      conn.execute(&sql, []).map_err(Error::SchemaAlter)?;
    }

    self.catalog.register(name, ty)?;
    if let Some(value) = default.filter(|v| !v.is_null()) {
      let seeded = self.cache.seed_default(name, value)?;
      info!(column = name, %ty, seeded, "added dynamic column with default");
    } else {
      info!(column = name, %ty, "added dynamic column");
    }
    Ok(())
  }
}

/// Reject names that could not be a plain SQL identifier or that collide
/// with a base field.
pub fn validate_column_name(name: &str) -> Result<()> {
  let invalid = |reason| Err(Error::InvalidColumnName(name.to_string(), reason));

  if name.is_empty() {
    return invalid("empty name");
  }
  if name.len() > MAX_COLUMN_NAME_LEN {
    return invalid("name too long");
  }
  let mut chars = name.chars();
  let first = chars.next().unwrap_or('_');
  if !(first.is_ascii_alphabetic() || first == '_') {
    return invalid("must start with a letter or underscore");
  }
  if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
    return invalid("only letters, digits and underscores allowed");
  }
  if is_base_column(name) {
    return invalid("collides with a base field");
  }
  Ok(())
}

/// Render a value as a SQL literal for the DEFAULT clause.
fn sql_literal(value: &FieldValue) -> String {
  match value {
    FieldValue::Null => "NULL".to_string(),
    FieldValue::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
    FieldValue::Integer(i) => i.to_string(),
    FieldValue::Decimal(d) => d.to_string(),
    FieldValue::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
    FieldValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
  }
}
