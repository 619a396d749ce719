//! Authoritative view of the dynamic columns on the employee table.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::db::Store;
use crate::error::{Error, Result};
use crate::model::is_base_column;
use crate::value::FieldType;

/// A dynamic column: its name and the declared type it was created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
  pub name: String,
  pub ty: FieldType,
}

#[derive(Debug, Default)]
struct Snapshot {
  columns: BTreeMap<String, FieldType>,
  /// Bumped whenever the column set changes. Cache entries record the version
  /// they were loaded under; a mismatch means "complete" can no longer be
  /// trusted.
  version: u64,
}

/// Discovers and tracks the dynamic columns by introspecting the live schema.
pub struct ColumnCatalog {
  store: Arc<Store>,
  inner: RwLock<Snapshot>,
}

impl ColumnCatalog {
  /// Build a catalog and load the columns already present in the store.
  pub fn new(store: Arc<Store>) -> Result<Self> {
    let catalog = Self {
      store,
      inner: RwLock::new(Snapshot::default()),
    };
    catalog.refresh()?;
    Ok(catalog)
  }

  /// Re-read the table schema and rebuild the snapshot. The new mapping is
  /// built in full before the old one is replaced, so an introspection
  /// failure leaves the previous snapshot intact.
  pub fn refresh(&self) -> Result<()> {
    let columns = self.introspect()?;
    let mut inner = self.inner.write()?;
    if inner.columns != columns {
      debug!(count = columns.len(), "dynamic column set changed");
      inner.columns = columns;
      inner.version += 1;
    }
    Ok(())
  }

  fn introspect(&self) -> Result<BTreeMap<String, FieldType>> {
    let conn = self.store.conn()?;
    let mut stmt = conn
      .prepare("PRAGMA table_info(employees)")
      .map_err(Error::SchemaIntrospection)?;

    let rows = stmt
      .query_map([], |row| {
        let name: String = row.get("name")?;
        let decl: String = row.get("type")?;
        Ok((name, decl))
      })
      .map_err(Error::SchemaIntrospection)?;

    let mut columns = BTreeMap::new();
    for row in rows {
      let (name, decl) = row.map_err(Error::SchemaIntrospection)?;
      if !is_base_column(&name) {
        columns.insert(name, FieldType::from_decl(&decl));
      }
    }
    Ok(columns)
  }

  /// Snapshot copy of the known dynamic column names.
  pub fn known_fields(&self) -> Result<Vec<String>> {
    let inner = self.inner.read()?;
    Ok(inner.columns.keys().cloned().collect())
  }

  /// Copy of the full column list together with the version it reflects.
  /// The pair is read under one lock so callers can stamp cache entries
  /// with a version that matches the column list they loaded against.
  pub fn snapshot(&self) -> Result<(Vec<ColumnDescriptor>, u64)> {
    let inner = self.inner.read()?;
    let columns = inner
      .columns
      .iter()
      .map(|(name, ty)| ColumnDescriptor {
        name: name.clone(),
        ty: *ty,
      })
      .collect();
    Ok((columns, inner.version))
  }

  pub fn contains(&self, name: &str) -> Result<bool> {
    Ok(self.inner.read()?.columns.contains_key(name))
  }

  pub fn type_of(&self, name: &str) -> Result<FieldType> {
    self
      .inner
      .read()?
      .columns
      .get(name)
      .copied()
      .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
  }

  pub fn version(&self) -> Result<u64> {
    Ok(self.inner.read()?.version)
  }

  /// Register a column the extender just added, without a full re-introspect.
  pub(crate) fn register(&self, name: &str, ty: FieldType) -> Result<()> {
    let mut inner = self.inner.write()?;
    inner.columns.insert(name.to_string(), ty);
    inner.version += 1;
    Ok(())
  }
}
