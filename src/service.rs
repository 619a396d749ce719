//! Public façade over base records and dynamic fields.
//!
//! Owns consistency ordering: base writes happen before dynamic field
//! writes, the cache is only touched after the store confirms, and a
//! per-employee lock keeps concurrent writers from interleaving a partial
//! field set into the cache.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::cache::FieldCache;
use crate::db::employees::EmployeeStore;
use crate::db::fields::FieldStore;
use crate::db::Store;
use crate::error::{Error, Result};
use crate::model::DynamicEmployee;
use crate::schema::{ColumnCatalog, SchemaExtender};
use crate::value::{FieldType, FieldValue};

/// How `search_by_field` compares values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
  /// Equality, with integer/decimal coercion.
  Exact,
  /// Case-insensitive substring match.
  Pattern,
}

/// Base column to group salary totals by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
  Title,
  Division,
}

pub struct EmployeeService {
  employees: EmployeeStore,
  fields: FieldStore,
  catalog: Arc<ColumnCatalog>,
  cache: Arc<FieldCache>,
  extender: SchemaExtender,
  /// Per-employee write locks. Entries are created on demand and never
  /// removed; the set of employees a process writes to is small.
  write_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl EmployeeService {
  /// Build the service over an open store, discovering any dynamic columns
  /// already present in the schema.
  pub fn new(store: Arc<Store>) -> Result<Self> {
    let catalog = Arc::new(ColumnCatalog::new(Arc::clone(&store))?);
    let cache = Arc::new(FieldCache::new());
    let extender = SchemaExtender::new(
      Arc::clone(&store),
      Arc::clone(&catalog),
      Arc::clone(&cache),
    );
    Ok(Self {
      employees: EmployeeStore::new(Arc::clone(&store)),
      fields: FieldStore::new(store),
      catalog,
      cache,
      extender,
      write_locks: Mutex::new(HashMap::new()),
    })
  }

  fn write_lock(&self, id: i64) -> Result<Arc<Mutex<()>>> {
    let mut locks = self.write_locks.lock()?;
    Ok(Arc::clone(locks.entry(id).or_default()))
  }

  /// Names of the currently known dynamic columns.
  pub fn known_fields(&self) -> Result<Vec<String>> {
    self.catalog.known_fields()
  }

  /// Declared type of a dynamic column.
  pub fn field_type(&self, name: &str) -> Result<FieldType> {
    self.catalog.type_of(name)
  }

  /// Re-read the store schema, picking up columns added out of band.
  pub fn refresh_catalog(&self) -> Result<()> {
    self.catalog.refresh()
  }

  /// Add a dynamic column. `default`, when given, reaches every existing
  /// employee, cached or not.
  pub fn add_column(&self, name: &str, ty: FieldType, default: Option<&FieldValue>) -> Result<()> {
    self.extender.add_column(name, ty, default)
  }

  /// Fetch one employee with all dynamic fields, served from cache when the
  /// cached entry is complete for the current column set.
  pub fn get(&self, id: i64) -> Result<DynamicEmployee> {
    let base = self.employees.get(id)?;
    let (columns, version) = self.catalog.snapshot()?;
    let fields = self
      .cache
      .ensure_loaded(id, &columns, version, |id, cols| {
        self.fields.read_fields(id, cols)
      })?;
    Ok(DynamicEmployee { base, fields })
  }

  /// All employees, dynamic fields included.
  pub fn list_all(&self) -> Result<Vec<DynamicEmployee>> {
    let mut result = Vec::new();
    for id in self.employees.list_ids()? {
      match self.get(id) {
        Ok(emp) => result.push(emp),
        // Deleted between the listing and the fetch.
        Err(Error::EmployeeNotFound(_)) => {}
        Err(e) => return Err(e),
      }
    }
    Ok(result)
  }

  /// Insert a new employee and return the store-assigned id. The base record
  /// is inserted first; dynamic fields are then written one column at a
  /// time. A field failure leaves the base record and the already-written
  /// fields in place and reports `PartialUpdate`.
  pub fn add(&self, employee: &DynamicEmployee) -> Result<i64> {
    let (columns, version) = self.catalog.snapshot()?;
    self.check_known(&employee.fields, &columns)?;

    let id = self.employees.insert(&employee.base)?;
    let lock = self.write_lock(id)?;
    let _guard = lock.lock()?;

    let mut written = BTreeMap::new();
    for (name, value) in &employee.fields {
      if let Err(e) = self.fields.write_field(id, name, value) {
        warn!(id, field = %name, "dynamic field write failed during add");
        self.cache.insert_entry(id, written, false, version)?;
        return Err(Error::PartialUpdate {
          id,
          field: name.clone(),
          source: Box::new(e),
        });
      }
      written.insert(name.clone(), value.clone());
    }

    // Complete only when every known column was explicitly written; columns
    // left to their store default would otherwise be misreported as absent.
    let complete = columns.iter().all(|c| written.contains_key(&c.name));
    self.cache.insert_entry(id, written, complete, version)?;
    debug!(id, "employee added");
    Ok(id)
  }

  /// Update an employee. The base record is updated first and aborts the
  /// whole operation on failure; dynamic fields are then written per column
  /// with write-through caching after each confirmed write. There is no
  /// rollback across fields: on failure, re-invoking with the same entity
  /// retries only what still differs from `get`.
  pub fn update(&self, employee: &DynamicEmployee) -> Result<()> {
    let (columns, _) = self.catalog.snapshot()?;
    self.check_known(&employee.fields, &columns)?;

    let id = employee.id();
    let lock = self.write_lock(id)?;
    let _guard = lock.lock()?;

    self.employees.update(&employee.base)?;
    for (name, value) in &employee.fields {
      self
        .fields
        .write_field(id, name, value)
        .map_err(|e| {
          warn!(id, field = %name, "dynamic field write failed during update");
          Error::PartialUpdate {
            id,
            field: name.clone(),
            source: Box::new(e),
          }
        })?;
      self.cache.set_field(id, name, value.clone())?;
    }
    Ok(())
  }

  /// Write a single dynamic field.
  pub fn set_field(&self, id: i64, name: &str, value: FieldValue) -> Result<()> {
    if !self.catalog.contains(name)? {
      return Err(Error::ColumnNotFound(name.to_string()));
    }
    let lock = self.write_lock(id)?;
    let _guard = lock.lock()?;

    self.fields.write_field(id, name, &value)?;
    self.cache.set_field(id, name, value)?;
    Ok(())
  }

  /// Delete an employee; the row deletion removes dynamic values with it.
  pub fn delete(&self, id: i64) -> Result<()> {
    let lock = self.write_lock(id)?;
    let _guard = lock.lock()?;

    self.employees.delete(id)?;
    self.cache.invalidate(id)?;
    debug!(id, "employee deleted");
    Ok(())
  }

  /// Search employees by a dynamic field value.
  ///
  /// An unknown field matches nothing. Two tiers: the cache is swept first
  /// (it may hold writes the store sweep would report identically, and it is
  /// cheap); if fewer employees are cached than exist, the store is queried
  /// as well and merged by identifier, so lazily-populated caches never hide
  /// never-loaded employees and never produce duplicates.
  pub fn search_by_field(
    &self,
    name: &str,
    value: &FieldValue,
    mode: MatchMode,
  ) -> Result<Vec<DynamicEmployee>> {
    if !self.catalog.contains(name)? {
      return Ok(Vec::new());
    }

    let needle = value.to_string();
    let mut ids = BTreeSet::new();

    for (id, fields) in self.cache.snapshot()? {
      if let Some(candidate) = fields.get(name) {
        let hit = match mode {
          MatchMode::Exact => candidate.matches_exact(value),
          MatchMode::Pattern => candidate.matches_pattern(&needle),
        };
        if hit {
          ids.insert(id);
        }
      }
    }

    if (self.cache.entry_count()? as i64) < self.employees.count_all()? {
      let store_ids = match mode {
        MatchMode::Exact => self.fields.find_ids_exact(name, value)?,
        MatchMode::Pattern => self.fields.find_ids_pattern(name, &needle)?,
      };
      ids.extend(store_ids);
    }

    let mut results = Vec::new();
    for id in ids {
      match self.get(id) {
        Ok(emp) => results.push(emp),
        Err(Error::EmployeeNotFound(_)) => {}
        Err(e) => return Err(e),
      }
    }
    Ok(results)
  }

  /// Search employees whose name contains `pattern`, case-insensitive.
  /// Matches come back with their dynamic fields attached.
  pub fn search_by_name(&self, pattern: &str) -> Result<Vec<DynamicEmployee>> {
    let mut results = Vec::new();
    for employee in self.employees.search_by_name(pattern)? {
      match self.get(employee.id) {
        Ok(emp) => results.push(emp),
        // Deleted between the sweep and the fetch.
        Err(Error::EmployeeNotFound(_)) => {}
        Err(e) => return Err(e),
      }
    }
    Ok(results)
  }

  /// Raise salaries by `percent` for everyone earning in `[min, max)`.
  /// Base fields only; the dynamic cache is unaffected.
  pub fn raise_salaries(&self, min: f64, max: f64, percent: f64) -> Result<usize> {
    self.employees.raise_salaries(min, max, percent)
  }

  /// Total salary per job title or per division.
  pub fn total_pay_by(&self, group: GroupBy) -> Result<BTreeMap<String, f64>> {
    let column = match group {
      GroupBy::Title => "title",
      GroupBy::Division => "division",
    };
    self.employees.total_pay_grouped(column)
  }

  fn check_known(
    &self,
    fields: &BTreeMap<String, FieldValue>,
    columns: &[crate::schema::ColumnDescriptor],
  ) -> Result<()> {
    for name in fields.keys() {
      if !columns.iter().any(|c| &c.name == name) {
        return Err(Error::ColumnNotFound(name.clone()));
      }
    }
    Ok(())
  }
}
