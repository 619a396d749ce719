//! Per-employee cache entries with explicit staleness tracking.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use tracing::trace;

use crate::error::Result;
use crate::schema::ColumnDescriptor;
use crate::value::FieldValue;

/// Copy of a cache entry handed to readers.
#[derive(Debug, Clone, Default)]
pub struct CachedFields {
  pub fields: BTreeMap<String, FieldValue>,
  /// True iff every dynamic column known at the entry's catalog version has
  /// been loaded for this employee, and that version is still current.
  pub complete: bool,
}

#[derive(Debug, Default)]
struct Entry {
  fields: BTreeMap<String, FieldValue>,
  complete: bool,
  catalog_version: u64,
  /// Bumped on every confirmed write-through. Lets `ensure_loaded` detect a
  /// write that landed while its store read was in flight.
  mutations: u64,
}

/// In-memory map from employee id to dynamic field values.
///
/// Readers always get copies; entries are only mutated under the map lock,
/// so a reader never observes an entry mid-merge.
#[derive(Debug, Default)]
pub struct FieldCache {
  entries: Mutex<HashMap<i64, Entry>>,
}

impl FieldCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Current cached fields for an employee. Absent entries come back empty
  /// and incomplete. `version` is the catalog's current version; an entry
  /// loaded under an older version is reported incomplete.
  pub fn get(&self, id: i64, version: u64) -> Result<CachedFields> {
    let entries = self.entries.lock()?;
    Ok(match entries.get(&id) {
      Some(entry) => CachedFields {
        fields: entry.fields.clone(),
        complete: entry.complete && entry.catalog_version == version,
      },
      None => CachedFields::default(),
    })
  }

  /// Ensure the entry holds every column in `columns`, loading from the store
  /// when the entry is absent, incomplete, or loaded under an older catalog
  /// version. Returns the resulting field map.
  ///
  /// Merge rule: store values win, with two exceptions. A locally written
  /// value whose key the store did not return is preserved, tolerating
  /// read-after-write staleness on columns the store reports as NULL. And if
  /// the entry was written to while the loader's store read was in flight,
  /// every locally present value wins: the write-through happened after its
  /// store write was confirmed, so it is fresher than the read.
  pub fn ensure_loaded<F>(
    &self,
    id: i64,
    columns: &[ColumnDescriptor],
    version: u64,
    loader: F,
  ) -> Result<BTreeMap<String, FieldValue>>
  where
    F: FnOnce(i64, &[ColumnDescriptor]) -> Result<BTreeMap<String, FieldValue>>,
  {
    if columns.is_empty() {
      return Ok(BTreeMap::new());
    }

    let seen_mutations = {
      let entries = self.entries.lock()?;
      match entries.get(&id) {
        Some(entry) if entry.complete && entry.catalog_version == version => {
          return Ok(entry.fields.clone());
        }
        Some(entry) => entry.mutations,
        None => 0,
      }
    };

    // Load outside the map lock so concurrent readers of other entries
    // are not blocked on the store round trip.
    trace!(id, "cache miss, loading dynamic fields");
    let loaded = loader(id, columns)?;

    let mut entries = self.entries.lock()?;
    let entry = entries.entry(id).or_default();
    let raced = entry.mutations != seen_mutations;
    for (name, value) in loaded {
      if raced && entry.fields.contains_key(&name) {
        continue;
      }
      entry.fields.insert(name, value);
    }
    // The loader covered every known column, so each one is now either
    // present with a value or confirmed NULL.
    entry.complete = true;
    entry.catalog_version = version;
    Ok(entry.fields.clone())
  }

  /// Write-through update of a single field. Callers must invoke this only
  /// after the store write succeeded. Creates the entry if absent.
  pub fn set_field(&self, id: i64, name: &str, value: FieldValue) -> Result<()> {
    let mut entries = self.entries.lock()?;
    let entry = entries.entry(id).or_default();
    entry.fields.insert(name.to_string(), value);
    entry.mutations += 1;
    Ok(())
  }

  /// Seed a freshly added employee's entry in one shot.
  pub fn insert_entry(
    &self,
    id: i64,
    fields: BTreeMap<String, FieldValue>,
    complete: bool,
    version: u64,
  ) -> Result<()> {
    let mut entries = self.entries.lock()?;
    let mutations = entries.get(&id).map_or(0, |e| e.mutations) + 1;
    entries.insert(
      id,
      Entry {
        fields,
        complete,
        catalog_version: version,
        mutations,
      },
    );
    Ok(())
  }

  /// Give every currently cached employee the default value of a new column,
  /// unless a value for it is already present. Uncached employees pick the
  /// default up from the store on their next load.
  pub fn seed_default(&self, name: &str, value: &FieldValue) -> Result<usize> {
    let mut entries = self.entries.lock()?;
    let mut seeded = 0;
    for entry in entries.values_mut() {
      entry
        .fields
        .entry(name.to_string())
        .or_insert_with(|| value.clone());
      entry.mutations += 1;
      seeded += 1;
    }
    Ok(seeded)
  }

  /// Drop the entry entirely. Used when the employee is deleted.
  pub fn invalidate(&self, id: i64) -> Result<()> {
    self.entries.lock()?.remove(&id);
    Ok(())
  }

  pub fn entry_count(&self) -> Result<usize> {
    Ok(self.entries.lock()?.len())
  }

  /// Copy-on-read snapshot of all entries, for search sweeps.
  pub fn snapshot(&self) -> Result<Vec<(i64, BTreeMap<String, FieldValue>)>> {
    let entries = self.entries.lock()?;
    Ok(
      entries
        .iter()
        .map(|(id, entry)| (*id, entry.fields.clone()))
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::value::FieldType;

  fn badge_column() -> Vec<ColumnDescriptor> {
    vec![ColumnDescriptor {
      name: "badge".into(),
      ty: FieldType::Text,
    }]
  }

  #[test]
  fn test_absent_entry_is_empty_and_incomplete() {
    let cache = FieldCache::new();
    let cached = cache.get(1, 0).unwrap();
    assert!(cached.fields.is_empty());
    assert!(!cached.complete);
  }

  #[test]
  fn test_ensure_loaded_marks_complete_and_skips_reload() {
    let cache = FieldCache::new();
    let mut calls = 0;

    let fields = cache
      .ensure_loaded(1, &badge_column(), 3, |_, _| {
        calls += 1;
        Ok(BTreeMap::from([(
          "badge".to_string(),
          FieldValue::Text("B-1".into()),
        )]))
      })
      .unwrap();
    assert_eq!(fields["badge"], FieldValue::Text("B-1".into()));
    assert!(cache.get(1, 3).unwrap().complete);

    // Complete at the same version: the loader must not run again.
    cache
      .ensure_loaded(1, &badge_column(), 3, |_, _| {
        calls += 1;
        panic!("loader must not be called for a complete entry");
      })
      .unwrap();
    assert_eq!(calls, 1);
  }

  #[test]
  fn test_catalog_version_mismatch_forces_reload() {
    let cache = FieldCache::new();
    cache
      .ensure_loaded(1, &badge_column(), 1, |_, _| Ok(BTreeMap::new()))
      .unwrap();
    assert!(cache.get(1, 1).unwrap().complete);
    assert!(!cache.get(1, 2).unwrap().complete);

    let mut reloaded = false;
    cache
      .ensure_loaded(1, &badge_column(), 2, |_, _| {
        reloaded = true;
        Ok(BTreeMap::new())
      })
      .unwrap();
    assert!(reloaded);
    assert!(cache.get(1, 2).unwrap().complete);
  }

  #[test]
  fn test_merge_preserves_local_value_when_store_returns_no_key() {
    let cache = FieldCache::new();
    // Locally written but the store still reports NULL for it.
    cache
      .set_field(1, "badge", FieldValue::Text("B-9".into()))
      .unwrap();

    let fields = cache
      .ensure_loaded(1, &badge_column(), 0, |_, _| Ok(BTreeMap::new()))
      .unwrap();
    assert_eq!(fields["badge"], FieldValue::Text("B-9".into()));
  }

  #[test]
  fn test_merge_store_value_wins() {
    let cache = FieldCache::new();
    cache
      .set_field(1, "badge", FieldValue::Text("stale".into()))
      .unwrap();

    let fields = cache
      .ensure_loaded(1, &badge_column(), 0, |_, _| {
        Ok(BTreeMap::from([(
          "badge".to_string(),
          FieldValue::Text("fresh".into()),
        )]))
      })
      .unwrap();
    assert_eq!(fields["badge"], FieldValue::Text("fresh".into()));
  }

  #[test]
  fn test_write_through_during_load_is_not_clobbered() {
    let cache = FieldCache::new();
    // A confirmed write-through lands while the store read is in flight; the
    // loader still returns the older value it read.
    let fields = cache
      .ensure_loaded(1, &badge_column(), 0, |_, _| {
        cache
          .set_field(1, "badge", FieldValue::Text("B-2".into()))
          .unwrap();
        Ok(BTreeMap::from([(
          "badge".to_string(),
          FieldValue::Text("B-1".into()),
        )]))
      })
      .unwrap();
    assert_eq!(fields["badge"], FieldValue::Text("B-2".into()));

    // The entry kept the newer value and is still usable as complete.
    let cached = cache.get(1, 0).unwrap();
    assert_eq!(cached.fields["badge"], FieldValue::Text("B-2".into()));
    assert!(cached.complete);
  }

  #[test]
  fn test_seed_default_does_not_overwrite() {
    let cache = FieldCache::new();
    cache.set_field(1, "badge", FieldValue::Text("B-1".into())).unwrap();
    cache.set_field(2, "other", FieldValue::Integer(5)).unwrap();

    let seeded = cache
      .seed_default("badge", &FieldValue::Text("PENDING".into()))
      .unwrap();
    assert_eq!(seeded, 2);
    assert_eq!(
      cache.get(1, 0).unwrap().fields["badge"],
      FieldValue::Text("B-1".into())
    );
    assert_eq!(
      cache.get(2, 0).unwrap().fields["badge"],
      FieldValue::Text("PENDING".into())
    );
  }

  #[test]
  fn test_invalidate_removes_entry() {
    let cache = FieldCache::new();
    cache.set_field(1, "badge", FieldValue::Null).unwrap();
    assert_eq!(cache.entry_count().unwrap(), 1);
    cache.invalidate(1).unwrap();
    assert_eq!(cache.entry_count().unwrap(), 0);
    assert!(cache.get(1, 0).unwrap().fields.is_empty());
  }
}
