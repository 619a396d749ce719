//! Employee records: the fixed base fields plus runtime-added dynamic fields.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::FieldValue;

/// Column names of the fixed base schema. Always excluded from the dynamic
/// column catalog and from dynamic field maps.
pub const BASE_COLUMNS: [&str; 6] = ["id", "name", "title", "division", "salary", "pay_type"];

pub fn is_base_column(name: &str) -> bool {
  BASE_COLUMNS.iter().any(|c| c.eq_ignore_ascii_case(name))
}

/// The fixed-schema portion of an employee record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
  /// Assigned by the store on insert; 0 for not-yet-inserted records.
  pub id: i64,
  pub name: String,
  pub title: String,
  pub division: String,
  pub salary: f64,
  pub pay_type: String,
}

/// An employee together with its dynamic field values.
///
/// Keys are always a subset of the current column catalog. A key that is
/// absent means "not loaded here"; a present `FieldValue::Null` means the
/// store confirmed the column is NULL for this employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicEmployee {
  pub base: Employee,
  #[serde(default)]
  pub fields: BTreeMap<String, FieldValue>,
}

impl DynamicEmployee {
  pub fn new(base: Employee) -> Self {
    Self {
      base,
      fields: BTreeMap::new(),
    }
  }

  pub fn id(&self) -> i64 {
    self.base.id
  }

  pub fn field(&self, name: &str) -> Option<&FieldValue> {
    self.fields.get(name)
  }

  pub fn set_field(&mut self, name: impl Into<String>, value: FieldValue) {
    self.fields.insert(name.into(), value);
  }
}

impl fmt::Display for DynamicEmployee {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "#{} {} | {} | {} | ${} | {}",
      self.base.id,
      self.base.name,
      self.base.title,
      self.base.division,
      self.base.salary,
      self.base.pay_type
    )?;
    for (name, value) in &self.fields {
      write!(f, "\n  {}: {}", name, value)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_base_column_check_is_case_insensitive() {
    assert!(is_base_column("salary"));
    assert!(is_base_column("SALARY"));
    assert!(!is_base_column("badge"));
  }

  #[test]
  fn test_field_accessors() {
    let base = Employee {
      id: 7,
      name: "Ada".into(),
      title: "Engineer".into(),
      division: "IT".into(),
      salary: 100_000.0,
      pay_type: "salaried".into(),
    };
    let mut emp = DynamicEmployee::new(base);
    assert!(emp.field("badge").is_none());
    emp.set_field("badge", FieldValue::Text("PENDING".into()));
    assert_eq!(emp.field("badge"), Some(&FieldValue::Text("PENDING".into())));
    assert_eq!(emp.id(), 7);
  }
}
