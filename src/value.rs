//! Dynamic field values and their declared column types.
//!
//! Values are chosen at the input boundary (CLI parsing, store decoding) so
//! the write path never inspects runtime types; it just binds the variant.

use std::fmt;

use chrono::NaiveDate;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Declared type of a dynamic column, derived from the store's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
  Text,
  Integer,
  Decimal,
  Date,
  Boolean,
  Other,
}

impl FieldType {
  /// Map a SQLite declared type (e.g. "VARCHAR(255)", "INT") to a field type.
  pub fn from_decl(decl: &str) -> Self {
    let upper = decl.to_ascii_uppercase();
    if upper.contains("INT") {
      Self::Integer
    } else if upper.contains("REAL")
      || upper.contains("FLOA")
      || upper.contains("DOUB")
      || upper.contains("DEC")
      || upper.contains("NUM")
    {
      Self::Decimal
    } else if upper.contains("DATE") {
      Self::Date
    } else if upper.contains("BOOL") {
      Self::Boolean
    } else if upper.contains("CHAR") || upper.contains("TEXT") || upper.contains("CLOB") {
      Self::Text
    } else {
      Self::Other
    }
  }

  /// Declared type used when adding a column of this type.
  pub fn sql_decl(&self) -> &'static str {
    match self {
      Self::Text => "TEXT",
      Self::Integer => "INTEGER",
      Self::Decimal => "REAL",
      Self::Date => "DATE",
      Self::Boolean => "BOOLEAN",
      Self::Other => "BLOB",
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::Text => "text",
      Self::Integer => "integer",
      Self::Decimal => "decimal",
      Self::Date => "date",
      Self::Boolean => "boolean",
      Self::Other => "other",
    }
  }
}

impl fmt::Display for FieldType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// A dynamic field value. `Null` is a store-confirmed NULL; a missing map key
/// means the value has not been loaded, which is a different state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
  Null,
  Boolean(bool),
  Integer(i64),
  Decimal(f64),
  Date(NaiveDate),
  Text(String),
}

impl FieldValue {
  pub fn is_null(&self) -> bool {
    matches!(self, Self::Null)
  }

  /// Parse user input into a value of the given declared type.
  ///
  /// For non-text types the literal `"null"` (any case) parses to `Null`.
  /// Text columns take it verbatim, so the string "null" stays storable;
  /// clearing a text field needs an explicit `Null` from the caller.
  pub fn parse(input: &str, ty: FieldType) -> Result<Self> {
    let invalid = |reason: String| Error::InvalidValue {
      value: input.to_string(),
      ty: ty.name(),
      reason,
    };

    if !matches!(ty, FieldType::Text | FieldType::Other) && input.eq_ignore_ascii_case("null") {
      return Ok(Self::Null);
    }

    match ty {
      FieldType::Text | FieldType::Other => Ok(Self::Text(input.to_string())),
      FieldType::Integer => input
        .parse::<i64>()
        .map(Self::Integer)
        .map_err(|e| invalid(e.to_string())),
      FieldType::Decimal => input
        .parse::<f64>()
        .map(Self::Decimal)
        .map_err(|e| invalid(e.to_string())),
      FieldType::Date => NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map(Self::Date)
        .map_err(|e| invalid(e.to_string())),
      FieldType::Boolean => match input.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(Self::Boolean(true)),
        "false" | "0" | "no" => Ok(Self::Boolean(false)),
        _ => Err(invalid("expected true/false".to_string())),
      },
    }
  }

  /// Decode a store column value, using the declared type to pick the variant.
  pub fn from_column(value: ValueRef<'_>, ty: FieldType) -> Self {
    match value {
      ValueRef::Null => Self::Null,
      ValueRef::Integer(i) => match ty {
        FieldType::Boolean => Self::Boolean(i != 0),
        FieldType::Decimal => Self::Decimal(i as f64),
        _ => Self::Integer(i),
      },
      ValueRef::Real(f) => Self::Decimal(f),
      ValueRef::Text(bytes) => {
        let text = String::from_utf8_lossy(bytes).into_owned();
        if ty == FieldType::Date {
          if let Ok(date) = NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
            return Self::Date(date);
          }
        }
        Self::Text(text)
      }
      // Blobs are not part of the dynamic value model.
      ValueRef::Blob(_) => Self::Null,
    }
  }

  /// Equality for exact-match search, with integer/decimal coercion.
  pub fn matches_exact(&self, other: &FieldValue) -> bool {
    match (self, other) {
      (Self::Integer(a), Self::Decimal(b)) | (Self::Decimal(b), Self::Integer(a)) => {
        (*a as f64 - b).abs() < f64::EPSILON
      }
      (a, b) => a == b,
    }
  }

  /// Case-insensitive substring match against this value's display form.
  pub fn matches_pattern(&self, needle: &str) -> bool {
    if self.is_null() {
      return false;
    }
    self
      .to_string()
      .to_lowercase()
      .contains(&needle.to_lowercase())
  }
}

impl fmt::Display for FieldValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Null => write!(f, "NULL"),
      Self::Boolean(b) => write!(f, "{}", b),
      Self::Integer(i) => write!(f, "{}", i),
      Self::Decimal(d) => write!(f, "{}", d),
      Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
      Self::Text(s) => f.write_str(s),
    }
  }
}

impl ToSql for FieldValue {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(match self {
      Self::Null => ToSqlOutput::from(rusqlite::types::Null),
      Self::Boolean(b) => ToSqlOutput::from(*b),
      Self::Integer(i) => ToSqlOutput::from(*i),
      Self::Decimal(d) => ToSqlOutput::from(*d),
      Self::Date(d) => ToSqlOutput::from(d.format("%Y-%m-%d").to_string()),
      Self::Text(s) => ToSqlOutput::from(s.as_str()),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_decl_type_mapping() {
    assert_eq!(FieldType::from_decl("VARCHAR(255)"), FieldType::Text);
    assert_eq!(FieldType::from_decl("int"), FieldType::Integer);
    assert_eq!(FieldType::from_decl("DECIMAL(10,2)"), FieldType::Decimal);
    assert_eq!(FieldType::from_decl("DATE"), FieldType::Date);
    assert_eq!(FieldType::from_decl("BOOLEAN"), FieldType::Boolean);
    assert_eq!(FieldType::from_decl("BLOB"), FieldType::Other);
  }

  #[test]
  fn test_parse_by_type() {
    assert_eq!(
      FieldValue::parse("42", FieldType::Integer).unwrap(),
      FieldValue::Integer(42)
    );
    assert_eq!(
      FieldValue::parse("yes", FieldType::Boolean).unwrap(),
      FieldValue::Boolean(true)
    );
    assert_eq!(
      FieldValue::parse("2024-03-01", FieldType::Date).unwrap(),
      FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    );
    assert!(FieldValue::parse("abc", FieldType::Integer).is_err());
  }

  #[test]
  fn test_null_literal_only_for_non_text_types() {
    assert_eq!(
      FieldValue::parse("null", FieldType::Integer).unwrap(),
      FieldValue::Null
    );
    assert_eq!(
      FieldValue::parse("NULL", FieldType::Date).unwrap(),
      FieldValue::Null
    );
    // A text column can hold the literal string "null".
    assert_eq!(
      FieldValue::parse("null", FieldType::Text).unwrap(),
      FieldValue::Text("null".into())
    );
  }

  #[test]
  fn test_exact_match_coerces_numerics() {
    assert!(FieldValue::Integer(3).matches_exact(&FieldValue::Decimal(3.0)));
    assert!(!FieldValue::Integer(3).matches_exact(&FieldValue::Decimal(3.5)));
    assert!(FieldValue::Text("HR".into()).matches_exact(&FieldValue::Text("HR".into())));
    assert!(!FieldValue::Text("HR".into()).matches_exact(&FieldValue::Text("hr".into())));
  }

  #[test]
  fn test_pattern_match_is_case_insensitive_substring() {
    let v = FieldValue::Text("123456789".into());
    assert!(v.matches_pattern("123"));
    assert!(!v.matches_pattern("987"));
    assert!(FieldValue::Text("Engineering".into()).matches_pattern("GINEER"));
    assert!(!FieldValue::Null.matches_pattern(""));
  }
}
