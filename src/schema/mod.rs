//! Dynamic column tracking and live schema extension.
//!
//! The catalog is the authoritative view of which columns exist beyond the
//! fixed base fields; the extender is the only component that grows it.

pub mod catalog;
pub mod extend;

pub use catalog::{ColumnCatalog, ColumnDescriptor};
pub use extend::SchemaExtender;
