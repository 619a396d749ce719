//! In-memory cache of dynamic field values.
//!
//! The cache accelerates reads but is never trusted blindly: every entry
//! carries a completeness flag and the catalog version it was loaded under,
//! and only `ensure_loaded` may mark an entry complete. Writes reach the
//! cache strictly after the store confirms them.

mod fields;

pub use fields::{CachedFields, FieldCache};
