//! Database error type.

use thiserror::Error;

/// Errors from externally triggerable database lookups.
///
/// Core-owned ids are trusted and index directly; only queries whose inputs
/// come from outside the database (names from a netlist, positions from a
/// caller) can fail.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DbError {
    /// A name lookup found no matching entity.
    #[error("no {entity} named {name:?}")]
    UnknownName {
        /// Entity class the lookup searched ("cell", "row", ...).
        entity: &'static str,
        /// The name that was looked up.
        name: String,
    },
}
