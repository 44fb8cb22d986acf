//! Purpose: XML projection of a `TableSet` (the textual side of the converter).
//! Exports: `load`, `save`, `Document`.
//! Role: Built only on the public table model; never reaches into codec internals.
//! Invariants: One root element, one child per table, one `RECORD` per row, one element per column.
//! Invariants: Every field carries its `TYPE` and flag attributes so a record alone rebuilds the schema.
//! Invariants: Tables without rows carry a `SCHEMA` element so the column list survives.

mod load;
mod save;

pub use load::load;
pub use save::save;

use crate::core::format::BinaryFormat;
use crate::core::table::TableSet;

pub(crate) const RECORD: &str = "RECORD";
pub(crate) const SCHEMA: &str = "SCHEMA";
pub(crate) const ITEM: &str = "ITEM";
pub(crate) const ATTR_TYPE: &str = "TYPE";
pub(crate) const ATTR_NULL: &str = "NULL";
pub(crate) const ATTR_FORMAT: &str = "FORMAT";
pub(crate) const TRUE: &str = "TRUE";

/// A parsed XML document: root element name, target binary format, and tables.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub root: String,
    pub format: BinaryFormat,
    pub tables: TableSet,
}
