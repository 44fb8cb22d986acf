//! Purpose: Library crate behind the `ddbconv` CLI: KingsIsle DML tables to/from XML.
//! Exports: `core` (cursor, pool, registry, schema, table model, codecs, errors), `xml`.
//! Role: Binary codecs are the core; the XML projection builds only on the public table model.
//! Invariants: Every conversion allocates its own cursor, pool, and table set; no global state.
//! Invariants: Malformed input yields a typed `Error`, never a panic or a partial table set.
pub mod core;
pub mod xml;

pub use crate::core::codec::{deserialize, serialize};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::format::{BinaryFormat, StringLayout};
pub use crate::core::schema::{Column, ColumnFlags, Schema};
pub use crate::core::table::{Row, Table, TableSet};
pub use crate::core::types::{TypeTag, Value};
