//! Purpose: JSON summary emitted by `ddbconv inspect`.
//! Exports: `InspectSummary`.
//! Role: Keep the inspect envelope shape in one place, derived with serde.
//! Invariants: Stable key names; tables and columns keep file order.

use std::path::Path;

use ddbconv::{BinaryFormat, Column, Table, TableSet};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct InspectSummary {
    pub path: String,
    pub format: &'static str,
    pub tables: Vec<TableSummary>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct TableSummary {
    pub name: String,
    pub rows: usize,
    pub columns: Vec<ColumnSummary>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct ColumnSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<&'static str>,
}

impl InspectSummary {
    pub(crate) fn new(path: &Path, format: BinaryFormat, tables: &TableSet) -> Self {
        Self {
            path: path.display().to_string(),
            format: format.as_str(),
            tables: tables.iter().map(TableSummary::from).collect(),
        }
    }
}

impl From<&Table> for TableSummary {
    fn from(table: &Table) -> Self {
        Self {
            name: table.name().to_string(),
            rows: table.len(),
            columns: table.schema().columns().iter().map(ColumnSummary::from).collect(),
        }
    }
}

impl From<&Column> for ColumnSummary {
    fn from(column: &Column) -> Self {
        Self {
            name: column.name().to_string(),
            type_name: column.tag().name(),
            flags: column.flags().iter_names().map(|(name, _)| name).collect(),
        }
    }
}
