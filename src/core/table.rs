//! Purpose: In-memory table model shared by every codec and the XML projection.
//! Exports: `Row`, `Table`, `TableSet`.
//! Role: The artifact passed across the binary/XML boundary.
//! Invariants: Every stored row has one value per column and each value is accepted by its column.
//! Invariants: Table names are unique within a set; insertion order is serialization order.
use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::core::error::{Error, ErrorKind};
use crate::core::format::StringLayout;
use crate::core::schema::Schema;
use crate::core::types::Value;

#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    name: String,
    schema: Schema,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn reserve(&mut self, additional: usize) {
        self.rows.reserve(additional);
    }

    /// Appends a row after checking its width and every value against the schema.
    pub fn push_row(&mut self, values: Vec<Value>) -> Result<(), Error> {
        check_row(&self.schema, &values).map_err(|err| err.with_table(&self.name))?;
        self.rows.push(Row { values });
        Ok(())
    }

    /// Looks up a value by column name through the schema's position index.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.schema.position(column)?;
        self.rows.get(row)?.get(idx)
    }
}

pub(crate) fn check_row(schema: &Schema, values: &[Value]) -> Result<(), Error> {
    if values.len() != schema.len() {
        return Err(Error::new(ErrorKind::InconsistentRowWidth).with_message(format!(
            "row has {} values, schema has {} columns",
            values.len(),
            schema.len()
        )));
    }
    for (column, value) in schema.columns().iter().zip(values) {
        if !column.accepts(value) {
            return Err(Error::new(ErrorKind::TypeMismatch)
                .with_message(format!(
                    "column declared as {}, found {}",
                    column.describe(),
                    value.kind_name()
                ))
                .with_column(column.name()));
        }
    }
    Ok(())
}

#[derive(Clone, Debug, Default)]
pub struct TableSet {
    layout: StringLayout,
    tables: IndexMap<String, Table>,
}

// Equal sets hold the same tables in the same order.
impl PartialEq for TableSet {
    fn eq(&self, other: &Self) -> bool {
        self.layout == other.layout && self.tables.iter().eq(other.tables.iter())
    }
}

impl TableSet {
    pub fn new(layout: StringLayout) -> Self {
        Self {
            layout,
            tables: IndexMap::new(),
        }
    }

    pub fn layout(&self) -> StringLayout {
        self.layout
    }

    pub fn set_layout(&mut self, layout: StringLayout) {
        self.layout = layout;
    }

    pub fn insert(&mut self, table: Table) -> Result<(), Error> {
        match self.tables.entry(table.name.clone()) {
            Entry::Occupied(_) => Err(Error::new(ErrorKind::DuplicateTable)
                .with_message(format!("duplicate table {:?}", table.name()))
                .with_table(table.name())),
            Entry::Vacant(slot) => {
                slot.insert(table);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Tables in insertion order.
    pub fn iter(&self) -> indexmap::map::Values<'_, String, Table> {
        self.tables.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn into_tables(self) -> Vec<Table> {
        self.tables.into_values().collect()
    }
}

impl<'a> IntoIterator for &'a TableSet {
    type Item = &'a Table;
    type IntoIter = indexmap::map::Values<'a, String, Table>;

    fn into_iter(self) -> Self::IntoIter {
        self.tables.values()
    }
}

#[cfg(test)]
mod tests {
    use super::{Table, TableSet};
    use crate::core::error::ErrorKind;
    use crate::core::format::StringLayout;
    use crate::core::schema::{Column, ColumnFlags, Schema};
    use crate::core::types::{TypeTag, Value};

    fn users() -> Table {
        let schema = Schema::new(vec![
            Column::new("id", TypeTag::UInt, ColumnFlags::empty()),
            Column::new("name", TypeTag::Str, ColumnFlags::empty()),
            Column::new("nick", TypeTag::Str, ColumnFlags::OPTIONAL),
        ])
        .unwrap();
        Table::new("users", schema)
    }

    #[test]
    fn push_row_validates_width() {
        let mut table = users();
        let err = table
            .push_row(vec![Value::UInt(1), Value::Str("a".into())])
            .expect_err("short row");
        assert_eq!(err.kind(), ErrorKind::InconsistentRowWidth);
        assert_eq!(err.table(), Some("users"));
        assert!(table.is_empty());
    }

    #[test]
    fn push_row_validates_types() {
        let mut table = users();
        let err = table
            .push_row(vec![Value::Int(1), Value::Str("a".into()), Value::Null])
            .expect_err("wrong tag");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert_eq!(err.column(), Some("id"));

        let err = table
            .push_row(vec![Value::UInt(1), Value::Null, Value::Null])
            .expect_err("null in required column");
        assert_eq!(err.column(), Some("name"));
    }

    #[test]
    fn columnless_tables_hold_empty_rows() {
        let mut table = Table::new("none", Schema::new(Vec::new()).unwrap());
        table.push_row(Vec::new()).expect("empty row");
        let err = table.push_row(vec![Value::UInt(1)]).expect_err("extra value");
        assert_eq!(err.kind(), ErrorKind::InconsistentRowWidth);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn value_lookup_by_name() {
        let mut table = users();
        table
            .push_row(vec![Value::UInt(7), Value::Str("alice".into()), Value::Null])
            .unwrap();
        assert_eq!(table.value(0, "id"), Some(&Value::UInt(7)));
        assert_eq!(table.value(0, "nick"), Some(&Value::Null));
        assert_eq!(table.value(0, "missing"), None);
        assert_eq!(table.value(1, "id"), None);
    }

    #[test]
    fn table_names_are_unique_and_ordered() {
        let mut set = TableSet::new(StringLayout::Pooled);
        set.insert(Table::new("b", Schema::new(Vec::new()).unwrap())).unwrap();
        set.insert(users()).unwrap();
        let err = set.insert(users()).expect_err("duplicate");
        assert_eq!(err.kind(), ErrorKind::DuplicateTable);
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["b", "users"]);
        assert_eq!(set.layout(), StringLayout::Pooled);
        assert_eq!(set.get("users").map(Table::len), Some(0));
        assert!(set.get("missing").is_none());
    }

    #[test]
    fn equality_follows_insertion_order() {
        let empty = || Schema::new(Vec::new()).unwrap();
        let mut forward = TableSet::new(StringLayout::Inline);
        forward.insert(Table::new("a", empty())).unwrap();
        forward.insert(Table::new("b", empty())).unwrap();
        let mut reversed = TableSet::new(StringLayout::Inline);
        reversed.insert(Table::new("b", empty())).unwrap();
        reversed.insert(Table::new("a", empty())).unwrap();

        assert_ne!(forward, reversed);
        assert_eq!(forward.iter().map(Table::name).collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(forward.into_tables().len(), 2);
    }
}
