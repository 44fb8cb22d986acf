// Render a table set as indented XML text.
use std::fmt::Write as _;

use quick_xml::escape::escape;

use super::{ATTR_FORMAT, ATTR_NULL, ATTR_TYPE, ITEM, RECORD, SCHEMA, TRUE};
use crate::core::error::{Error, ErrorKind};
use crate::core::format::BinaryFormat;
use crate::core::schema::Column;
use crate::core::table::TableSet;
use crate::core::types::Value;

pub fn save(tables: &TableSet, format: BinaryFormat, root: &str) -> Result<String, Error> {
    check_name(root, "root")?;
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    let _ = writeln!(out, "<{root} {ATTR_FORMAT}=\"{format}\">");

    for table in tables {
        check_name(table.name(), "table").map_err(|err| err.with_table(table.name()))?;
        let columns = table.schema().columns();
        for column in columns {
            check_name(column.name(), "column")
                .map_err(|err| err.with_column(column.name()).with_table(table.name()))?;
        }

        let _ = writeln!(out, "  <{}>", table.name());
        if table.is_empty() {
            let _ = writeln!(out, "    <{SCHEMA}>");
            for column in columns {
                let _ = writeln!(out, "      <{}{}/>", column.name(), attributes(column));
            }
            let _ = writeln!(out, "    </{SCHEMA}>");
        }
        for row in table.rows() {
            if columns.is_empty() {
                let _ = writeln!(out, "    <{RECORD}/>");
                continue;
            }
            let _ = writeln!(out, "    <{RECORD}>");
            for (column, value) in columns.iter().zip(row.values()) {
                out.push_str("      ");
                write_field(&mut out, column, value)
                    .map_err(|err| err.with_column(column.name()).with_table(table.name()))?;
                out.push('\n');
            }
            let _ = writeln!(out, "    </{RECORD}>");
        }
        let _ = writeln!(out, "  </{}>", table.name());
    }

    let _ = writeln!(out, "</{root}>");
    Ok(out)
}

fn attributes(column: &Column) -> String {
    let mut attrs = format!(" {ATTR_TYPE}=\"{}\"", column.tag());
    for (name, _) in column.flags().iter_names() {
        let _ = write!(attrs, " {name}=\"{TRUE}\"");
    }
    attrs
}

fn write_field(out: &mut String, column: &Column, value: &Value) -> Result<(), Error> {
    let name = column.name();
    let attrs = attributes(column);
    match value {
        Value::Null => {
            let _ = write!(out, "<{name}{attrs} {ATTR_NULL}=\"{TRUE}\"/>");
        }
        Value::List(items) => {
            let _ = write!(out, "<{name}{attrs}>");
            for item in items {
                let _ = write!(out, "<{ITEM}>{}</{ITEM}>", escape_text(&item.to_string())?);
            }
            let _ = write!(out, "</{name}>");
        }
        scalar => {
            let _ = write!(out, "<{name}{attrs}>{}</{name}>", escape_text(&scalar.to_string())?);
        }
    }
    Ok(())
}

// Carriage returns are written as references so they survive end-of-line handling.
fn escape_text(text: &str) -> Result<String, Error> {
    if let Some(bad) = text.chars().find(|c| !is_xml_char(*c)) {
        return Err(Error::new(ErrorKind::InvalidValue)
            .with_message(format!("U+{:04X} cannot appear in XML 1.0 text", bad as u32)));
    }
    let escaped = escape(text);
    Ok(if escaped.contains('\r') {
        escaped.replace('\r', "&#13;")
    } else {
        escaped.into_owned()
    })
}

// The `Char` production of XML 1.0.
fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}

fn check_name(name: &str, what: &str) -> Result<(), Error> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|first| first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        return Ok(());
    }
    Err(Error::new(ErrorKind::InvalidValue)
        .with_message(format!("{what} name {name:?} is not a valid XML element name")))
}
