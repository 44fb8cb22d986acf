// Parse XML text back into a table set; the schema of each table comes from its
// SCHEMA element or, failing that, from the attributes of its first record.
use std::str::FromStr;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::{ATTR_FORMAT, ATTR_NULL, ATTR_TYPE, Document, ITEM, RECORD, SCHEMA, TRUE};
use crate::core::error::{Error, ErrorKind};
use crate::core::format::{BinaryFormat, StringLayout};
use crate::core::schema::{Column, ColumnFlags, Schema};
use crate::core::table::{Table, TableSet};
use crate::core::types::{TypeTag, Value};

pub fn load(text: &str) -> Result<Document, Error> {
    let mut parser = Parser::new(text);

    let (root, empty_root) = match parser.next_tag()? {
        Event::Start(start) => (start, false),
        Event::Empty(start) => (start, true),
        Event::Eof => return Err(xml_error("document has no root element")),
        other => return Err(parser.unexpected(&other, "document")),
    };
    let root_name = element_name(&root);
    let format = match attribute(&root, ATTR_FORMAT)? {
        Some(name) => BinaryFormat::from_str(&name).map_err(|err| {
            xml_error(format!("root element has unknown {ATTR_FORMAT} {name:?}")).with_source(err)
        })?,
        None => BinaryFormat::KingsIsle,
    };
    let layout = match format {
        BinaryFormat::Container(layout) => layout,
        BinaryFormat::KingsIsle => StringLayout::Inline,
    };

    let mut tables = TableSet::new(layout);
    if !empty_root {
        loop {
            match parser.next_tag()? {
                Event::Start(start) => {
                    let name = element_name(&start);
                    let table = parse_table(&mut parser, &name).map_err(|err| err.with_table(&name))?;
                    tables.insert(table)?;
                }
                Event::Empty(start) => {
                    let name = element_name(&start);
                    return Err(xml_error(format!(
                        "table has neither {RECORD} nor {SCHEMA} elements"
                    ))
                    .with_table(name));
                }
                Event::End(_) => break,
                Event::Eof => return Err(xml_error("unexpected end of document")),
                other => return Err(parser.unexpected(&other, "root element")),
            }
        }
    }

    match parser.next_tag()? {
        Event::Eof => Ok(Document {
            root: root_name,
            format,
            tables,
        }),
        other => Err(parser.unexpected(&other, "document")),
    }
}

struct Parser<'a> {
    reader: Reader<&'a [u8]>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            reader: Reader::from_str(text),
        }
    }

    fn next(&mut self) -> Result<Event<'a>, Error> {
        let position = self.reader.buffer_position() as u64;
        self.reader.read_event().map_err(|err| {
            xml_error("malformed XML")
                .with_offset(position)
                .with_source(err)
        })
    }

    /// Next event that matters for structure: skips prolog noise and blank text.
    fn next_tag(&mut self) -> Result<Event<'a>, Error> {
        loop {
            match self.next()? {
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => continue,
                Event::Text(text) if text.iter().all(u8::is_ascii_whitespace) => continue,
                event => return Ok(event),
            }
        }
    }

    fn unexpected(&self, event: &Event<'_>, context: &str) -> Error {
        let what = match event {
            Event::Start(start) | Event::Empty(start) => format!("element <{}>", element_name(start)),
            Event::End(end) => format!("closing tag </{}>", String::from_utf8_lossy(end.name().as_ref())),
            Event::Text(_) | Event::CData(_) => "text".to_string(),
            Event::Eof => "end of document".to_string(),
            _ => "markup".to_string(),
        };
        xml_error(format!("unexpected {what} in {context}"))
            .with_offset(self.reader.buffer_position() as u64)
    }
}

enum Content {
    Null,
    Text(String),
    Items(Vec<String>),
}

struct Field {
    column: Column,
    content: Content,
}

fn parse_table(parser: &mut Parser<'_>, name: &str) -> Result<Table, Error> {
    let mut declared = None;
    let mut records: Vec<Vec<Field>> = Vec::new();
    loop {
        match parser.next_tag()? {
            Event::Start(start) if start.name().as_ref() == SCHEMA.as_bytes() => {
                declared = Some(parse_schema(parser)?);
            }
            Event::Empty(start) if start.name().as_ref() == SCHEMA.as_bytes() => {
                declared = Some(Schema::new(Vec::new())?);
            }
            Event::Start(start) if start.name().as_ref() == RECORD.as_bytes() => {
                records.push(parse_record(parser)?);
            }
            Event::Empty(start) if start.name().as_ref() == RECORD.as_bytes() => {
                records.push(Vec::new());
            }
            Event::End(_) => break,
            other => return Err(parser.unexpected(&other, "table")),
        }
    }

    let schema = match (declared, records.first()) {
        (Some(schema), _) => schema,
        (None, Some(first)) => {
            Schema::new(first.iter().map(|field| field.column.clone()).collect())?
        }
        (None, None) => {
            return Err(xml_error(format!(
                "table has neither {RECORD} nor {SCHEMA} elements"
            )));
        }
    };

    let mut table = Table::new(name, schema);
    table.reserve(records.len());
    for fields in records {
        let values = record_values(table.schema(), fields)?;
        table.push_row(values)?;
    }
    Ok(table)
}

fn parse_schema(parser: &mut Parser<'_>) -> Result<Schema, Error> {
    let mut columns = Vec::new();
    loop {
        match parser.next_tag()? {
            Event::Empty(start) => columns.push(parse_column(&start)?.0),
            Event::Start(start) => {
                columns.push(parse_column(&start)?.0);
                skip_to_end(parser)?;
            }
            Event::End(_) => break,
            other => return Err(parser.unexpected(&other, SCHEMA)),
        }
    }
    Schema::new(columns)
}

fn parse_record(parser: &mut Parser<'_>) -> Result<Vec<Field>, Error> {
    let mut fields = Vec::new();
    loop {
        match parser.next_tag()? {
            Event::Empty(start) => {
                let (column, null) = parse_column(&start)?;
                let content = if null {
                    Content::Null
                } else if column.flags().contains(ColumnFlags::ARRAY) {
                    Content::Items(Vec::new())
                } else {
                    Content::Text(String::new())
                };
                fields.push(Field { column, content });
            }
            Event::Start(start) => {
                let (column, null) = parse_column(&start)?;
                let content = parse_content(parser, &column)
                    .map_err(|err| err.with_column(column.name()))?;
                let content = if null { Content::Null } else { content };
                fields.push(Field { column, content });
            }
            Event::End(_) => break,
            other => return Err(parser.unexpected(&other, RECORD)),
        }
    }
    Ok(fields)
}

fn parse_column(start: &BytesStart<'_>) -> Result<(Column, bool), Error> {
    let name = element_name(start);
    let tag_name = attribute(start, ATTR_TYPE)?.ok_or_else(|| {
        xml_error(format!("field has no {ATTR_TYPE} attribute")).with_column(&name)
    })?;
    let tag = TypeTag::from_name(&tag_name).ok_or_else(|| {
        Error::new(ErrorKind::UnknownType)
            .with_message(format!("unknown type name {tag_name:?}"))
            .with_column(&name)
    })?;

    let mut flags = ColumnFlags::empty();
    for (flag_name, flag) in ColumnFlags::all().iter_names() {
        if is_true(attribute(start, flag_name)?) {
            flags.insert(flag);
        }
    }
    let null = is_true(attribute(start, ATTR_NULL)?);
    Ok((Column::new(name, tag, flags), null))
}

fn parse_content(parser: &mut Parser<'_>, column: &Column) -> Result<Content, Error> {
    let mut text = String::new();
    let mut items = Vec::new();
    loop {
        match parser.next()? {
            Event::Text(raw) => {
                let unescaped = raw
                    .unescape()
                    .map_err(|err| xml_error("invalid character reference").with_source(err))?;
                text.push_str(&unescaped);
            }
            Event::CData(raw) => text.push_str(&utf8(raw.into_inner().as_ref())?),
            Event::Start(start) if start.name().as_ref() == ITEM.as_bytes() => {
                items.push(parse_item(parser)?);
            }
            Event::Empty(start) if start.name().as_ref() == ITEM.as_bytes() => {
                items.push(String::new());
            }
            Event::Comment(_) => {}
            Event::End(_) => break,
            other => return Err(parser.unexpected(&other, "field")),
        }
    }

    if column.flags().contains(ColumnFlags::ARRAY) {
        if !text.trim().is_empty() {
            return Err(xml_error(format!("array field holds text outside {ITEM} elements")));
        }
        Ok(Content::Items(items))
    } else if !items.is_empty() {
        Err(xml_error(format!("{ITEM} elements in a field without ARRAY")))
    } else {
        Ok(Content::Text(text))
    }
}

fn parse_item(parser: &mut Parser<'_>) -> Result<String, Error> {
    let mut text = String::new();
    loop {
        match parser.next()? {
            Event::Text(raw) => {
                let unescaped = raw
                    .unescape()
                    .map_err(|err| xml_error("invalid character reference").with_source(err))?;
                text.push_str(&unescaped);
            }
            Event::CData(raw) => text.push_str(&utf8(raw.into_inner().as_ref())?),
            Event::Comment(_) => {}
            Event::End(_) => return Ok(text),
            other => return Err(parser.unexpected(&other, ITEM)),
        }
    }
}

fn skip_to_end(parser: &mut Parser<'_>) -> Result<(), Error> {
    let mut depth = 0usize;
    loop {
        match parser.next()? {
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => return Ok(()),
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(xml_error("unexpected end of document")),
            _ => {}
        }
    }
}

fn record_values(schema: &Schema, fields: Vec<Field>) -> Result<Vec<Value>, Error> {
    if fields.len() != schema.len() {
        return Err(Error::new(ErrorKind::InconsistentRowWidth).with_message(format!(
            "record has {} fields, table has {} columns",
            fields.len(),
            schema.len()
        )));
    }
    schema
        .columns()
        .iter()
        .zip(fields)
        .map(|(column, field)| {
            field_value(column, field).map_err(|err| err.with_column(column.name()))
        })
        .collect()
}

fn field_value(column: &Column, field: Field) -> Result<Value, Error> {
    if field.column != *column {
        return Err(Error::new(ErrorKind::TypeMismatch).with_message(format!(
            "field {} does not match column {}",
            field.column, column
        )));
    }
    let tag = column.tag();
    match field.content {
        Content::Null if column.flags().contains(ColumnFlags::OPTIONAL) => Ok(Value::Null),
        Content::Null => Err(Error::new(ErrorKind::TypeMismatch)
            .with_message(format!("{ATTR_NULL} on a column without OPTIONAL"))),
        Content::Text(text) => scalar(tag, &text),
        Content::Items(items) => items
            .iter()
            .map(|item| scalar(tag, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
    }
}

// Blank text in a fixed-width field reads as the type's zero value.
fn scalar(tag: TypeTag, text: &str) -> Result<Value, Error> {
    let entry = tag.entry();
    if entry.fixed_width.is_some() && text.trim().is_empty() {
        return Ok((entry.default)());
    }
    (entry.parse_text)(text)
}

fn attribute(start: &BytesStart<'_>, key: &str) -> Result<Option<String>, Error> {
    for attr in start.attributes() {
        let attr = attr.map_err(|err| xml_error("malformed attribute").with_source(err))?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|err| xml_error("malformed attribute value").with_source(err))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn is_true(value: Option<String>) -> bool {
    value.is_some_and(|value| value.eq_ignore_ascii_case(TRUE))
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn utf8(bytes: &[u8]) -> Result<String, Error> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|err| Error::new(ErrorKind::InvalidUtf8).with_source(err))
}

fn xml_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Xml).with_message(message)
}

#[cfg(test)]
mod tests {
    use super::load;
    use crate::core::error::ErrorKind;
    use crate::core::format::{BinaryFormat, StringLayout};
    use crate::core::schema::ColumnFlags;
    use crate::core::types::{TypeTag, Value};
    use crate::xml::save;

    #[test]
    fn loads_first_record_schema() {
        let text = r#"<?xml version="1.0" encoding="utf-8"?>
<LatestFileList>
  <Files>
    <RECORD>
      <SrcFileName TYPE="STR">a.wad</SrcFileName>
      <Size TYPE="UINT">10</Size>
      <_TargetTable TYPE="STR" NOXFER="TRUE">Files</_TargetTable>
    </RECORD>
    <RECORD>
      <SrcFileName TYPE="STR"></SrcFileName>
      <Size TYPE="UINT"></Size>
      <_TargetTable TYPE="STR" NOXFER="TRUE">Files</_TargetTable>
    </RECORD>
  </Files>
</LatestFileList>
"#;
        let doc = load(text).unwrap();
        assert_eq!(doc.root, "LatestFileList");
        assert_eq!(doc.format, BinaryFormat::KingsIsle);
        let table = doc.tables.get("Files").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.schema().column(2).unwrap().flags(), ColumnFlags::NOXFER);
        assert_eq!(table.value(0, "SrcFileName"), Some(&Value::Str("a.wad".into())));
        assert_eq!(table.value(1, "SrcFileName"), Some(&Value::Str(String::new())));
        assert_eq!(table.value(1, "Size"), Some(&Value::UInt(0)));
    }

    #[test]
    fn schema_element_keeps_empty_tables() {
        let text = r#"<r FORMAT="ddb-pooled"><T><SCHEMA><id TYPE="UINT"/><tags TYPE="WSTR" ARRAY="TRUE"/></SCHEMA></T></r>"#;
        let doc = load(text).unwrap();
        assert_eq!(doc.format, BinaryFormat::Container(StringLayout::Pooled));
        assert_eq!(doc.tables.layout(), StringLayout::Pooled);
        let table = doc.tables.get("T").unwrap();
        assert!(table.is_empty());
        assert_eq!(table.schema().len(), 2);
        assert_eq!(table.schema().column(1).unwrap().tag(), TypeTag::WStr);
    }

    #[test]
    fn arrays_nulls_and_references() {
        let text = "<r FORMAT=\"ddb-inline\"><T><RECORD>\
<xs TYPE=\"SHRT\" ARRAY=\"TRUE\"><ITEM>-1</ITEM><ITEM>2</ITEM></xs>\
<n TYPE=\"INT\" OPTIONAL=\"TRUE\" NULL=\"TRUE\"/>\
<s TYPE=\"STR\">a&#13;\nb &amp; <![CDATA[<c>]]></s>\
</RECORD></T></r>";
        let doc = load(text).unwrap();
        let table = doc.tables.get("T").unwrap();
        assert_eq!(
            table.value(0, "xs"),
            Some(&Value::List(vec![Value::Short(-1), Value::Short(2)]))
        );
        assert_eq!(table.value(0, "n"), Some(&Value::Null));
        assert_eq!(table.value(0, "s"), Some(&Value::Str("a\r\nb & <c>".into())));
    }

    #[test]
    fn saved_text_loads_back() {
        let text = "<r FORMAT=\"ddb-inline\"><T><RECORD>\
<g TYPE=\"GID\">18446744073709551615</g><f TYPE=\"FLT\">0.1</f>\
<w TYPE=\"WSTR\" OPTIONAL=\"TRUE\">  padded  </w><b TYPE=\"BOOL\">true</b>\
</RECORD></T></r>";
        let doc = load(text).unwrap();
        let saved = save(&doc.tables, doc.format, &doc.root).unwrap();
        assert_eq!(load(&saved).unwrap(), doc);
        let table = doc.tables.get("T").unwrap();
        assert_eq!(table.value(0, "w"), Some(&Value::WStr("  padded  ".into())));
    }

    #[test]
    fn record_shape_mismatches() {
        let wider = "<r><T><RECORD><a TYPE=\"INT\">1</a></RECORD>\
<RECORD><a TYPE=\"INT\">1</a><b TYPE=\"INT\">2</b></RECORD></T></r>";
        let err = load(wider).expect_err("width");
        assert_eq!(err.kind(), ErrorKind::InconsistentRowWidth);
        assert_eq!(err.table(), Some("T"));

        let retyped = "<r><T><RECORD><a TYPE=\"INT\">1</a></RECORD>\
<RECORD><a TYPE=\"UINT\">1</a></RECORD></T></r>";
        let err = load(retyped).expect_err("type");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert_eq!(err.column(), Some("a"));

        let null = "<r><T><RECORD><a TYPE=\"INT\" NULL=\"TRUE\"/></RECORD></T></r>";
        assert_eq!(load(null).expect_err("null").kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn malformed_documents() {
        assert_eq!(load("").expect_err("empty").kind(), ErrorKind::Xml);
        assert_eq!(load("<r><T>").expect_err("eof").kind(), ErrorKind::Xml);
        assert_eq!(load("<r><T/></r>").expect_err("bare").kind(), ErrorKind::Xml);
        assert_eq!(load("<r FORMAT=\"csv\"/>").expect_err("format").kind(), ErrorKind::Xml);

        let err = load("<r><T><RECORD><a>1</a></RECORD></T></r>").expect_err("type attr");
        assert_eq!(err.kind(), ErrorKind::Xml);
        assert_eq!(err.column(), Some("a"));

        let err = load("<r><T><RECORD><a TYPE=\"QWORD\">1</a></RECORD></T></r>").expect_err("tag");
        assert_eq!(err.kind(), ErrorKind::UnknownType);

        let err = load("<r><T><RECORD><a TYPE=\"INT\">x</a></RECORD></T></r>").expect_err("text");
        assert_eq!(err.kind(), ErrorKind::InvalidValue);

        let dup = "<r><T><SCHEMA/></T><T><SCHEMA/></T></r>";
        assert_eq!(load(dup).expect_err("dup").kind(), ErrorKind::DuplicateTable);
    }

    #[test]
    fn empty_root_has_no_tables() {
        let doc = load("<?xml version=\"1.0\"?>\n<r FORMAT=\"kingsisle\"/>\n").unwrap();
        assert_eq!(doc.root, "r");
        assert!(doc.tables.is_empty());
    }
}
