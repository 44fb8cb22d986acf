// XML projection against both binary formats, with files on disk.
use std::fs;

use ddbconv::core::format::{self, BinaryFormat};
use ddbconv::xml;
use ddbconv::{
    Column, ColumnFlags, ErrorKind, Schema, StringLayout, Table, TableSet, TypeTag, Value,
};

fn sample(layout: StringLayout) -> TableSet {
    let schema = Schema::new(vec![
        Column::new("id", TypeTag::UInt, ColumnFlags::DELTA),
        Column::new("name", TypeTag::WStr, ColumnFlags::empty()),
        Column::new("scale", TypeTag::Flt, ColumnFlags::OPTIONAL),
        Column::new("aliases", TypeTag::Str, ColumnFlags::ARRAY),
        Column::new("hidden", TypeTag::Bool, ColumnFlags::empty()),
        Column::new("_note", TypeTag::Str, ColumnFlags::NOXFER),
    ])
    .expect("schema");
    let mut table = Table::new("Items", schema);
    table
        .push_row(vec![
            Value::UInt(1000),
            Value::WStr("Staff <of> \"Fire\"".into()),
            Value::Flt(0.1),
            Value::List(vec![Value::Str("a & b".into()), Value::Str(String::new())]),
            Value::Bool(false),
            Value::Str(" spaced ".into()),
        ])
        .expect("row");
    table
        .push_row(vec![
            Value::UInt(998),
            Value::WStr("Wand".into()),
            Value::Null,
            Value::List(Vec::new()),
            Value::Bool(true),
            Value::Str(String::new()),
        ])
        .expect("row");

    let empty = Table::new(
        "Unused",
        Schema::new(vec![Column::new("gid", TypeTag::Gid, ColumnFlags::empty())]).expect("schema"),
    );

    let mut tables = TableSet::new(layout);
    tables.insert(table).expect("insert");
    tables.insert(empty).expect("insert");
    tables
}

#[test]
fn saved_document_loads_back_for_each_container_layout() {
    for layout in [StringLayout::Inline, StringLayout::Pooled] {
        let tables = sample(layout);
        let format = BinaryFormat::Container(layout);
        let text = xml::save(&tables, format, "Catalog").expect("save");
        let doc = xml::load(&text).expect("load");

        assert_eq!(doc.root, "Catalog");
        assert_eq!(doc.format, format);
        assert_eq!(doc.tables, tables);

        let original = format::encode(format, &tables).expect("encode");
        let reloaded = format::encode(doc.format, &doc.tables).expect("encode");
        assert_eq!(original, reloaded);
    }
}

#[test]
fn binary_to_xml_to_binary_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bin_path = dir.path().join("Catalog.ddb");
    let xml_path = dir.path().join("Catalog.xml");

    let bytes = format::encode(
        BinaryFormat::Container(StringLayout::Pooled),
        &sample(StringLayout::Pooled),
    )
    .expect("encode");
    fs::write(&bin_path, &bytes).expect("write bin");

    let (format, tables) = format::decode(&fs::read(&bin_path).expect("read bin")).expect("decode");
    fs::write(&xml_path, xml::save(&tables, format, "Catalog").expect("save")).expect("write xml");

    let doc = xml::load(&fs::read_to_string(&xml_path).expect("read xml")).expect("load");
    assert_eq!(format::encode(doc.format, &doc.tables).expect("encode"), bytes);
}

#[test]
fn files_without_format_or_schema_load() {
    // Legacy converter output: no FORMAT attribute and no SCHEMA element.
    let text = r#"<?xml version="1.0" encoding="utf-8"?>
<LatestFileList>
  <_Shared-WorldData>
    <RECORD>
      <SrcFileName TYPE="STR">Data/GameData/Root.wad</SrcFileName>
      <Size TYPE="UINT">42</Size>
      <_Flags TYPE="USHRT" NOXFER="TRUE">2</_Flags>
      <Label TYPE="WSTR">Wizard</Label>
    </RECORD>
  </_Shared-WorldData>
</LatestFileList>
"#;
    let doc = xml::load(text).expect("load");
    assert_eq!(doc.format, BinaryFormat::KingsIsle);
    let table = doc.tables.get("_Shared-WorldData").expect("table");
    assert_eq!(table.value(0, "Size"), Some(&Value::UInt(42)));

    let bytes = format::encode(doc.format, &doc.tables).expect("encode");
    let tables = format::decode(&bytes).expect("decode").1;
    assert_eq!(tables, doc.tables);

    let resaved = xml::save(&tables, BinaryFormat::KingsIsle, "LatestFileList").expect("save");
    assert!(resaved.contains("<LatestFileList FORMAT=\"kingsisle\">"));
    assert!(resaved.contains("      <_Flags TYPE=\"USHRT\" NOXFER=\"TRUE\">2</_Flags>\n"));
}

#[test]
fn container_only_columns_cannot_become_a_record_stream() {
    let tables = sample(StringLayout::Inline);
    let err = format::encode(BinaryFormat::KingsIsle, &tables).expect_err("not representable");
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert_eq!(err.table(), Some("Items"));
    assert_eq!(err.column(), Some("id"));
}
