//! Purpose: Read and write the header-less KingsIsle record stream (`LatestFileList.bin` et al.).
//! Exports: `deserialize`, `serialize`.
//! Role: Native game-client layout; shares the registry's primitive encodings with the container.
//! Invariants: A table is `record_count: u32` then `record_count + 1` blocks (one template, N records).
//! Invariants: Block sizes include the four header bytes; sizes are produced scratch-then-splice.
//! Invariants: The writer emits the canonical kind (0x02) and modifier (0x28) bytes.
//! Notes: Only tags 1-10 without array/optional/delta flags are representable here.
use tracing::debug;

use crate::core::cursor::{ByteReader, ByteWriter};
use crate::core::error::{Error, ErrorKind};
use crate::core::format::StringLayout;
use crate::core::schema::{Column, ColumnFlags, Schema};
use crate::core::table::{check_row, Table, TableSet};
use crate::core::types::{StringSink, StringSource, TypeTag};

const BLOCK_KIND: u8 = 0x02;
const SRV_TEMPLATE: u8 = 0x01;
const SRV_RECORD: u8 = 0x02;
const FIELD_MODIFIER: u8 = 0x28;
const BLOCK_HEADER_LEN: u16 = 4;
const TARGET_TABLE: &str = "_TargetTable";

pub fn deserialize(bytes: &[u8]) -> Result<TableSet, Error> {
    let mut reader = ByteReader::new(bytes);
    let mut tables = TableSet::new(StringLayout::Inline);
    while !reader.is_empty() {
        let start = reader.position() as u64;
        let table = read_table(&mut reader)?;
        tables.insert(table).map_err(|err| err.with_offset(start))?;
    }
    Ok(tables)
}

fn read_table(reader: &mut ByteReader<'_>) -> Result<Table, Error> {
    let record_count = reader.read_u32()? as usize;
    let mut template: Option<(Schema, String)> = None;
    // A record block is at least its four header bytes.
    let mut rows = Vec::with_capacity(record_count.min(reader.remaining() / 4));

    for _ in 0..=record_count {
        let block_start = reader.position();
        let _kind = reader.read_u8()?;
        let srv = reader.read_u8()?;
        let size = reader.read_u16()?;
        let body_len = size.checked_sub(BLOCK_HEADER_LEN).ok_or_else(|| {
            Error::new(ErrorKind::Corrupt)
                .with_message(format!("block size {size} is smaller than its header"))
                .with_offset(block_start as u64)
        })? as usize;
        reader.ensure(body_len)?;
        let body_end = reader.position() + body_len;

        match srv {
            SRV_TEMPLATE => {
                let parsed = read_template(reader, body_end)?;
                if template.as_ref().is_some_and(|existing| *existing != parsed) {
                    return Err(Error::new(ErrorKind::Corrupt)
                        .with_message("template changes within a table")
                        .with_table(&parsed.1)
                        .with_offset(block_start as u64));
                }
                template = Some(parsed);
            }
            SRV_RECORD => {
                let Some((schema, name)) = &template else {
                    return Err(Error::new(ErrorKind::Corrupt)
                        .with_message("record precedes its template")
                        .with_offset(block_start as u64));
                };
                let mut values = Vec::with_capacity(schema.len());
                for column in schema.columns() {
                    let entry = column.tag().entry();
                    let value = (entry.decode)(reader, StringSource::Inline)
                        .map_err(|err| err.with_column(column.name()).with_table(name))?;
                    values.push(value);
                }
                if reader.position() != body_end {
                    return Err(Error::new(ErrorKind::Corrupt)
                        .with_message(format!(
                            "record declares {body_len} bytes, fields used {}",
                            reader.position() - (body_end - body_len)
                        ))
                        .with_table(name)
                        .with_offset(block_start as u64));
                }
                rows.push(values);
            }
            other => {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message(format!("unknown block type {other:#04x}"))
                    .with_offset(block_start as u64 + 1));
            }
        }
    }

    let Some((schema, name)) = template else {
        return Err(Error::new(ErrorKind::Corrupt).with_message("table has no template"));
    };
    if rows.len() != record_count {
        return Err(Error::new(ErrorKind::Corrupt)
            .with_message(format!(
                "table declares {record_count} records, found {}",
                rows.len()
            ))
            .with_table(name));
    }

    debug!(table = %name, columns = schema.len(), rows = rows.len(), "decoded record stream table");
    let mut table = Table::new(name, schema);
    table.reserve(rows.len());
    for values in rows {
        table.push_row(values)?;
    }
    Ok(table)
}

fn read_template(reader: &mut ByteReader<'_>, end: usize) -> Result<(Schema, String), Error> {
    let mut columns = Vec::new();
    let mut target = None;
    while reader.position() < end {
        let name = reader.read_length_prefixed_string()?;
        let tag_offset = reader.position();
        let tag = native_tag(reader.read_u8()?)
            .map_err(|err| err.with_column(&name).with_offset(tag_offset as u64))?;
        let _modifier = reader.read_u8()?;

        if name == TARGET_TABLE {
            target = Some(reader.read_length_prefixed_string()?);
            continue;
        }
        let flags = if name.starts_with('_') {
            ColumnFlags::NOXFER
        } else {
            ColumnFlags::empty()
        };
        columns.push(Column::new(name, tag, flags));
    }
    if reader.position() != end {
        return Err(Error::new(ErrorKind::Corrupt)
            .with_message("template entries overrun the block size")
            .with_offset(end as u64));
    }

    let target = target.ok_or_else(|| {
        Error::new(ErrorKind::Corrupt)
            .with_message(format!("template has no {TARGET_TABLE} entry"))
            .with_offset(end as u64)
    })?;
    let schema = Schema::new(columns).map_err(|err| err.with_table(&target))?;
    Ok((schema, target))
}

fn native_tag(raw: u8) -> Result<TypeTag, Error> {
    let tag = TypeTag::from_u8(raw)?;
    if !tag.is_native() {
        return Err(Error::new(ErrorKind::UnknownType)
            .with_message(format!("type tag {raw:#04x} is not valid in a record stream")));
    }
    Ok(tag)
}

pub fn serialize(tables: &TableSet) -> Result<Vec<u8>, Error> {
    let mut writer = ByteWriter::new();
    for table in tables {
        write_table(table, &mut writer).map_err(|err| err.with_table(table.name()))?;
    }
    Ok(writer.into_bytes())
}

fn write_table(table: &Table, writer: &mut ByteWriter) -> Result<(), Error> {
    let schema = table.schema();
    for column in schema.columns() {
        check_representable(column)?;
    }
    let record_count = u32::try_from(table.len()).map_err(|_| {
        Error::new(ErrorKind::InvalidValue).with_message("record count exceeds u32")
    })?;
    writer.write_u32(record_count);

    writer.write_u8(BLOCK_KIND);
    writer.write_u8(SRV_TEMPLATE);
    writer.write_sized_u16(BLOCK_HEADER_LEN, |body| {
        for column in schema.columns() {
            body.write_length_prefixed_string(column.name())?;
            body.write_u8(column.tag().as_u8());
            body.write_u8(FIELD_MODIFIER);
        }
        body.write_length_prefixed_string(TARGET_TABLE)?;
        body.write_u8(TypeTag::Str.as_u8());
        body.write_u8(FIELD_MODIFIER);
        body.write_length_prefixed_string(table.name())
    })?;

    for row in table.rows() {
        check_row(schema, row.values())?;
        writer.write_u8(BLOCK_KIND);
        writer.write_u8(SRV_RECORD);
        writer.write_sized_u16(BLOCK_HEADER_LEN, |body| {
            for (column, value) in schema.columns().iter().zip(row.values()) {
                (column.tag().entry().encode)(value, body, &mut StringSink::Inline)
                    .map_err(|err| err.with_column(column.name()))?;
            }
            Ok(())
        })?;
    }

    debug!(table = table.name(), columns = schema.len(), rows = table.len(), "encoded record stream table");
    Ok(())
}

fn check_representable(column: &Column) -> Result<(), Error> {
    let extra_flags = column.flags().difference(ColumnFlags::NOXFER);
    if column.tag().is_native() && extra_flags.is_empty() && column.name() != TARGET_TABLE {
        return Ok(());
    }
    Err(Error::new(ErrorKind::Usage)
        .with_message(format!(
            "column {} cannot be stored in a KingsIsle record stream",
            column
        ))
        .with_column(column.name())
        .with_hint("Write a DDB1 container instead (--format ddb-inline or ddb-pooled)."))
}
