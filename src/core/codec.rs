//! Purpose: Read and write the `DDB1` table container.
//! Exports: `deserialize`, `serialize`.
//! Role: Orchestrates cursor, string pool, registry, and schema into a `TableSet`.
//! Invariants: Header (magic, version) is checked before any table is parsed.
//! Invariants: A malformed table aborts the whole call; no partial set is returned.
//! Invariants: The string pool precedes its first reference; it is spliced in after the body is built.
//! Invariants: The writer reproduces the string layout recorded in the set.
use tracing::{debug, trace};

use crate::core::cursor::{ByteReader, ByteWriter};
use crate::core::error::{Error, ErrorKind};
use crate::core::format::{MAGIC, StringLayout};
use crate::core::pool::StringPool;
use crate::core::schema::Schema;
use crate::core::table::{check_row, Table, TableSet};
use crate::core::types::{decode_cell, encode_cell, StringSink, StringSource};

pub fn deserialize(bytes: &[u8]) -> Result<TableSet, Error> {
    let mut reader = ByteReader::new(bytes);

    let magic = reader.read_bytes(MAGIC.len())?;
    if magic != MAGIC {
        return Err(Error::new(ErrorKind::BadMagic)
            .with_message(format!("expected {:?}, found {:?}", MAGIC, magic))
            .with_offset(0)
            .with_hint("Header-less KingsIsle files are read with `format::decode`."));
    }
    let version_offset = reader.position() as u64;
    let layout = StringLayout::from_version(reader.read_u16()?)
        .map_err(|err| err.with_offset(version_offset))?;

    let pool = match layout {
        StringLayout::Inline => None,
        StringLayout::Pooled => {
            let pool = StringPool::build(&mut reader)?;
            trace!(strings = pool.len(), "read string pool");
            Some(pool)
        }
    };
    let strings = match &pool {
        Some(pool) => StringSource::Pooled(pool),
        None => StringSource::Inline,
    };

    let table_count = reader.read_u32()?;
    let mut tables = TableSet::new(layout);
    for _ in 0..table_count {
        let start = reader.position() as u64;
        let table = read_table(&mut reader, strings)?;
        tables
            .insert(table)
            .map_err(|err| err.with_offset(start))?;
    }

    if !reader.is_empty() {
        return Err(Error::new(ErrorKind::Corrupt)
            .with_message(format!("{} trailing bytes after last table", reader.remaining()))
            .with_offset(reader.position() as u64));
    }
    Ok(tables)
}

fn read_table(reader: &mut ByteReader<'_>, strings: StringSource<'_>) -> Result<Table, Error> {
    let name = reader.read_length_prefixed_string()?;
    read_table_body(reader, strings, &name).map_err(|err| err.with_table(name))
}

fn read_table_body(
    reader: &mut ByteReader<'_>,
    strings: StringSource<'_>,
    name: &str,
) -> Result<Table, Error> {
    let schema = Schema::decode(reader)?;
    let row_count_offset = reader.position() as u64;
    let row_count = reader.read_u32()? as usize;
    if schema.is_empty() && row_count > 0 {
        return Err(Error::new(ErrorKind::Corrupt)
            .with_message(format!("table without columns declares {row_count} rows"))
            .with_offset(row_count_offset));
    }

    let capacity = match schema.fixed_row_width() {
        Some(width) => {
            reader.ensure(row_count.saturating_mul(width))?;
            row_count.min(reader.remaining() / width.max(1))
        }
        None => row_count.min(reader.remaining()),
    };
    let mut rows = Vec::with_capacity(capacity);
    let mut running = vec![0u64; schema.len()];
    for _ in 0..row_count {
        let mut values = Vec::with_capacity(schema.len());
        for (column, acc) in schema.columns().iter().zip(running.iter_mut()) {
            let value = decode_cell(column, reader, strings, acc)
                .map_err(|err| err.with_column(column.name()))?;
            values.push(value);
        }
        rows.push(values);
    }

    debug!(table = name, columns = schema.len(), rows = row_count, "decoded table");
    let mut table = Table::new(name, schema);
    table.reserve(rows.len());
    for values in rows {
        table.push_row(values)?;
    }
    Ok(table)
}

pub fn serialize(tables: &TableSet) -> Result<Vec<u8>, Error> {
    let layout = tables.layout();
    let mut pool = StringPool::new();
    let mut body = ByteWriter::new();

    let table_count = u32::try_from(tables.len()).map_err(|_| {
        Error::new(ErrorKind::InvalidValue).with_message("table count exceeds u32")
    })?;
    body.write_u32(table_count);

    let mut strings = match layout {
        StringLayout::Inline => StringSink::Inline,
        StringLayout::Pooled => StringSink::Pooled(&mut pool),
    };
    for table in tables {
        write_table(table, &mut body, &mut strings).map_err(|err| err.with_table(table.name()))?;
    }

    let mut out = ByteWriter::with_capacity(body.position() + MAGIC.len() + 2);
    out.write_bytes(&MAGIC);
    out.write_u16(layout.version());
    if layout == StringLayout::Pooled {
        trace!(strings = pool.len(), "writing string pool");
        pool.encode(&mut out)?;
    }
    out.write_bytes(body.as_slice());
    Ok(out.into_bytes())
}

fn write_table(
    table: &Table,
    writer: &mut ByteWriter,
    strings: &mut StringSink<'_>,
) -> Result<(), Error> {
    let schema = table.schema();
    writer.write_length_prefixed_string(table.name())?;
    schema.encode(writer)?;

    let row_count = u32::try_from(table.len()).map_err(|_| {
        Error::new(ErrorKind::InvalidValue).with_message("row count exceeds u32")
    })?;
    if schema.is_empty() && row_count > 0 {
        return Err(Error::new(ErrorKind::InvalidSchema)
            .with_message(format!("a container table without columns cannot hold {row_count} rows"))
            .with_hint("Record streams keep empty records (--format kingsisle)."));
    }
    writer.write_u32(row_count);

    let mut running = vec![0u64; schema.len()];
    for row in table.rows() {
        check_row(schema, row.values())?;
        for ((column, value), acc) in schema
            .columns()
            .iter()
            .zip(row.values())
            .zip(running.iter_mut())
        {
            encode_cell(column, value, writer, strings, acc)
                .map_err(|err| err.with_column(column.name()))?;
        }
    }

    debug!(table = table.name(), columns = schema.len(), rows = table.len(), "encoded table");
    Ok(())
}
