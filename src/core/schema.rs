// Column definitions and the per-table schema with its cached name index.
use std::collections::HashMap;
use std::fmt;

use bitflags::bitflags;

use crate::core::cursor::{ByteReader, ByteWriter};
use crate::core::error::{Error, ErrorKind};
use crate::core::types::{TypeTag, Value};

bitflags! {
    /// Per-column storage flags; names match the XML flag attributes.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    pub struct ColumnFlags: u16 {
        const ARRAY = 0x0001;
        const OPTIONAL = 0x0002;
        const DELTA = 0x0004;
        const NOXFER = 0x0008;
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Column {
    name: String,
    tag: TypeTag,
    flags: ColumnFlags,
}

impl Column {
    pub fn new(name: impl Into<String>, tag: TypeTag, flags: ColumnFlags) -> Self {
        Self {
            name: name.into(),
            tag,
            flags,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn flags(&self) -> ColumnFlags {
        self.flags
    }

    /// Whether `value` may be stored in this column.
    pub fn accepts(&self, value: &Value) -> bool {
        match value {
            Value::Null => self.flags.contains(ColumnFlags::OPTIONAL),
            Value::List(items) => {
                self.flags.contains(ColumnFlags::ARRAY)
                    && items.iter().all(|item| item.tag() == Some(self.tag))
            }
            scalar => !self.flags.contains(ColumnFlags::ARRAY) && scalar.tag() == Some(self.tag),
        }
    }

    /// Type name plus flag names, e.g. `UINT[ARRAY|OPTIONAL]`.
    pub fn describe(&self) -> String {
        let flags: Vec<&str> = self.flags.iter_names().map(|(name, _)| name).collect();
        if flags.is_empty() {
            self.tag.name().to_string()
        } else {
            format!("{}[{}]", self.tag, flags.join("|"))
        }
    }

    fn validate(&self) -> Result<(), Error> {
        let bits = self.flags.bits();
        if ColumnFlags::from_bits(bits).is_none() {
            return Err(Error::new(ErrorKind::InvalidSchema)
                .with_message(format!("unknown column flags {bits:#06x}"))
                .with_column(&self.name));
        }
        if self.flags.contains(ColumnFlags::DELTA)
            && (!self.tag.is_integer() || self.flags.contains(ColumnFlags::ARRAY))
        {
            return Err(Error::new(ErrorKind::InvalidSchema)
                .with_message(format!(
                    "delta coding needs a scalar integer column, found {}",
                    self.describe()
                ))
                .with_column(&self.name));
        }
        Ok(())
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.describe())
    }
}

#[derive(Clone, Debug)]
pub struct Schema {
    columns: Vec<Column>,
    positions: HashMap<String, usize>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Result<Self, Error> {
        if columns.len() > u16::MAX as usize {
            return Err(Error::new(ErrorKind::InvalidSchema)
                .with_message(format!("{} columns exceed {}", columns.len(), u16::MAX)));
        }
        let mut positions = HashMap::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            column.validate()?;
            if positions.insert(column.name.clone(), idx).is_some() {
                return Err(Error::new(ErrorKind::DuplicateColumn)
                    .with_message(format!("duplicate column {:?}", column.name))
                    .with_column(&column.name));
            }
        }
        Ok(Self { columns, positions })
    }

    /// Reads `column_count: u16` then `{name, type_tag: u8, flags: u16}` per column.
    pub fn decode(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        let count = reader.read_u16()? as usize;
        // A column takes at least five bytes: empty name, tag, flags.
        let mut columns = Vec::with_capacity(count.min(reader.remaining() / 5));
        for _ in 0..count {
            let name = reader.read_length_prefixed_string()?;
            let tag_offset = reader.position();
            let tag = TypeTag::from_u8(reader.read_u8()?)
                .map_err(|err| err.with_column(&name).with_offset(tag_offset as u64))?;
            let flags = ColumnFlags::from_bits_retain(reader.read_u16()?);
            columns.push(Column::new(name, tag, flags));
        }
        Self::new(columns)
    }

    pub fn encode(&self, writer: &mut ByteWriter) -> Result<(), Error> {
        writer.write_u16(self.columns.len() as u16);
        for column in &self.columns {
            writer
                .write_length_prefixed_string(&column.name)
                .map_err(|err| err.with_column(&column.name))?;
            writer.write_u8(column.tag.as_u8());
            writer.write_u16(column.flags.bits());
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Byte width of one row when every column is an unflagged fixed-width scalar.
    pub fn fixed_row_width(&self) -> Option<usize> {
        self.columns.iter().try_fold(0usize, |acc, column| {
            if !column.flags.is_empty() && column.flags != ColumnFlags::NOXFER {
                return None;
            }
            column.tag.entry().fixed_width.map(|width| acc + width)
        })
    }
}
