//! Purpose: Closed value model plus the static type registry (tag -> codec routines).
//! Exports: `TypeTag`, `Value`, `TypeEntry`, `StringSource`, `StringSink`, `decode_cell`, `encode_cell`.
//! Role: Single place that knows how each primitive is laid out in bytes and in text.
//! Invariants: Tags 1-10 follow the KingsIsle numbering; 11-13 are container-only.
//! Invariants: Adding a type means adding one `REGISTRY` entry; call sites stay unchanged.
//! Invariants: The registry is immutable static data and safe to share across threads.
use std::fmt;

use crate::core::cursor::{ByteReader, ByteWriter};
use crate::core::error::{Error, ErrorKind};
use crate::core::pool::StringPool;
use crate::core::schema::{Column, ColumnFlags};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Gid = 1,
    Int = 2,
    UInt = 3,
    Flt = 4,
    Byt = 5,
    UByt = 6,
    UShrt = 7,
    Dbl = 8,
    Str = 9,
    WStr = 10,
    Bool = 11,
    Short = 12,
    Long = 13,
}

impl TypeTag {
    pub const ALL: [TypeTag; 13] = [
        TypeTag::Gid,
        TypeTag::Int,
        TypeTag::UInt,
        TypeTag::Flt,
        TypeTag::Byt,
        TypeTag::UByt,
        TypeTag::UShrt,
        TypeTag::Dbl,
        TypeTag::Str,
        TypeTag::WStr,
        TypeTag::Bool,
        TypeTag::Short,
        TypeTag::Long,
    ];

    pub fn from_u8(raw: u8) -> Result<Self, Error> {
        match raw {
            1..=13 => Ok(Self::ALL[raw as usize - 1]),
            _ => Err(Error::new(ErrorKind::UnknownType)
                .with_message(format!("unknown type tag {raw:#04x}"))
                .with_hint("The file may come from a newer format revision.")),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn entry(self) -> &'static TypeEntry {
        &REGISTRY[self as usize - 1]
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.name() == name)
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            TypeTag::Gid
                | TypeTag::Int
                | TypeTag::UInt
                | TypeTag::Byt
                | TypeTag::UByt
                | TypeTag::UShrt
                | TypeTag::Short
                | TypeTag::Long
        )
    }

    /// True for the tags the KingsIsle record stream can carry.
    pub fn is_native(self) -> bool {
        self.as_u8() <= TypeTag::WStr.as_u8()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Gid(u64),
    Int(i32),
    UInt(u32),
    Flt(f32),
    Byt(i8),
    UByt(u8),
    UShrt(u16),
    Dbl(f64),
    Str(String),
    WStr(String),
    Bool(bool),
    Short(i16),
    Long(i64),
    List(Vec<Value>),
    /// Absent value of an optional column.
    Null,
}

impl Value {
    /// Scalar tag, or `None` for `List` and `Null`.
    pub fn tag(&self) -> Option<TypeTag> {
        let tag = match self {
            Value::Gid(_) => TypeTag::Gid,
            Value::Int(_) => TypeTag::Int,
            Value::UInt(_) => TypeTag::UInt,
            Value::Flt(_) => TypeTag::Flt,
            Value::Byt(_) => TypeTag::Byt,
            Value::UByt(_) => TypeTag::UByt,
            Value::UShrt(_) => TypeTag::UShrt,
            Value::Dbl(_) => TypeTag::Dbl,
            Value::Str(_) => TypeTag::Str,
            Value::WStr(_) => TypeTag::WStr,
            Value::Bool(_) => TypeTag::Bool,
            Value::Short(_) => TypeTag::Short,
            Value::Long(_) => TypeTag::Long,
            Value::List(_) | Value::Null => return None,
        };
        Some(tag)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::List(_) => "LIST",
            Value::Null => "NULL",
            scalar => scalar.tag().map_or("NULL", TypeTag::name),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) | Value::WStr(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Gid(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Flt(v) => write!(f, "{v}"),
            Value::Byt(v) => write!(f, "{v}"),
            Value::UByt(v) => write!(f, "{v}"),
            Value::UShrt(v) => write!(f, "{v}"),
            Value::Dbl(v) => write!(f, "{v}"),
            Value::Str(v) | Value::WStr(v) => f.write_str(v),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Null => Ok(()),
        }
    }
}

/// Where string values live while decoding.
#[derive(Clone, Copy, Debug)]
pub enum StringSource<'a> {
    Inline,
    Pooled(&'a StringPool),
}

/// Where string values go while encoding.
#[derive(Debug)]
pub enum StringSink<'a> {
    Inline,
    Pooled(&'a mut StringPool),
}

pub type DecodeFn = fn(&mut ByteReader<'_>, StringSource<'_>) -> Result<Value, Error>;
pub type EncodeFn = fn(&Value, &mut ByteWriter, &mut StringSink<'_>) -> Result<(), Error>;
pub type ParseFn = fn(&str) -> Result<Value, Error>;

pub struct TypeEntry {
    pub tag: TypeTag,
    pub name: &'static str,
    /// Encoded width in bytes, `None` for variable-width strings.
    pub fixed_width: Option<usize>,
    pub decode: DecodeFn,
    pub encode: EncodeFn,
    pub parse_text: ParseFn,
    pub default: fn() -> Value,
}

impl fmt::Debug for TypeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeEntry")
            .field("tag", &self.tag)
            .field("name", &self.name)
            .field("fixed_width", &self.fixed_width)
            .finish_non_exhaustive()
    }
}

macro_rules! numeric_codec {
    ($variant:ident, $ty:ty, $read:ident, $write:ident, $decode:ident, $encode:ident, $parse:ident) => {
        fn $decode(reader: &mut ByteReader<'_>, _: StringSource<'_>) -> Result<Value, Error> {
            Ok(Value::$variant(reader.$read()?))
        }

        fn $encode(
            value: &Value,
            writer: &mut ByteWriter,
            _: &mut StringSink<'_>,
        ) -> Result<(), Error> {
            match value {
                Value::$variant(v) => {
                    writer.$write(*v);
                    Ok(())
                }
                other => Err(mismatch(TypeTag::$variant, other)),
            }
        }

        fn $parse(text: &str) -> Result<Value, Error> {
            text.trim()
                .parse::<$ty>()
                .map(Value::$variant)
                .map_err(|err| invalid_text(TypeTag::$variant, text).with_source(err))
        }
    };
}

numeric_codec!(Gid, u64, read_u64, write_u64, decode_gid, encode_gid, parse_gid);
numeric_codec!(Int, i32, read_i32, write_i32, decode_int, encode_int, parse_int);
numeric_codec!(UInt, u32, read_u32, write_u32, decode_uint, encode_uint, parse_uint);
numeric_codec!(Flt, f32, read_f32, write_f32, decode_flt, encode_flt, parse_flt);
numeric_codec!(Byt, i8, read_i8, write_i8, decode_byt, encode_byt, parse_byt);
numeric_codec!(UByt, u8, read_u8, write_u8, decode_ubyt, encode_ubyt, parse_ubyt);
numeric_codec!(UShrt, u16, read_u16, write_u16, decode_ushrt, encode_ushrt, parse_ushrt);
numeric_codec!(Dbl, f64, read_f64, write_f64, decode_dbl, encode_dbl, parse_dbl);
numeric_codec!(Short, i16, read_i16, write_i16, decode_short, encode_short, parse_short);
numeric_codec!(Long, i64, read_i64, write_i64, decode_long, encode_long, parse_long);

fn decode_pooled(reader: &mut ByteReader<'_>, pool: &StringPool) -> Result<String, Error> {
    let offset = reader.position();
    let index = reader.read_u32()?;
    pool.resolve(index)
        .map(str::to_owned)
        .map_err(|err| err.with_offset(offset as u64))
}

fn decode_str(reader: &mut ByteReader<'_>, strings: StringSource<'_>) -> Result<Value, Error> {
    match strings {
        StringSource::Inline => reader.read_length_prefixed_string().map(Value::Str),
        StringSource::Pooled(pool) => decode_pooled(reader, pool).map(Value::Str),
    }
}

fn decode_wstr(reader: &mut ByteReader<'_>, strings: StringSource<'_>) -> Result<Value, Error> {
    match strings {
        StringSource::Inline => reader.read_utf16_string().map(Value::WStr),
        StringSource::Pooled(pool) => decode_pooled(reader, pool).map(Value::WStr),
    }
}

fn encode_str(value: &Value, writer: &mut ByteWriter, strings: &mut StringSink<'_>) -> Result<(), Error> {
    let Value::Str(text) = value else {
        return Err(mismatch(TypeTag::Str, value));
    };
    match strings {
        StringSink::Inline => writer.write_length_prefixed_string(text),
        StringSink::Pooled(pool) => {
            writer.write_u32(pool.intern(text));
            Ok(())
        }
    }
}

fn encode_wstr(value: &Value, writer: &mut ByteWriter, strings: &mut StringSink<'_>) -> Result<(), Error> {
    let Value::WStr(text) = value else {
        return Err(mismatch(TypeTag::WStr, value));
    };
    match strings {
        StringSink::Inline => writer.write_utf16_string(text),
        StringSink::Pooled(pool) => {
            writer.write_u32(pool.intern(text));
            Ok(())
        }
    }
}

fn parse_str(text: &str) -> Result<Value, Error> {
    Ok(Value::Str(text.to_owned()))
}

fn parse_wstr(text: &str) -> Result<Value, Error> {
    Ok(Value::WStr(text.to_owned()))
}

fn decode_bool(reader: &mut ByteReader<'_>, _: StringSource<'_>) -> Result<Value, Error> {
    let offset = reader.position();
    match reader.read_u8()? {
        0 => Ok(Value::Bool(false)),
        1 => Ok(Value::Bool(true)),
        other => Err(Error::new(ErrorKind::InvalidValue)
            .with_message(format!("boolean byte {other:#04x} is neither 0 nor 1"))
            .with_offset(offset as u64)),
    }
}

fn encode_bool(value: &Value, writer: &mut ByteWriter, _: &mut StringSink<'_>) -> Result<(), Error> {
    match value {
        Value::Bool(v) => {
            writer.write_u8(u8::from(*v));
            Ok(())
        }
        other => Err(mismatch(TypeTag::Bool, other)),
    }
}

fn parse_bool(text: &str) -> Result<Value, Error> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(Value::Bool(true)),
        "false" | "0" => Ok(Value::Bool(false)),
        _ => Err(invalid_text(TypeTag::Bool, text)),
    }
}

static REGISTRY: [TypeEntry; 13] = [
    TypeEntry {
        tag: TypeTag::Gid,
        name: "GID",
        fixed_width: Some(8),
        decode: decode_gid,
        encode: encode_gid,
        parse_text: parse_gid,
        default: || Value::Gid(0),
    },
    TypeEntry {
        tag: TypeTag::Int,
        name: "INT",
        fixed_width: Some(4),
        decode: decode_int,
        encode: encode_int,
        parse_text: parse_int,
        default: || Value::Int(0),
    },
    TypeEntry {
        tag: TypeTag::UInt,
        name: "UINT",
        fixed_width: Some(4),
        decode: decode_uint,
        encode: encode_uint,
        parse_text: parse_uint,
        default: || Value::UInt(0),
    },
    TypeEntry {
        tag: TypeTag::Flt,
        name: "FLT",
        fixed_width: Some(4),
        decode: decode_flt,
        encode: encode_flt,
        parse_text: parse_flt,
        default: || Value::Flt(0.0),
    },
    TypeEntry {
        tag: TypeTag::Byt,
        name: "BYT",
        fixed_width: Some(1),
        decode: decode_byt,
        encode: encode_byt,
        parse_text: parse_byt,
        default: || Value::Byt(0),
    },
    TypeEntry {
        tag: TypeTag::UByt,
        name: "UBYT",
        fixed_width: Some(1),
        decode: decode_ubyt,
        encode: encode_ubyt,
        parse_text: parse_ubyt,
        default: || Value::UByt(0),
    },
    TypeEntry {
        tag: TypeTag::UShrt,
        name: "USHRT",
        fixed_width: Some(2),
        decode: decode_ushrt,
        encode: encode_ushrt,
        parse_text: parse_ushrt,
        default: || Value::UShrt(0),
    },
    TypeEntry {
        tag: TypeTag::Dbl,
        name: "DBL",
        fixed_width: Some(8),
        decode: decode_dbl,
        encode: encode_dbl,
        parse_text: parse_dbl,
        default: || Value::Dbl(0.0),
    },
    TypeEntry {
        tag: TypeTag::Str,
        name: "STR",
        fixed_width: None,
        decode: decode_str,
        encode: encode_str,
        parse_text: parse_str,
        default: || Value::Str(String::new()),
    },
    TypeEntry {
        tag: TypeTag::WStr,
        name: "WSTR",
        fixed_width: None,
        decode: decode_wstr,
        encode: encode_wstr,
        parse_text: parse_wstr,
        default: || Value::WStr(String::new()),
    },
    TypeEntry {
        tag: TypeTag::Bool,
        name: "BOOL",
        fixed_width: Some(1),
        decode: decode_bool,
        encode: encode_bool,
        parse_text: parse_bool,
        default: || Value::Bool(false),
    },
    TypeEntry {
        tag: TypeTag::Short,
        name: "SHRT",
        fixed_width: Some(2),
        decode: decode_short,
        encode: encode_short,
        parse_text: parse_short,
        default: || Value::Short(0),
    },
    TypeEntry {
        tag: TypeTag::Long,
        name: "LONG",
        fixed_width: Some(8),
        decode: decode_long,
        encode: encode_long,
        parse_text: parse_long,
        default: || Value::Long(0),
    },
];

/// Decodes one column value, applying the presence, array, and delta modifiers.
///
/// `running` is the column's delta accumulator; it only moves for present values
/// of `DELTA` columns.
pub fn decode_cell(
    column: &Column,
    reader: &mut ByteReader<'_>,
    strings: StringSource<'_>,
    running: &mut u64,
) -> Result<Value, Error> {
    let flags = column.flags();
    if flags.contains(ColumnFlags::OPTIONAL) && !read_presence(reader)? {
        return Ok(Value::Null);
    }

    let entry = column.tag().entry();
    if flags.contains(ColumnFlags::ARRAY) {
        let count = reader.read_u32()? as usize;
        let min_width = entry.fixed_width.unwrap_or(2);
        let mut items = Vec::with_capacity(count.min(reader.remaining() / min_width));
        for _ in 0..count {
            items.push((entry.decode)(reader, strings)?);
        }
        return Ok(Value::List(items));
    }

    let stored = (entry.decode)(reader, strings)?;
    if !flags.contains(ColumnFlags::DELTA) {
        return Ok(stored);
    }
    let value = from_int_bits(column.tag(), running.wrapping_add(int_bits(&stored)?))?;
    *running = int_bits(&value)?;
    Ok(value)
}

/// Encodes one column value; the inverse of [`decode_cell`].
pub fn encode_cell(
    column: &Column,
    value: &Value,
    writer: &mut ByteWriter,
    strings: &mut StringSink<'_>,
    running: &mut u64,
) -> Result<(), Error> {
    let flags = column.flags();
    if flags.contains(ColumnFlags::OPTIONAL) {
        if value.is_null() {
            writer.write_u8(0);
            return Ok(());
        }
        writer.write_u8(1);
    }

    let entry = column.tag().entry();
    if flags.contains(ColumnFlags::ARRAY) {
        let Value::List(items) = value else {
            return Err(column_mismatch(column, value));
        };
        let count = u32::try_from(items.len()).map_err(|_| {
            Error::new(ErrorKind::InvalidValue).with_message("array exceeds u32 elements")
        })?;
        writer.write_u32(count);
        for item in items {
            (entry.encode)(item, writer, strings)?;
        }
        return Ok(());
    }

    if value.tag() != Some(column.tag()) {
        return Err(column_mismatch(column, value));
    }
    if !flags.contains(ColumnFlags::DELTA) {
        return (entry.encode)(value, writer, strings);
    }
    let bits = int_bits(value)?;
    let stored = from_int_bits(column.tag(), bits.wrapping_sub(*running))?;
    *running = bits;
    (entry.encode)(&stored, writer, strings)
}

fn read_presence(reader: &mut ByteReader<'_>) -> Result<bool, Error> {
    let offset = reader.position();
    match reader.read_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(Error::new(ErrorKind::InvalidValue)
            .with_message(format!("presence flag {other:#04x} is neither 0 nor 1"))
            .with_offset(offset as u64)),
    }
}

// Integers travel through the delta accumulator sign-extended to 64 bits.
fn int_bits(value: &Value) -> Result<u64, Error> {
    let bits = match *value {
        Value::Gid(v) => v,
        Value::Int(v) => v as i64 as u64,
        Value::UInt(v) => v as u64,
        Value::Byt(v) => v as i64 as u64,
        Value::UByt(v) => v as u64,
        Value::UShrt(v) => v as u64,
        Value::Short(v) => v as i64 as u64,
        Value::Long(v) => v as u64,
        _ => {
            return Err(Error::new(ErrorKind::Internal)
                .with_message(format!("delta coding applied to {}", value.kind_name())));
        }
    };
    Ok(bits)
}

fn from_int_bits(tag: TypeTag, bits: u64) -> Result<Value, Error> {
    let value = match tag {
        TypeTag::Gid => Value::Gid(bits),
        TypeTag::Int => Value::Int(bits as u32 as i32),
        TypeTag::UInt => Value::UInt(bits as u32),
        TypeTag::Byt => Value::Byt(bits as u8 as i8),
        TypeTag::UByt => Value::UByt(bits as u8),
        TypeTag::UShrt => Value::UShrt(bits as u16),
        TypeTag::Short => Value::Short(bits as u16 as i16),
        TypeTag::Long => Value::Long(bits as i64),
        _ => {
            return Err(Error::new(ErrorKind::Internal)
                .with_message(format!("delta coding applied to {tag}")));
        }
    };
    Ok(value)
}

fn mismatch(expected: TypeTag, found: &Value) -> Error {
    Error::new(ErrorKind::TypeMismatch)
        .with_message(format!("expected {expected}, found {}", found.kind_name()))
}

fn column_mismatch(column: &Column, found: &Value) -> Error {
    Error::new(ErrorKind::TypeMismatch)
        .with_message(format!(
            "column declared as {}, found {}",
            column.describe(),
            found.kind_name()
        ))
        .with_column(column.name())
}

fn invalid_text(tag: TypeTag, text: &str) -> Error {
    Error::new(ErrorKind::InvalidValue).with_message(format!("{text:?} is not a valid {tag}"))
}
