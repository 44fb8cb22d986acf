//! Purpose: Sequential little-endian reader/writer over in-memory byte buffers.
//! Exports: `ByteReader`, `ByteWriter`.
//! Role: Foundation for every binary layout in the crate (container and record stream).
//! Invariants: Byte order is little-endian for every multi-byte field.
//! Invariants: Reads never index past the buffer; a short buffer yields `TruncatedInput`.
//! Invariants: Sized sections are written scratch-then-splice; the writer never seeks back.
use crate::core::error::{Error, ErrorKind};

#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Fails with `TruncatedInput` unless `len` more bytes are available.
    pub fn ensure(&self, len: usize) -> Result<(), Error> {
        if self.remaining() < len {
            return Err(Error::new(ErrorKind::TruncatedInput)
                .with_message(format!(
                    "need {len} bytes, {} remaining",
                    self.remaining()
                ))
                .with_offset(self.pos as u64));
        }
        Ok(())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        self.ensure(len)?;
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        self.read_array().map(u64::from_le_bytes)
    }

    pub fn read_i8(&mut self) -> Result<i8, Error> {
        self.read_array().map(i8::from_le_bytes)
    }

    pub fn read_i16(&mut self) -> Result<i16, Error> {
        self.read_array().map(i16::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        self.read_array().map(i32::from_le_bytes)
    }

    pub fn read_i64(&mut self) -> Result<i64, Error> {
        self.read_array().map(i64::from_le_bytes)
    }

    pub fn read_f32(&mut self) -> Result<f32, Error> {
        self.read_array().map(f32::from_le_bytes)
    }

    pub fn read_f64(&mut self) -> Result<f64, Error> {
        self.read_array().map(f64::from_le_bytes)
    }

    /// Reads UTF-8 bytes up to a NUL terminator and consumes the terminator.
    pub fn read_cstring(&mut self) -> Result<String, Error> {
        let start = self.pos;
        let Some(len) = self.buf[start..].iter().position(|&b| b == 0) else {
            return Err(Error::new(ErrorKind::TruncatedInput)
                .with_message("unterminated string")
                .with_offset(start as u64));
        };
        let bytes = self.read_bytes(len)?;
        self.pos += 1;
        utf8(bytes, start)
    }

    /// Reads a `u16` byte length followed by that many UTF-8 bytes.
    pub fn read_length_prefixed_string(&mut self) -> Result<String, Error> {
        let start = self.pos;
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        utf8(bytes, start)
    }

    /// Reads a `u16` code-unit count followed by that many UTF-16LE units.
    pub fn read_utf16_string(&mut self) -> Result<String, Error> {
        let start = self.pos;
        let units = self.read_u16()? as usize;
        let bytes = self.read_bytes(units * 2)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units).map_err(|err| {
            Error::new(ErrorKind::InvalidUtf8)
                .with_message("invalid UTF-16 string")
                .with_offset(start as u64)
                .with_source(err)
        })
    }
}

fn utf8(bytes: &[u8], offset: usize) -> Result<String, Error> {
    std::str::from_utf8(bytes).map(str::to_owned).map_err(|err| {
        Error::new(ErrorKind::InvalidUtf8)
            .with_message("invalid UTF-8 string")
            .with_offset(offset as u64)
            .with_source(err)
    })
}

#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i8(&mut self, value: i8) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_cstring(&mut self, value: &str) -> Result<(), Error> {
        if value.as_bytes().contains(&0) {
            return Err(Error::new(ErrorKind::InvalidValue)
                .with_message("string contains an interior NUL byte"));
        }
        self.write_bytes(value.as_bytes());
        self.write_u8(0);
        Ok(())
    }

    pub fn write_length_prefixed_string(&mut self, value: &str) -> Result<(), Error> {
        let len = u16_len(value.len(), "string")?;
        self.write_u16(len);
        self.write_bytes(value.as_bytes());
        Ok(())
    }

    pub fn write_utf16_string(&mut self, value: &str) -> Result<(), Error> {
        let units: Vec<u16> = value.encode_utf16().collect();
        let len = u16_len(units.len(), "wide string")?;
        self.write_u16(len);
        for unit in units {
            self.write_u16(unit);
        }
        Ok(())
    }

    /// Writes a `u16` size field followed by the section produced by `body`.
    ///
    /// The body is built in a scratch writer first; the stored size is the
    /// body length plus `bias`.
    pub fn write_sized_u16<F>(&mut self, bias: u16, body: F) -> Result<(), Error>
    where
        F: FnOnce(&mut ByteWriter) -> Result<(), Error>,
    {
        let mut scratch = ByteWriter::new();
        body(&mut scratch)?;
        let size = scratch
            .buf
            .len()
            .checked_add(bias as usize)
            .and_then(|size| u16::try_from(size).ok())
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidValue).with_message(format!(
                    "section of {} bytes exceeds the u16 size field",
                    scratch.buf.len()
                ))
            })?;
        self.write_u16(size);
        self.write_bytes(&scratch.buf);
        Ok(())
    }
}

fn u16_len(len: usize, what: &str) -> Result<u16, Error> {
    u16::try_from(len).map_err(|_| {
        Error::new(ErrorKind::InvalidValue)
            .with_message(format!("{what} of length {len} exceeds {}", u16::MAX))
    })
}
