// Deduplicated string table shared by every table of a pooled container.
use std::collections::HashMap;

use crate::core::cursor::{ByteReader, ByteWriter};
use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StringPool {
    strings: Vec<String>,
    index: HashMap<String, u32>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a `u32` count followed by that many length-prefixed strings.
    ///
    /// Entries keep their file order. If the file repeats a string, lookups by
    /// value resolve to its first occurrence.
    pub fn build(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        let count = reader.read_u32()? as usize;
        // Every entry needs at least its two-byte length.
        let mut pool = Self {
            strings: Vec::with_capacity(count.min(reader.remaining() / 2)),
            index: HashMap::new(),
        };
        for _ in 0..count {
            let value = reader.read_length_prefixed_string()?;
            let next = pool.strings.len() as u32;
            pool.index.entry(value.clone()).or_insert(next);
            pool.strings.push(value);
        }
        Ok(pool)
    }

    pub fn resolve(&self, index: u32) -> Result<&str, Error> {
        self.strings
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidStringIndex).with_message(format!(
                    "string index {index} out of range (pool has {} entries)",
                    self.strings.len()
                ))
            })
    }

    pub fn intern(&mut self, value: &str) -> u32 {
        if let Some(&index) = self.index.get(value) {
            return index;
        }
        let index = self.strings.len() as u32;
        self.strings.push(value.to_owned());
        self.index.insert(value.to_owned(), index);
        index
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }

    pub fn encode(&self, writer: &mut ByteWriter) -> Result<(), Error> {
        let count = u32::try_from(self.strings.len()).map_err(|_| {
            Error::new(ErrorKind::InvalidValue).with_message("string pool exceeds u32 entries")
        })?;
        writer.write_u32(count);
        for value in &self.strings {
            writer.write_length_prefixed_string(value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::StringPool;
    use crate::core::cursor::{ByteReader, ByteWriter};
    use crate::core::error::ErrorKind;

    #[test]
    fn intern_is_idempotent() {
        let mut pool = StringPool::new();
        let a = pool.intern("alpha");
        let b = pool.intern("beta");
        assert_eq!(pool.intern("alpha"), a);
        assert_eq!(pool.intern("beta"), b);
        assert_eq!(pool.len(), 2);
        assert_eq!((a, b), (0, 1));
    }

    #[test]
    fn interning_is_byte_exact() {
        let mut pool = StringPool::new();
        assert_ne!(pool.intern("Name"), pool.intern("name"));
        assert_ne!(pool.intern(""), pool.intern(" "));
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn build_preserves_file_order() {
        let mut pool = StringPool::new();
        pool.intern("zeta");
        pool.intern("alpha");
        let mut writer = ByteWriter::new();
        pool.encode(&mut writer).unwrap();
        let bytes = writer.into_bytes();

        let mut reader = ByteReader::new(&bytes);
        let decoded = StringPool::build(&mut reader).unwrap();
        assert!(reader.is_empty());
        assert_eq!(decoded.iter().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        assert_eq!(decoded, pool);
    }

    #[test]
    fn resolve_rejects_out_of_range() {
        let mut pool = StringPool::new();
        pool.intern("only");
        assert_eq!(pool.resolve(0).unwrap(), "only");
        let err = pool.resolve(1).expect_err("out of range");
        assert_eq!(err.kind(), ErrorKind::InvalidStringIndex);
    }

    #[test]
    fn build_with_huge_count_is_truncated() {
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 1, 0, b'a'];
        let err = StringPool::build(&mut ByteReader::new(&bytes)).expect_err("truncated");
        assert_eq!(err.kind(), ErrorKind::TruncatedInput);
    }
}
