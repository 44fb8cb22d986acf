//! Purpose: Centralize container signature/versioning and binary format selection.
//! Exports: `MAGIC`, `SUPPORTED_VERSIONS`, `StringLayout`, `BinaryFormat`, `decode`, `encode`.
//! Role: Shared policy for gating container compatibility and dispatching between layouts.
//! Invariants: Version list is additive; each version fixes one string layout.
//! Invariants: Detection only looks at the magic; it never guesses from table content.
use std::fmt;
use std::str::FromStr;

use crate::core::codec;
use crate::core::error::{Error, ErrorKind};
use crate::core::kingsisle;
use crate::core::table::TableSet;

pub const MAGIC: [u8; 4] = *b"DDB1";
pub const VERSION_INLINE: u16 = 1;
pub const VERSION_POOLED: u16 = 2;
pub const SUPPORTED_VERSIONS: &[u16] = &[VERSION_INLINE, VERSION_POOLED];

/// Where string values are stored in a container.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum StringLayout {
    /// Each string is written in place, length-prefixed.
    #[default]
    Inline,
    /// Strings live in one pool after the header; values are `u32` indices.
    Pooled,
}

impl StringLayout {
    pub fn version(self) -> u16 {
        match self {
            StringLayout::Inline => VERSION_INLINE,
            StringLayout::Pooled => VERSION_POOLED,
        }
    }

    pub fn from_version(version: u16) -> Result<Self, Error> {
        match version {
            VERSION_INLINE => Ok(StringLayout::Inline),
            VERSION_POOLED => Ok(StringLayout::Pooled),
            other => Err(version_error(other)),
        }
    }
}

pub fn version_error(detected: u16) -> Error {
    let supported = SUPPORTED_VERSIONS
        .iter()
        .map(|version| version.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Error::new(ErrorKind::UnsupportedVersion)
        .with_message(format!(
            "unsupported container version {detected} (supported: {supported})"
        ))
        .with_hint("The file may come from a newer format revision; upgrade ddbconv.")
}

/// Binary layouts the crate reads and writes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BinaryFormat {
    /// Header-less record stream written by the game client.
    KingsIsle,
    /// `DDB1` container with the given string layout.
    Container(StringLayout),
}

impl BinaryFormat {
    pub const ALL: [BinaryFormat; 3] = [
        BinaryFormat::KingsIsle,
        BinaryFormat::Container(StringLayout::Inline),
        BinaryFormat::Container(StringLayout::Pooled),
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BinaryFormat::KingsIsle => "kingsisle",
            BinaryFormat::Container(StringLayout::Inline) => "ddb-inline",
            BinaryFormat::Container(StringLayout::Pooled) => "ddb-pooled",
        }
    }

    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(&MAGIC) {
            // The layout comes from the version field once the header is parsed.
            BinaryFormat::Container(StringLayout::Inline)
        } else {
            BinaryFormat::KingsIsle
        }
    }
}

impl fmt::Display for BinaryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BinaryFormat {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == value)
            .ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("unknown binary format {value:?}"))
                    .with_hint("Use one of: kingsisle, ddb-inline, ddb-pooled.")
            })
    }
}

/// Decodes either binary layout, reporting which one the bytes used.
pub fn decode(bytes: &[u8]) -> Result<(BinaryFormat, TableSet), Error> {
    match BinaryFormat::detect(bytes) {
        BinaryFormat::KingsIsle => {
            kingsisle::deserialize(bytes).map(|tables| (BinaryFormat::KingsIsle, tables))
        }
        BinaryFormat::Container(_) => {
            let tables = codec::deserialize(bytes)?;
            Ok((BinaryFormat::Container(tables.layout()), tables))
        }
    }
}

/// Encodes `tables` in `format`; a container format overrides the set's own layout.
pub fn encode(format: BinaryFormat, tables: &TableSet) -> Result<Vec<u8>, Error> {
    match format {
        BinaryFormat::KingsIsle => kingsisle::serialize(tables),
        BinaryFormat::Container(layout) if layout == tables.layout() => codec::serialize(tables),
        BinaryFormat::Container(layout) => {
            let mut relaid = tables.clone();
            relaid.set_layout(layout);
            codec::serialize(&relaid)
        }
    }
}
