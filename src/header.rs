//! Header table: the block directory at the start of every DAX file.
//!
//! ```text
//! offset  size  field
//! 0       2     L, header table length in bytes (i16 LE)
//! 2       L     L / 9 records:
//!                 id               u8
//!                 offset           i32 LE  (relative to the data segment)
//!                 raw_size         u16 LE  (0 = stored)
//!                 compressed_size  u16 LE
//! 2 + L   ...   data segment
//! ```
//!
//! Trailing bytes when `L` is not a multiple of 9 are ignored.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use thiserror::Error;
use tracing::{debug, warn};

/// Size of one header record on disk.
pub const HEADER_ENTRY_SIZE: usize = 9;
/// Size of the table-length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 2;
/// Most records a table can declare while `L` still fits an `i16`.
pub const MAX_ENTRIES: usize = i16::MAX as usize / HEADER_ENTRY_SIZE;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Malformed header: table declares {declared} bytes but only {available} are present")]
    Truncated { declared: usize, available: usize },
    #[error("Too many blocks for one header table: {0} (max 3640)")]
    TooManyBlocks(usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// One directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderEntry {
    pub id:              u8,
    /// Offset from the start of the data segment, not the file.
    pub offset:          i32,
    pub raw_size:        u16,
    pub compressed_size: u16,
}

impl HeaderEntry {
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u8(self.id)?;
        writer.write_i32::<LittleEndian>(self.offset)?;
        writer.write_u16::<LittleEndian>(self.raw_size)?;
        writer.write_u16::<LittleEndian>(self.compressed_size)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            id:              reader.read_u8()?,
            offset:          reader.read_i32::<LittleEndian>()?,
            raw_size:        reader.read_u16::<LittleEndian>()?,
            compressed_size: reader.read_u16::<LittleEndian>()?,
        })
    }

    pub fn is_compressed(&self) -> bool {
        self.raw_size != 0
    }
}

/// The parsed directory plus where the data segment begins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderTable {
    pub entries:    Vec<HeaderEntry>,
    /// Absolute file offset of the data segment (`L + 2`).
    pub data_start: i64,
}

impl HeaderTable {
    /// Parse the table from the start of a file.
    pub fn read<R: Read>(mut reader: R) -> Result<Self, HeaderError> {
        let mut prefix = Vec::with_capacity(LENGTH_PREFIX_SIZE);
        reader.by_ref().take(LENGTH_PREFIX_SIZE as u64).read_to_end(&mut prefix)?;
        if prefix.len() < LENGTH_PREFIX_SIZE {
            return Err(HeaderError::Truncated { declared: LENGTH_PREFIX_SIZE, available: prefix.len() });
        }
        let declared = LittleEndian::read_i16(&prefix);
        let data_start = i64::from(declared) + LENGTH_PREFIX_SIZE as i64;

        if declared < 0 {
            warn!(declared, "negative header table length, container has no blocks");
            return Ok(Self { entries: Vec::new(), data_start });
        }

        let table_len = declared as usize;
        let mut table = Vec::with_capacity(table_len);
        reader.by_ref().take(table_len as u64).read_to_end(&mut table)?;
        if table.len() < table_len {
            return Err(HeaderError::Truncated { declared: table_len, available: table.len() });
        }

        let count = table_len / HEADER_ENTRY_SIZE;
        debug!(table_len, count, "header table");
        let entries = table
            .chunks_exact(HEADER_ENTRY_SIZE)
            .map(HeaderEntry::read)
            .collect::<io::Result<Vec<_>>>()?;

        Ok(Self { entries, data_start })
    }

    /// Write `L` followed by every record.  Inverse of [`HeaderTable::read`].
    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), HeaderError> {
        let declared = Self::table_len(self.entries.len())?;
        writer.write_i16::<LittleEndian>(declared)?;
        for entry in &self.entries {
            entry.write(&mut writer)?;
        }
        Ok(())
    }

    /// `L` for a table of `count` records.
    pub fn table_len(count: usize) -> Result<i16, HeaderError> {
        if count > MAX_ENTRIES {
            return Err(HeaderError::TooManyBlocks(count));
        }
        Ok((count * HEADER_ENTRY_SIZE) as i16)
    }
}
