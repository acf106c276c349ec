//! High-level [`DaxContainer`] API, the main embedding surface.
//!
//! ```no_run
//! use daxfile::container::{DaxContainer, SaveOptions};
//!
//! let mut dax = DaxContainer::load("8X8D1.DAX")?;
//! for block in dax.blocks() {
//!     println!("{:3} {:6} bytes", block.id, block.len());
//! }
//! dax.replace_block_data(12, vec![0u8; 64])?;
//! dax.save_as("8X8D1.NEW", &SaveOptions::default())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::block::{encode_block, extract_blocks, DaxBlock};
use crate::codec::{CodecId, DecodeStatus};
use crate::error::{DaxError, Result};
use crate::header::{HeaderEntry, HeaderTable};
use crate::resource::ProcessBlocks;

// ── SaveOptions ───────────────────────────────────────────────────────────────

/// Configuration for [`DaxContainer::save_as`].
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Force every block to this codec.  `None` keeps each block's own.
    pub codec: Option<CodecId>,
}

// ── BlockInfo ─────────────────────────────────────────────────────────────────

/// Lightweight descriptor returned by [`DaxContainer::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    pub id:     u8,
    pub codec:  CodecId,
    pub size:   usize,
    pub crc32:  u32,
    pub status: DecodeStatus,
}

impl From<&DaxBlock> for BlockInfo {
    fn from(b: &DaxBlock) -> Self {
        BlockInfo {
            id:     b.id,
            codec:  b.codec,
            size:   b.len(),
            crc32:  b.crc32(),
            status: b.decode_status,
        }
    }
}

// ── DaxContainer ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DaxContainer {
    path:   PathBuf,
    blocks: Vec<DaxBlock>,
}

impl DaxContainer {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// An empty container that [`save`](Self::save) will write to `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_owned(), blocks: Vec::new() }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        Self::from_reader(&mut reader, path)
    }

    /// Parse a container from any seekable source positioned at its start.
    /// `path` is where [`save`](Self::save) writes back to.
    pub fn from_reader<R: Read + Seek, P: AsRef<Path>>(reader: &mut R, path: P) -> Result<Self> {
        let table = HeaderTable::read(&mut *reader)?;
        Self::from_table(reader, &table, path)
    }

    /// Extract blocks for a header table the caller has already parsed.
    pub fn from_table<R: Read + Seek, P: AsRef<Path>>(
        reader: &mut R,
        table: &HeaderTable,
        path: P,
    ) -> Result<Self> {
        let blocks = extract_blocks(reader, table)?;
        debug!(
            path = %path.as_ref().display(),
            entries = table.entries.len(),
            blocks = blocks.len(),
            "loaded container"
        );
        Ok(Self { path: path.as_ref().to_owned(), blocks })
    }

    // ── Read ──────────────────────────────────────────────────────────────────

    pub fn path(&self) -> &Path { &self.path }

    pub fn blocks(&self) -> &[DaxBlock] { &self.blocks }

    pub fn len(&self) -> usize { self.blocks.len() }

    pub fn is_empty(&self) -> bool { self.blocks.is_empty() }

    /// First block with this id.
    pub fn block_by_id(&self, id: u8) -> Option<&DaxBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn block_by_id_mut(&mut self, id: u8) -> Option<&mut DaxBlock> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }

    /// Every block's bytes back to back.  Not a valid container.
    pub fn all_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.blocks.iter().map(DaxBlock::len).sum());
        for b in &self.blocks {
            out.extend_from_slice(&b.data);
        }
        out
    }

    pub fn list(&self) -> Vec<BlockInfo> {
        self.blocks.iter().map(BlockInfo::from).collect()
    }

    /// Blocks whose RLE stream ended early.
    pub fn damaged(&self) -> impl Iterator<Item = &DaxBlock> {
        self.blocks.iter().filter(|b| !b.decode_status.is_complete())
    }

    /// Hand every block to a format-specific interpreter.
    pub fn process<P: ProcessBlocks>(&self, processor: &mut P) -> std::result::Result<(), P::Error> {
        processor.process_blocks(&self.blocks)
    }

    // ── Write ─────────────────────────────────────────────────────────────────

    pub fn push_block(&mut self, block: DaxBlock) {
        self.blocks.push(block);
    }

    /// Replace the bytes of the first block with this id.  The new bytes are
    /// taken as-is; checking they fit the resource is the caller's job.
    pub fn replace_block_data(&mut self, id: u8, data: Vec<u8>) -> Result<()> {
        let block = self.block_by_id_mut(id).ok_or(DaxError::BlockNotFound(id))?;
        block.data = data;
        block.decode_status = DecodeStatus::Complete;
        Ok(())
    }

    /// Serialise the header table and data segment.
    ///
    /// Blocks are laid out back to back in list order, so offsets and sizes
    /// are recomputed from scratch.
    pub fn write_to<W: Write>(&self, mut writer: W, opts: &SaveOptions) -> Result<()> {
        let mut entries: Vec<HeaderEntry> = Vec::with_capacity(self.blocks.len());
        let mut payloads: Vec<Vec<u8>> = Vec::with_capacity(self.blocks.len());
        let mut offset = 0i32;

        for block in &self.blocks {
            let codec = opts.codec.unwrap_or(block.codec);
            let (entry, payload) = encode_block(block, codec, offset)?;
            offset += i32::from(entry.compressed_size);
            entries.push(entry);
            payloads.push(payload);
        }

        HeaderTable { entries, data_start: 0 }.write(&mut writer)?;
        for payload in &payloads {
            writer.write_all(payload)?;
        }
        writer.flush()?;
        debug!(blocks = self.blocks.len(), data_len = offset, "wrote container");
        Ok(())
    }

    /// Write back to the path the container was loaded from, keeping each
    /// block's codec.
    pub fn save(&self) -> Result<()> {
        self.save_as(&self.path, &SaveOptions::default())
    }

    /// The whole container is encoded before `path` is opened, so a block
    /// that fails to encode leaves the existing file untouched.
    pub fn save_as<P: AsRef<Path>>(&self, path: P, opts: &SaveOptions) -> Result<()> {
        let mut buf = Vec::new();
        self.write_to(&mut buf, opts)?;
        let mut file = File::create(path.as_ref())?;
        file.write_all(&buf)?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> DaxContainer {
        let mut dax = DaxContainer::new("sample.dax");
        dax.push_block(DaxBlock::new(1, vec![9; 40]));
        dax.push_block(DaxBlock::stored(2, b"raw bytes".to_vec()));
        dax.push_block(DaxBlock::new(1, vec![1, 2, 3]));
        dax
    }

    fn reparse(dax: &DaxContainer, opts: &SaveOptions) -> (Vec<u8>, DaxContainer) {
        let mut buf = Vec::new();
        dax.write_to(&mut buf, opts).unwrap();
        let back = DaxContainer::from_reader(&mut Cursor::new(buf.clone()), dax.path()).unwrap();
        (buf, back)
    }

    #[test]
    fn lookup_returns_first_duplicate() {
        let dax = sample();
        assert_eq!(dax.block_by_id(1).unwrap().data, vec![9; 40]);
        assert!(dax.block_by_id(200).is_none());
    }

    #[test]
    fn all_bytes_concatenates() {
        let dax = sample();
        let bytes = dax.all_bytes();
        assert_eq!(bytes.len(), 40 + 9 + 3);
        assert_eq!(&bytes[40..49], b"raw bytes");
        assert_eq!(&bytes[49..], [1, 2, 3]);
    }

    #[test]
    fn write_layout() {
        let (buf, _) = reparse(&sample(), &SaveOptions::default());
        // L = 27, then three records.
        assert_eq!(&buf[..2], 27i16.to_le_bytes());
        let table = HeaderTable::read(&buf[..]).unwrap();
        assert_eq!(table.entries, vec![
            HeaderEntry { id: 1, offset: 0,  raw_size: 40, compressed_size: 2 },
            HeaderEntry { id: 2, offset: 2,  raw_size: 0,  compressed_size: 9 },
            HeaderEntry { id: 1, offset: 11, raw_size: 3,  compressed_size: 4 },
        ]);
        assert_eq!(buf.len(), 29 + 15);
    }

    #[test]
    fn save_then_load_preserves_blocks() {
        let dax = sample();
        let (_, back) = reparse(&dax, &SaveOptions::default());
        assert_eq!(back.blocks(), dax.blocks());
    }

    #[test]
    fn forced_codec_applies_to_every_block() {
        let (_, back) = reparse(&sample(), &SaveOptions { codec: Some(CodecId::Stored) });
        assert!(back.blocks().iter().all(|b| b.codec == CodecId::Stored));
        assert_eq!(back.all_bytes(), sample().all_bytes());
    }

    #[test]
    fn replace_then_save() {
        let mut dax = sample();
        dax.replace_block_data(2, vec![0xAA; 300]).unwrap();
        let (_, back) = reparse(&dax, &SaveOptions::default());
        assert_eq!(back.block_by_id(2).unwrap().data, vec![0xAA; 300]);
        assert!(matches!(dax.replace_block_data(77, vec![]), Err(DaxError::BlockNotFound(77))));
    }

    #[test]
    fn damaged_blocks_are_reported() {
        // One truncated RLE entry: claims a 6-byte literal, holds 1 byte.
        let mut file = Vec::new();
        HeaderTable {
            entries: vec![HeaderEntry { id: 7, offset: 0, raw_size: 6, compressed_size: 2 }],
            data_start: 0,
        }.write(&mut file).unwrap();
        file.extend_from_slice(&[0x05, 0x01]);

        let dax = DaxContainer::from_reader(&mut Cursor::new(file), "bad.dax").unwrap();
        let damaged: Vec<u8> = dax.damaged().map(|b| b.id).collect();
        assert_eq!(damaged, vec![7]);
        assert_eq!(dax.list()[0].status, DecodeStatus::Truncated);
        assert_eq!(dax.list()[0].size, 6);
    }

    #[test]
    fn malformed_header_fails_load() {
        let mut file = Cursor::new(vec![0x20, 0x00, 1, 2, 3]);
        assert!(matches!(
            DaxContainer::from_reader(&mut file, "short.dax"),
            Err(DaxError::Header(crate::header::HeaderError::Truncated { declared: 32, available: 3 }))
        ));
    }

    #[test]
    fn from_table_reuses_parsed_header() {
        let (buf, _) = reparse(&sample(), &SaveOptions::default());
        let mut file = Cursor::new(buf);
        let table = HeaderTable::read(&mut file).unwrap();
        assert_eq!(table.entries.len(), 3);

        let dax = DaxContainer::from_table(&mut file, &table, "sample.dax").unwrap();
        assert_eq!(dax.blocks(), sample().blocks());
        assert_eq!(dax.path(), Path::new("sample.dax"));
    }

    #[test]
    fn too_many_blocks() {
        let mut dax = DaxContainer::new("big.dax");
        for i in 0..3641u32 {
            dax.push_block(DaxBlock::stored((i % 256) as u8, Vec::new()));
        }
        assert!(matches!(
            dax.write_to(Vec::new(), &SaveOptions::default()),
            Err(DaxError::Header(crate::header::HeaderError::TooManyBlocks(3641)))
        ));
    }
}
