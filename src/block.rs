//! Blocks: extraction from the data segment and re-encoding for save.

use std::io::{Read, Seek, SeekFrom};
use tracing::{debug, trace, warn};

use crate::codec::{decode_into, get_codec, CodecId, DecodeStatus};
use crate::error::{DaxError, Result};
use crate::header::{HeaderEntry, HeaderTable};

/// One logical chunk of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaxBlock {
    pub id:            u8,
    /// Decoded bytes.
    pub data:          Vec<u8>,
    /// How the block was stored, and how it is written back on save.
    pub codec:         CodecId,
    pub decode_status: DecodeStatus,
}

impl DaxBlock {
    /// A new RLE-compressed block.
    pub fn new(id: u8, data: Vec<u8>) -> Self {
        Self::with_codec(id, data, CodecId::Rle)
    }

    pub fn stored(id: u8, data: Vec<u8>) -> Self {
        Self::with_codec(id, data, CodecId::Stored)
    }

    pub fn with_codec(id: u8, data: Vec<u8>, codec: CodecId) -> Self {
        Self { id, data, codec, decode_status: DecodeStatus::Complete }
    }

    pub fn len(&self) -> usize { self.data.len() }
    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    pub fn crc32(&self) -> u32 {
        crc32fast::hash(&self.data)
    }
}

// ── Extraction ───────────────────────────────────────────────────────────────

/// An entry's on-disk bytes, before decoding.
#[derive(Debug, Clone)]
pub struct RawBlock {
    pub entry:   HeaderEntry,
    /// Up to `compressed_size` bytes; shorter if the file ends first.
    pub payload: Vec<u8>,
}

/// Read every entry's payload, in table order.
pub fn read_raw_blocks<R: Read + Seek>(reader: &mut R, table: &HeaderTable) -> Result<Vec<RawBlock>> {
    let mut raws = Vec::with_capacity(table.entries.len());
    for &entry in &table.entries {
        let position = table.data_start + i64::from(entry.offset);
        if position < 0 {
            return Err(DaxError::InvalidBlockOffset { id: entry.id, position });
        }
        reader.seek(SeekFrom::Start(position as u64))?;

        let wanted = usize::from(entry.compressed_size);
        let mut payload = Vec::new();
        reader.by_ref().take(wanted as u64).read_to_end(&mut payload)?;
        if payload.len() < wanted {
            debug!(id = entry.id, wanted, got = payload.len(), "short read at end of file");
        }
        raws.push(RawBlock { entry, payload });
    }
    Ok(raws)
}

/// Turn one raw entry into a block.
///
/// Returns `None` for a compressed entry with no bytes on disk; real files
/// use those as placeholders.
pub fn decode_block(raw: &RawBlock) -> Option<DaxBlock> {
    let entry = &raw.entry;
    if !entry.is_compressed() {
        return Some(DaxBlock::stored(entry.id, raw.payload.clone()));
    }
    if raw.payload.is_empty() {
        debug!(id = entry.id, raw_size = entry.raw_size, "skipping empty compressed entry");
        return None;
    }

    let mut data = vec![0u8; usize::from(entry.raw_size)];
    let report = decode_into(&raw.payload, usize::from(entry.compressed_size), &mut data);
    if report.status.is_complete() {
        trace!(id = entry.id, consumed = report.consumed, written = report.written, "decoded");
    } else {
        warn!(
            id = entry.id,
            status = ?report.status,
            written = report.written,
            raw_size = entry.raw_size,
            "block decode stopped early, tail left zeroed"
        );
    }
    Some(DaxBlock {
        id:            entry.id,
        data,
        codec:         CodecId::from_raw_size(entry.raw_size),
        decode_status: report.status,
    })
}

/// Decode every raw entry, keeping table order and dropping skipped ones.
pub fn decode_blocks(raws: &[RawBlock]) -> Vec<DaxBlock> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        raws.par_iter().filter_map(decode_block).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        raws.iter().filter_map(decode_block).collect()
    }
}

/// Read and decode every block the table describes.
pub fn extract_blocks<R: Read + Seek>(reader: &mut R, table: &HeaderTable) -> Result<Vec<DaxBlock>> {
    let raws = read_raw_blocks(reader, table)?;
    Ok(decode_blocks(&raws))
}

// ── Encoding ─────────────────────────────────────────────────────────────────

/// Produce the header entry and on-disk payload for `block`, placed at
/// `offset` within the data segment.
///
/// An RLE block is written stored when it is empty (a zero `raw_size` means
/// stored) or when its encoding would not fit the 16-bit size field.
pub fn encode_block(block: &DaxBlock, codec: CodecId, offset: i32) -> Result<(HeaderEntry, Vec<u8>)> {
    let raw_size = u16::try_from(block.len())
        .map_err(|_| DaxError::BlockTooLarge { id: block.id, len: block.len() })?;

    let mut codec = codec;
    let mut payload = get_codec(codec).compress(&block.data);
    if codec == CodecId::Rle && (block.is_empty() || payload.len() > usize::from(u16::MAX)) {
        if !block.is_empty() {
            warn!(id = block.id, encoded = payload.len(), "RLE output too large, storing block raw");
        }
        codec = CodecId::Stored;
        payload = block.data.clone();
    }

    let entry = HeaderEntry {
        id:              block.id,
        offset,
        raw_size:        if codec == CodecId::Rle { raw_size } else { 0 },
        compressed_size: payload.len() as u16,
    };
    Ok((entry, payload))
}
