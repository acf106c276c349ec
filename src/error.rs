use std::io;
use thiserror::Error;

use crate::header::HeaderError;

/// Errors surfaced by container load and save.
///
/// Damaged RLE streams are not in here: a block that decodes short keeps its
/// zero-filled tail and carries a [`DecodeStatus`](crate::codec::DecodeStatus).
#[derive(Error, Debug)]
pub enum DaxError {
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error("Block {id} starts at file offset {position}, before the start of the file")]
    InvalidBlockOffset { id: u8, position: i64 },
    #[error("No block with id {0}")]
    BlockNotFound(u8),
    #[error("Block {id} is {len} bytes; a DAX block holds at most 65535")]
    BlockTooLarge { id: u8, len: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, DaxError>;
