//! Hook for format-specific interpreters built on top of a container.
//!
//! A DAX file's block bytes mean different things depending on the game
//! file (pictures, fonts, monster tables...).  Interpreters for those
//! formats implement [`ProcessBlocks`] and are handed the decoded blocks by
//! [`DaxContainer::process`](crate::container::DaxContainer::process).

use crate::block::DaxBlock;

pub trait ProcessBlocks {
    type Error;

    /// Called once with every block in header-table order.
    fn process_blocks(&mut self, blocks: &[DaxBlock]) -> Result<(), Self::Error>;
}

/// Collects `(id, bytes)` pairs, the plain view most callers want.
#[derive(Debug, Default, Clone)]
pub struct BlockList {
    pub entries: Vec<(u8, Vec<u8>)>,
}

impl ProcessBlocks for BlockList {
    type Error = std::convert::Infallible;

    fn process_blocks(&mut self, blocks: &[DaxBlock]) -> Result<(), Self::Error> {
        self.entries = blocks.iter().map(|b| (b.id, b.data.clone())).collect();
        Ok(())
    }
}
