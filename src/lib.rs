pub mod header;
pub mod codec;
pub mod block;
pub mod container;
pub mod resource;
pub mod error;

pub use header::{HeaderEntry, HeaderTable, HeaderError};
pub use codec::{CodecId, DecodeStatus, decode, decode_into, encode};
pub use block::DaxBlock;
pub use container::{DaxContainer, SaveOptions, BlockInfo};
pub use resource::ProcessBlocks;
pub use error::DaxError;
