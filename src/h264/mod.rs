//! H.264 Annex-B bitstream handling
//!
//! Splits the encoder's byte stream into NAL units and classifies them:
//! - `nal`: unit types and keyframe significance
//! - `parser`: start code scanning, one-shot and streaming
//! - `reader`: NAL-at-a-time reading from a capture process

mod nal;
mod parser;
mod reader;

pub use nal::{NalUnit, NalUnitType};
pub use parser::{contains_idr, split_annex_b, NalParser, MAX_NAL_BUFFER_SIZE};
pub use reader::{H264Reader, READ_CHUNK_SIZE};
