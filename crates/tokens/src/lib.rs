//! Token source for clone detection.
//!
//! Turns the source text of a code block into a bag of normalized tokens and
//! moves those bags in and out of the two text formats the rest of the
//! workspace speaks.
//!
//! ## What we do
//!
//! - Block tokenization: comment removal, operator splitting, noise deletion
//! - Token bags: token to in-block frequency, with total and distinct counts
//! - The `token:frequency` frame codec used by the forward index
//! - Token-file records (`parent,block,total,unique@#@tok@@::@@freq,...`)
//!
//! ## Invariants worth knowing
//!
//! - Tokens are case-sensitive and never stemmed
//! - `'`, `"`, `\` and `:` never survive into a stored token
//! - Same text + same config = same tokens on any machine

mod bag;
mod config;
mod error;
mod frame;
mod record;
mod tokenizer;

pub use crate::bag::TokenBag;
pub use crate::config::TokenizerConfig;
pub use crate::error::{FrameError, TokenError};
pub use crate::frame::{
    encode_frames, frames, parse_frames, strip_token, FrameRef, Frames, TokenFrame,
    FIELD_SEPARATOR, FRAME_SEPARATOR,
};
pub use crate::record::{parse_block_line, read_block_records, BlockRecord};
pub use crate::tokenizer::tokenize_block;
