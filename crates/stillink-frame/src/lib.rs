//! Newline framing with bounded carry-over for the stillink rig protocol.
//!
//! The rig writes ASCII lines terminated by `\n` onto a stream socket. Reads
//! return arbitrary chunks, so a line may arrive split across several reads or
//! several lines may arrive in one. [`FrameReader`] keeps the unterminated tail
//! between calls and hands out complete [`RawFrame`]s only.
//!
//! The carry-over buffer is capped by [`FrameConfig::max_line_len`]; a peer
//! that never sends a delimiter gets [`FrameError::LineTooLong`] instead of
//! unbounded memory.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod line_codec;

pub use codec::{decode_line, encode_line, FrameConfig, RawFrame, DEFAULT_MAX_LINE, DELIMITER};
pub use error::{FrameError, Result};
#[cfg(feature = "async")]
pub use line_codec::LineCodec;
pub use reader::{FrameReader, READ_CHUNK_SIZE};
pub use writer::LineWriter;
