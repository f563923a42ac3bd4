//! Protocol module - wire format and record framing.
//!
//! This module implements the binary protocol shared by both roles:
//! - Length-prefixed record encoding/decoding
//! - Record buffer for accumulating partial reads

mod record_buffer;
mod wire_format;

pub use record_buffer::RecordBuffer;
pub use wire_format::{
    decode_body, decode_record, encode_record, from_ticks, to_ticks, validate_record_length,
    LENGTH_PREFIX_SIZE, MAX_ENCODED_RECORD_SIZE, MAX_RECORD_LEN, MAX_TICKS, RECORD_HEADER_SIZE,
    TICKS_PER_SECOND, UNIX_EPOCH_TICKS,
};
