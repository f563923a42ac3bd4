//! Record buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented records:
//! - `WaitingForLength`: Need the 4-byte length prefix
//! - `WaitingForBody`: Prefix validated, need N more body bytes
//!
//! The prefix is validated as soon as it arrives, so an oversized or zero
//! length is rejected without waiting for (or buffering) the body it claims.
//!
//! # Example
//!
//! ```
//! use canbus_ipc::CanFrame;
//! use canbus_ipc::protocol::{encode_record, RecordBuffer};
//!
//! let record = encode_record(&CanFrame::new(0x100, &[1, 2, 3]));
//! let mut buffer = RecordBuffer::new();
//!
//! // Data arrives in chunks from the pipe
//! buffer.extend(&record[..5]);
//! assert!(buffer.next_frame().unwrap().is_none());
//!
//! buffer.extend(&record[5..]);
//! let frame = buffer.next_frame().unwrap().unwrap();
//! assert_eq!(frame.id, 0x100);
//! ```

use bytes::{Buf, BytesMut};

use super::wire_format::{decode_body, validate_record_length, LENGTH_PREFIX_SIZE, MAX_RECORD_LEN};
use crate::error::{BusError, Result};
use crate::frame::CanFrame;

/// State machine for record parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the length prefix.
    WaitingForLength,
    /// Prefix parsed, waiting for body bytes.
    WaitingForBody { len: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// A decode error is terminal: the stream is considered corrupted and the
/// caller must drop the connection. The buffer never tries to resynchronise.
#[derive(Debug)]
pub struct RecordBuffer {
    /// Accumulated bytes from pipe reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
}

impl RecordBuffer {
    /// Create a new, empty record buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * MAX_RECORD_LEN),
            state: State::WaitingForLength,
        }
    }

    /// Append raw bytes from the pipe.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract the next frame.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete record was decoded
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a protocol violation
    pub fn next_frame(&mut self) -> Result<Option<CanFrame>> {
        loop {
            match self.state {
                State::WaitingForLength => {
                    if self.buffer.len() < LENGTH_PREFIX_SIZE {
                        return Ok(None);
                    }
                    let len = validate_record_length(self.buffer.get_u32_le())?;
                    self.state = State::WaitingForBody { len };
                }

                State::WaitingForBody { len } => {
                    if self.buffer.len() < len {
                        return Ok(None);
                    }
                    let body = self.buffer.split_to(len).freeze();
                    self.state = State::WaitingForLength;
                    return decode_body(body).map(Some);
                }
            }
        }
    }

    /// Signal end of stream.
    ///
    /// Returns `EndOfStream` if a partial record is still buffered.
    pub fn finish(&self) -> Result<()> {
        match self.state {
            State::WaitingForLength if self.buffer.is_empty() => Ok(()),
            State::WaitingForLength => Err(BusError::EndOfStream {
                expected: LENGTH_PREFIX_SIZE,
                received: self.buffer.len(),
            }),
            State::WaitingForBody { len } => Err(BusError::EndOfStream {
                expected: len,
                received: self.buffer.len(),
            }),
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForLength => "WaitingForLength",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for RecordBuffer {
    fn default() -> Self {
        Self::new()
    }
}
