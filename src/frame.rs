//! CAN frame model.
//!
//! A [`CanFrame`] is the unit of exchange on the bus: identifier, data length
//! code, payload and timestamp. Payloads use `bytes::Bytes` so fanning one
//! frame out to many subscribers never copies the data.
//!
//! # Example
//!
//! ```
//! use canbus_ipc::CanFrame;
//!
//! let frame = CanFrame::new(0x123, &[0xDE, 0xAD]);
//! assert_eq!(frame.dlc, 2);
//! assert_eq!(frame.data(), &[0xDE, 0xAD]);
//! ```

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};

/// Maximum data length for classic CAN.
pub const MAX_CLASSIC_DLC: u8 = 8;

/// One classic CAN frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    /// 11-bit (standard) or 29-bit (extended) identifier in a 32-bit container.
    pub id: u32,
    /// Data length code. Values above 8 are clamped on the wire.
    pub dlc: u8,
    /// Payload bytes. May be shorter or longer than `dlc`; the codec pads or truncates.
    pub data: Bytes,
    /// When the frame was produced or received.
    pub timestamp: DateTime<Utc>,
}

impl CanFrame {
    /// Create a frame stamped with the current time. DLC is taken from `data`.
    pub fn new(id: u32, data: &[u8]) -> Self {
        Self {
            id,
            dlc: u8::try_from(data.len()).unwrap_or(u8::MAX),
            data: Bytes::copy_from_slice(data),
            timestamp: Utc::now(),
        }
    }

    /// Create a frame with an explicit DLC that may disagree with the payload length.
    pub fn with_dlc(id: u32, dlc: u8, data: Bytes) -> Self {
        Self {
            id,
            dlc,
            data,
            timestamp: Utc::now(),
        }
    }

    /// Replace the timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Payload bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// DLC as it will appear on the wire.
    #[inline]
    pub fn wire_dlc(&self) -> u8 {
        self.dlc.min(MAX_CLASSIC_DLC)
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID=0x{:X} DLC={} DATA=", self.id, self.dlc)?;
        for (i, byte) in self.data.iter().enumerate() {
            if i > 0 {
                f.write_str("-")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        write!(
            f,
            " TS={}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_takes_dlc_from_payload() {
        let frame = CanFrame::new(0x7FF, &[1, 2, 3]);
        assert_eq!(frame.dlc, 3);
        assert_eq!(frame.wire_dlc(), 3);
    }

    #[test]
    fn test_wire_dlc_clamps() {
        let frame = CanFrame::with_dlc(1, 15, Bytes::from_static(&[0; 12]));
        assert_eq!(frame.dlc, 15);
        assert_eq!(frame.wire_dlc(), MAX_CLASSIC_DLC);
    }

    #[test]
    fn test_display_format() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let frame = CanFrame::new(0x205, &[0x05, 0x01]).at(ts);
        assert_eq!(
            frame.to_string(),
            "ID=0x205 DLC=2 DATA=05-01 TS=2024-05-01T12:00:00.000000Z"
        );
    }

    #[test]
    fn test_display_empty_payload() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let frame = CanFrame::new(0x10, &[]).at(ts);
        assert!(frame.to_string().starts_with("ID=0x10 DLC=0 DATA= TS="));
    }
}
