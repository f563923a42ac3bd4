//! Door-state frame convention.
//!
//! ```text
//! CAN ID  = 0x200 + door_id
//! DLC     = 2
//! data[0] = door_id
//! data[1] = DoorState (0 Closed, 1 Open, 2 Obstructed)
//! ```
//!
//! # Example
//!
//! ```
//! use canbus_ipc::door::{DoorState, DoorStatus};
//!
//! let frame = DoorStatus::new(5, DoorState::Open).to_frame();
//! assert_eq!(frame.id, 0x205);
//!
//! let parsed = DoorStatus::parse(&frame).unwrap();
//! assert_eq!(parsed.state, DoorState::Open);
//! ```

use std::fmt;

use thiserror::Error;

use crate::frame::CanFrame;

/// Base CAN identifier for door state frames.
pub const DOOR_BASE_ID: u32 = 0x200;

/// Payload length of a door state frame.
pub const DOOR_PAYLOAD_LEN: u8 = 2;

/// Reasons a frame is not a valid door state frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DoorFrameError {
    /// Identifier outside `0x200..=0x2FF`.
    #[error("CAN ID 0x{0:X} is not a door state identifier")]
    IdOutOfRange(u32),

    /// DLC or payload shorter than two bytes.
    #[error("door state frame needs 2 bytes, got dlc {dlc} / {len} bytes")]
    TooShort {
        /// Declared DLC.
        dlc: u8,
        /// Actual payload length.
        len: usize,
    },

    /// `data[0]` disagrees with the identifier.
    #[error("payload door id {payload} does not match identifier door id {expected}")]
    DoorIdMismatch {
        /// Door id derived from the CAN ID.
        expected: u8,
        /// Door id carried in the payload.
        payload: u8,
    },

    /// `data[1]` is not a defined state.
    #[error("undefined door state {0}")]
    UnknownState(u8),
}

/// Door state carried in `data[1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DoorState {
    /// Door is closed.
    Closed = 0,
    /// Door is open.
    Open = 1,
    /// Door movement is obstructed.
    Obstructed = 2,
}

impl DoorState {
    /// Next state in the demo cycle: Closed -> Open -> Obstructed -> Closed.
    pub fn next(self) -> Self {
        match self {
            DoorState::Closed => DoorState::Open,
            DoorState::Open => DoorState::Obstructed,
            DoorState::Obstructed => DoorState::Closed,
        }
    }
}

impl TryFrom<u8> for DoorState {
    type Error = DoorFrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DoorState::Closed),
            1 => Ok(DoorState::Open),
            2 => Ok(DoorState::Obstructed),
            other => Err(DoorFrameError::UnknownState(other)),
        }
    }
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DoorState::Closed => "Closed",
            DoorState::Open => "Open",
            DoorState::Obstructed => "Obstructed",
        };
        f.write_str(name)
    }
}

/// A decoded door state frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorStatus {
    /// Door number (0..=255).
    pub door_id: u8,
    /// Reported state.
    pub state: DoorState,
}

impl DoorStatus {
    /// Create a status.
    pub fn new(door_id: u8, state: DoorState) -> Self {
        Self { door_id, state }
    }

    /// CAN identifier for this door.
    pub fn can_id(&self) -> u32 {
        DOOR_BASE_ID + u32::from(self.door_id)
    }

    /// Build the frame, stamped now.
    pub fn to_frame(&self) -> CanFrame {
        CanFrame::new(self.can_id(), &[self.door_id, self.state as u8])
    }

    /// Parse and validate a door state frame.
    pub fn parse(frame: &CanFrame) -> Result<Self, DoorFrameError> {
        if !(DOOR_BASE_ID..=DOOR_BASE_ID + u32::from(u8::MAX)).contains(&frame.id) {
            return Err(DoorFrameError::IdOutOfRange(frame.id));
        }

        let data = frame.data();
        if frame.dlc < DOOR_PAYLOAD_LEN || data.len() < DOOR_PAYLOAD_LEN as usize {
            return Err(DoorFrameError::TooShort {
                dlc: frame.dlc,
                len: data.len(),
            });
        }

        let door_id = (frame.id - DOOR_BASE_ID) as u8;
        if data[0] != door_id {
            return Err(DoorFrameError::DoorIdMismatch {
                expected: door_id,
                payload: data[0],
            });
        }

        let state = DoorState::try_from(data[1])?;
        Ok(Self { door_id, state })
    }
}

impl TryFrom<&CanFrame> for DoorStatus {
    type Error = DoorFrameError;

    fn try_from(frame: &CanFrame) -> Result<Self, Self::Error> {
        Self::parse(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_parse_open_door() {
        let frame = CanFrame::new(0x205, &[5, 1]);
        let status = DoorStatus::parse(&frame).unwrap();
        assert_eq!(status.door_id, 5);
        assert_eq!(status.state, DoorState::Open);
    }

    #[test]
    fn test_parse_rejects_door_id_mismatch() {
        let frame = CanFrame::new(0x205, &[6, 1]);
        assert_eq!(
            DoorStatus::parse(&frame),
            Err(DoorFrameError::DoorIdMismatch {
                expected: 5,
                payload: 6
            })
        );
    }

    #[test]
    fn test_parse_rejects_undefined_state() {
        let frame = CanFrame::new(0x205, &[5, 9]);
        assert_eq!(
            DoorStatus::parse(&frame),
            Err(DoorFrameError::UnknownState(9))
        );
    }

    #[test]
    fn test_parse_rejects_foreign_ids() {
        assert!(matches!(
            DoorStatus::parse(&CanFrame::new(0x1FF, &[0, 0])),
            Err(DoorFrameError::IdOutOfRange(0x1FF))
        ));
        assert!(matches!(
            DoorStatus::parse(&CanFrame::new(0x300, &[0, 0])),
            Err(DoorFrameError::IdOutOfRange(0x300))
        ));
    }

    #[test]
    fn test_parse_rejects_short_frames() {
        assert!(matches!(
            DoorStatus::parse(&CanFrame::new(0x201, &[1])),
            Err(DoorFrameError::TooShort { .. })
        ));
        let short_dlc = CanFrame::with_dlc(0x201, 1, Bytes::from_static(&[1, 0]));
        assert!(matches!(
            DoorStatus::parse(&short_dlc),
            Err(DoorFrameError::TooShort { dlc: 1, len: 2 })
        ));
    }

    #[test]
    fn test_highest_door_id() {
        let frame = DoorStatus::new(255, DoorState::Obstructed).to_frame();
        assert_eq!(frame.id, 0x2FF);
        assert_eq!(DoorStatus::try_from(&frame).unwrap().door_id, 255);
    }

    #[test]
    fn test_to_frame_layout() {
        let frame = DoorStatus::new(3, DoorState::Obstructed).to_frame();
        assert_eq!(frame.id, 0x203);
        assert_eq!(frame.dlc, DOOR_PAYLOAD_LEN);
        assert_eq!(frame.data(), &[3, 2]);
    }

    #[test]
    fn test_state_cycle() {
        let mut state = DoorState::Closed;
        let mut seen = Vec::new();
        for _ in 0..4 {
            state = state.next();
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                DoorState::Open,
                DoorState::Obstructed,
                DoorState::Closed,
                DoorState::Open
            ]
        );
    }
}
