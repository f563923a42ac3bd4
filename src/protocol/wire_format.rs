//! Wire format encoding and decoding.
//!
//! Every frame travels as one length-prefixed record:
//! ```text
//! ┌──────────┬──────────┬───────┬──────────┬──────────────┐
//! │ Length   │ CAN ID   │ DLC   │ Ticks    │ Payload      │
//! │ 4 bytes  │ 4 bytes  │ 1 byte│ 8 bytes  │ DLC bytes    │
//! │ uint32 LE│ uint32 LE│ 0..=8 │ int64 LE │ zero-padded  │
//! └──────────┴──────────┴───────┴──────────┴──────────────┘
//! ```
//!
//! `Length` counts everything after itself (13 + DLC). Ticks are 100 ns
//! intervals since 0001-01-01T00:00:00Z, the same representation .NET peers
//! write, so both sides of a channel agree bit for bit.
//!
//! All multi-byte integers are Little Endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

use crate::error::{BusError, Result};
use crate::frame::{CanFrame, MAX_CLASSIC_DLC};

/// Size of the record length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Fixed part of a record body: id (4) + dlc (1) + ticks (8).
pub const RECORD_HEADER_SIZE: usize = 13;

/// Largest record body a receiver accepts.
pub const MAX_RECORD_LEN: usize = 1024;

/// Largest record a sender ever produces (prefix included).
pub const MAX_ENCODED_RECORD_SIZE: usize =
    LENGTH_PREFIX_SIZE + RECORD_HEADER_SIZE + MAX_CLASSIC_DLC as usize;

/// Ticks per second (100 ns resolution).
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Ticks between 0001-01-01 and the Unix epoch.
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Largest tick value a .NET peer accepts (9999-12-31T23:59:59.9999999Z).
pub const MAX_TICKS: i64 = 3_155_378_975_999_999_999;

/// Convert a UTC instant to wire ticks.
///
/// Instants outside `0001-01-01..=9999-12-31T23:59:59.9999999Z` are clamped
/// to the nearest end of that range.
pub fn to_ticks(timestamp: &DateTime<Utc>) -> i64 {
    let sub_ticks = i64::from(timestamp.timestamp_subsec_nanos() / 100);
    timestamp
        .timestamp()
        .saturating_mul(TICKS_PER_SECOND)
        .saturating_add(UNIX_EPOCH_TICKS)
        .saturating_add(sub_ticks)
        .clamp(0, MAX_TICKS)
}

/// Convert wire ticks back to a UTC instant.
///
/// Returns `None` for ticks outside `0..=MAX_TICKS`.
pub fn from_ticks(ticks: i64) -> Option<DateTime<Utc>> {
    if !(0..=MAX_TICKS).contains(&ticks) {
        return None;
    }
    let since_epoch = ticks.checked_sub(UNIX_EPOCH_TICKS)?;
    let secs = since_epoch.div_euclid(TICKS_PER_SECOND);
    let nanos = u32::try_from(since_epoch.rem_euclid(TICKS_PER_SECOND) * 100).ok()?;
    DateTime::from_timestamp(secs, nanos)
}

/// Check a length prefix before any body bytes are read.
pub fn validate_record_length(len: u32) -> Result<usize> {
    let len = len as usize;
    if len == 0 || len > MAX_RECORD_LEN {
        return Err(BusError::Protocol(format!(
            "Invalid record length {} (max {})",
            len, MAX_RECORD_LEN
        )));
    }
    Ok(len)
}

/// Encode a frame as a complete, length-prefixed record.
///
/// DLC above 8 is clamped; the payload is truncated or zero-padded to the
/// clamped DLC.
///
/// # Example
///
/// ```
/// use canbus_ipc::CanFrame;
/// use canbus_ipc::protocol::{encode_record, LENGTH_PREFIX_SIZE, RECORD_HEADER_SIZE};
///
/// let record = encode_record(&CanFrame::new(0x123, &[1, 2]));
/// assert_eq!(record.len(), LENGTH_PREFIX_SIZE + RECORD_HEADER_SIZE + 2);
/// ```
pub fn encode_record(frame: &CanFrame) -> Bytes {
    let dlc = frame.wire_dlc();
    let dlc_len = dlc as usize;
    let body_len = RECORD_HEADER_SIZE + dlc_len;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body_len);
    buf.put_u32_le(body_len as u32);
    buf.put_u32_le(frame.id);
    buf.put_u8(dlc);
    buf.put_i64_le(to_ticks(&frame.timestamp));

    let data = frame.data();
    let copied = data.len().min(dlc_len);
    buf.put_slice(&data[..copied]);
    buf.put_bytes(0, dlc_len - copied);

    buf.freeze()
}

/// Decode a record body (everything after the length prefix).
///
/// The DLC is re-clamped to 8. Bytes past the payload are ignored.
pub fn decode_body(mut body: Bytes) -> Result<CanFrame> {
    if body.len() < RECORD_HEADER_SIZE {
        return Err(BusError::Protocol(format!(
            "Record body {} bytes, need at least {}",
            body.len(),
            RECORD_HEADER_SIZE
        )));
    }

    let id = body.get_u32_le();
    let dlc = body.get_u8().min(MAX_CLASSIC_DLC);
    let ticks = body.get_i64_le();

    if body.len() < dlc as usize {
        return Err(BusError::Protocol(format!(
            "Record payload {} bytes, DLC {}",
            body.len(),
            dlc
        )));
    }

    let timestamp = from_ticks(ticks)
        .ok_or_else(|| BusError::Protocol(format!("Timestamp ticks {} out of range", ticks)))?;

    Ok(CanFrame {
        id,
        dlc,
        data: body.split_to(dlc as usize),
        timestamp,
    })
}

/// Decode one complete record (length prefix included).
pub fn decode_record(record: &[u8]) -> Result<CanFrame> {
    if record.len() < LENGTH_PREFIX_SIZE {
        return Err(BusError::EndOfStream {
            expected: LENGTH_PREFIX_SIZE,
            received: record.len(),
        });
    }

    let mut prefix = &record[..LENGTH_PREFIX_SIZE];
    let len = validate_record_length(prefix.get_u32_le())?;
    let body = &record[LENGTH_PREFIX_SIZE..];
    if body.len() < len {
        return Err(BusError::EndOfStream {
            expected: len,
            received: body.len(),
        });
    }

    decode_body(Bytes::copy_from_slice(&body[..len]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap()
    }

    #[test]
    fn test_roundtrip_preserves_fields() {
        let frame = CanFrame::new(0x1FFF_FFFF, &[1, 2, 3, 4, 5, 6, 7, 8]).at(fixed_time());
        let decoded = decode_record(&encode_record(&frame)).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_roundtrip_empty_payload() {
        let frame = CanFrame::new(0x42, &[]).at(fixed_time());
        let record = encode_record(&frame);
        assert_eq!(record.len(), LENGTH_PREFIX_SIZE + RECORD_HEADER_SIZE);

        let decoded = decode_record(&record).unwrap();
        assert_eq!(decoded.dlc, 0);
        assert!(decoded.data.is_empty());
    }

    #[test]
    fn test_little_endian_layout() {
        let frame = CanFrame::new(0x0102_0304, &[0xAA]).at(fixed_time());
        let record = encode_record(&frame);

        // Length prefix: 13 + 1
        assert_eq!(&record[0..4], &[14, 0, 0, 0]);
        // CAN ID in LE
        assert_eq!(&record[4..8], &[0x04, 0x03, 0x02, 0x01]);
        // DLC
        assert_eq!(record[8], 1);
        // Ticks in LE
        let ticks = i64::from_le_bytes(record[9..17].try_into().unwrap());
        assert_eq!(ticks, to_ticks(&fixed_time()));
        // Payload
        assert_eq!(record[17], 0xAA);
    }

    #[test]
    fn test_clamps_dlc_and_truncates_payload() {
        let frame = CanFrame::with_dlc(0x10, 12, Bytes::from_static(&[9; 12])).at(fixed_time());
        let record = encode_record(&frame);

        assert_eq!(record.len(), MAX_ENCODED_RECORD_SIZE);
        assert_eq!(record[8], 8);

        let decoded = decode_record(&record).unwrap();
        assert_eq!(decoded.dlc, 8);
        assert_eq!(decoded.data(), &[9; 8]);
    }

    #[test]
    fn test_long_payload_with_small_dlc_is_truncated() {
        let frame = CanFrame::with_dlc(0x10, 2, Bytes::from_static(&[1, 2, 3, 4])).at(fixed_time());
        let decoded = decode_record(&encode_record(&frame)).unwrap();
        assert_eq!(decoded.data(), &[1, 2]);
    }

    #[test]
    fn test_pads_short_payload() {
        let frame = CanFrame::with_dlc(0x10, 5, Bytes::from_static(&[0xB0, 0xB1])).at(fixed_time());
        let record = encode_record(&frame);

        assert_eq!(&record[17..], &[0xB0, 0xB1, 0, 0, 0]);
    }

    #[test]
    fn test_decode_reclamps_dlc() {
        let mut record = encode_record(&CanFrame::new(1, &[1; 8]).at(fixed_time())).to_vec();
        record[8] = 200;

        let decoded = decode_record(&record).unwrap();
        assert_eq!(decoded.dlc, 8);
        assert_eq!(decoded.data(), &[1; 8]);
    }

    #[test]
    fn test_decode_ignores_trailing_bytes_in_record() {
        let frame = CanFrame::new(1, &[7]).at(fixed_time());
        let mut record = encode_record(&frame).to_vec();
        record.extend_from_slice(&[0xEE, 0xEE]);
        let body_len = (RECORD_HEADER_SIZE + 3) as u32;
        record[0..4].copy_from_slice(&body_len.to_le_bytes());

        let decoded = decode_record(&record).unwrap();
        assert_eq!(decoded.data(), &[7]);
    }

    #[test]
    fn test_zero_length_rejected() {
        let result = decode_record(&[0, 0, 0, 0]);
        assert!(matches!(result, Err(BusError::Protocol(_))));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let result = decode_record(&2000u32.to_le_bytes());
        assert!(result.unwrap_err().to_string().contains("Invalid record length"));
        assert!(validate_record_length(MAX_RECORD_LEN as u32).is_ok());
        assert!(validate_record_length(MAX_RECORD_LEN as u32 + 1).is_err());
    }

    #[test]
    fn test_body_shorter_than_header_rejected() {
        let mut record = 5u32.to_le_bytes().to_vec();
        record.extend_from_slice(&[0; 5]);
        assert!(matches!(decode_record(&record), Err(BusError::Protocol(_))));
    }

    #[test]
    fn test_body_missing_payload_rejected() {
        let mut record = encode_record(&CanFrame::new(1, &[1, 2, 3]).at(fixed_time())).to_vec();
        // Claim 3 payload bytes but shrink the record to carry only one
        record.truncate(LENGTH_PREFIX_SIZE + RECORD_HEADER_SIZE + 1);
        record[0..4].copy_from_slice(&((RECORD_HEADER_SIZE + 1) as u32).to_le_bytes());
        assert!(matches!(decode_record(&record), Err(BusError::Protocol(_))));
    }

    #[test]
    fn test_truncated_record_is_end_of_stream() {
        let record = encode_record(&CanFrame::new(1, &[1, 2, 3]).at(fixed_time()));
        let result = decode_record(&record[..record.len() - 1]);
        assert!(matches!(
            result,
            Err(BusError::EndOfStream {
                expected: 16,
                received: 15
            })
        ));
    }

    #[test]
    fn test_ticks_match_dotnet_epoch() {
        let epoch = DateTime::from_timestamp(0, 0).unwrap();
        assert_eq!(to_ticks(&epoch), UNIX_EPOCH_TICKS);
        assert_eq!(from_ticks(UNIX_EPOCH_TICKS), Some(epoch));
        // DateTime.MinValue
        let min = from_ticks(0).unwrap();
        assert_eq!(min.to_rfc3339(), "0001-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_ticks_truncate_to_100ns() {
        let ts = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let restored = from_ticks(to_ticks(&ts)).unwrap();
        assert_eq!(restored.timestamp(), 1_700_000_000);
        assert_eq!(restored.timestamp_subsec_nanos(), 123_456_700);
    }

    #[test]
    fn test_ticks_before_unix_epoch() {
        let ts = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(from_ticks(to_ticks(&ts)), Some(ts));
    }

    #[test]
    fn test_out_of_range_ticks_rejected() {
        assert!(from_ticks(i64::MIN).is_none());
        assert!(from_ticks(-1).is_none());
        assert!(from_ticks(MAX_TICKS + 1).is_none());

        let max = from_ticks(MAX_TICKS).unwrap();
        assert_eq!(
            max.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
            "9999-12-31T23:59:59.999999900Z"
        );
    }

    #[test]
    fn test_ticks_clamp_to_dotnet_range() {
        assert_eq!(to_ticks(&DateTime::<Utc>::MAX_UTC), MAX_TICKS);
        assert_eq!(to_ticks(&DateTime::<Utc>::MIN_UTC), 0);

        let frame = CanFrame::new(1, &[1]).at(DateTime::<Utc>::MAX_UTC);
        let decoded = decode_record(&encode_record(&frame)).unwrap();
        assert_eq!(decoded.timestamp, from_ticks(MAX_TICKS).unwrap());
    }

    #[test]
    fn test_decode_rejects_negative_ticks() {
        let mut record = encode_record(&CanFrame::new(1, &[1])).to_vec();
        record[9..17].copy_from_slice(&(-1i64).to_le_bytes());
        assert!(matches!(decode_record(&record), Err(BusError::Protocol(_))));
    }
}
