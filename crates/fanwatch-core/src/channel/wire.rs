//! Binary layout of fanotify event and response records.
//!
//! ```text
//! fanotify_event_metadata (24 bytes, little-endian)
//!   0  u32 event_len
//!   4  u8  vers
//!   5  u8  reserved
//!   6  u16 metadata_len
//!   8  u64 mask
//!  16  i32 fd
//!  20  i32 pid
//!
//! fanotify_response (8 bytes, little-endian)
//!   0  i32 fd
//!   4  u32 response
//! ```

use fanwatch_common::constants::{EVENT_METADATA_LEN, FANOTIFY_METADATA_VERSION, RESPONSE_LEN};
use fanwatch_common::error::{FanwatchError, Result};
use fanwatch_common::types::{Decision, EventMask};

use crate::event::EventMetadata;

/// Decodes one 24-byte record.
///
/// # Errors
///
/// Returns [`FanwatchError::Decode`] if `bytes` is not exactly one record
/// long or the record's version is not [`FANOTIFY_METADATA_VERSION`].
pub fn decode_record(bytes: &[u8]) -> Result<EventMetadata> {
    let record: &[u8; EVENT_METADATA_LEN] =
        bytes.try_into().map_err(|_| FanwatchError::Decode {
            message: format!(
                "record is {} bytes, expected {EVENT_METADATA_LEN}",
                bytes.len()
            ),
        })?;

    let metadata = EventMetadata {
        event_len: u32::from_le_bytes([record[0], record[1], record[2], record[3]]),
        version: record[4],
        reserved: record[5],
        metadata_len: u16::from_le_bytes([record[6], record[7]]),
        mask: EventMask::from_bits_retain(u64::from_le_bytes([
            record[8], record[9], record[10], record[11], record[12], record[13], record[14],
            record[15],
        ])),
        fd: i32::from_le_bytes([record[16], record[17], record[18], record[19]]),
        pid: i32::from_le_bytes([record[20], record[21], record[22], record[23]]),
    };

    if metadata.version != FANOTIFY_METADATA_VERSION {
        return Err(FanwatchError::Decode {
            message: format!(
                "unsupported metadata version {} (expected {FANOTIFY_METADATA_VERSION})",
                metadata.version
            ),
        });
    }
    Ok(metadata)
}

/// Splits a read buffer into records and decodes every one it can.
///
/// Records that fail to decode are logged and skipped. Trailing bytes that
/// do not make up a full record are logged as a protocol anomaly; the
/// complete records before them are still returned.
#[must_use]
pub fn decode_batch(buf: &[u8]) -> Vec<EventMetadata> {
    let chunks = buf.chunks_exact(EVENT_METADATA_LEN);
    let remainder = chunks.remainder().len();
    if remainder != 0 {
        tracing::warn!(
            read = buf.len(),
            trailing = remainder,
            "short read is not a whole number of event records"
        );
    }

    chunks
        .enumerate()
        .filter_map(|(index, chunk)| match decode_record(chunk) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                tracing::warn!(index, error = %e, "skipping event record");
                None
            }
        })
        .collect()
}

/// Encodes a permission response for the event descriptor `fd`.
#[must_use]
pub fn encode_response(fd: i32, decision: Decision) -> [u8; RESPONSE_LEN] {
    let mut out = [0u8; RESPONSE_LEN];
    out[..4].copy_from_slice(&fd.to_le_bytes());
    out[4..].copy_from_slice(&decision.wire_value().to_le_bytes());
    out
}

/// Encodes one event record. The inverse of [`decode_record`].
#[must_use]
pub fn encode_record(metadata: &EventMetadata) -> [u8; EVENT_METADATA_LEN] {
    let mut out = [0u8; EVENT_METADATA_LEN];
    out[0..4].copy_from_slice(&metadata.event_len.to_le_bytes());
    out[4] = metadata.version;
    out[5] = metadata.reserved;
    out[6..8].copy_from_slice(&metadata.metadata_len.to_le_bytes());
    out[8..16].copy_from_slice(&metadata.mask.bits().to_le_bytes());
    out[16..20].copy_from_slice(&metadata.fd.to_le_bytes());
    out[20..24].copy_from_slice(&metadata.pid.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use fanwatch_common::constants::FAN_NOFD;

    use super::*;

    fn record(pid: i32, mask: EventMask, version: u8) -> EventMetadata {
        EventMetadata {
            event_len: 24,
            version,
            reserved: 0,
            metadata_len: 24,
            mask,
            fd: FAN_NOFD,
            pid,
        }
    }

    fn buffer(records: &[EventMetadata]) -> Vec<u8> {
        records.iter().flat_map(encode_record).collect()
    }

    #[test]
    fn decodes_known_byte_layout() {
        let bytes: [u8; 24] = [
            24, 0, 0, 0, // event_len
            3, 0, // vers, reserved
            24, 0, // metadata_len
            0x00, 0x00, 0x01, 0x00, 0, 0, 0, 0, // mask = OPEN_PERM
            9, 0, 0, 0, // fd
            0x39, 0x30, 0, 0, // pid = 12345
        ];
        let metadata = decode_record(&bytes).expect("decode");
        assert_eq!(metadata.event_len, 24);
        assert_eq!(metadata.mask, EventMask::OPEN_PERM);
        assert_eq!(metadata.fd, 9);
        assert_eq!(metadata.pid, 12345);
    }

    #[test]
    fn batch_preserves_wire_order() {
        let input: Vec<_> = (1..=5)
            .map(|pid| record(pid, EventMask::MODIFY, FANOTIFY_METADATA_VERSION))
            .collect();
        let decoded = decode_batch(&buffer(&input));
        assert_eq!(decoded.len(), 5);
        let pids: Vec<_> = decoded.iter().map(|m| m.pid).collect();
        assert_eq!(pids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn short_read_keeps_complete_records() {
        let input = vec![
            record(10, EventMask::OPEN, FANOTIFY_METADATA_VERSION),
            record(11, EventMask::CLOSE_WRITE, FANOTIFY_METADATA_VERSION),
        ];
        let mut bytes = buffer(&input);
        bytes.extend_from_slice(&[0xAA; 13]);

        let decoded = decode_batch(&bytes);
        assert_eq!(decoded.len(), bytes.len() / EVENT_METADATA_LEN);
        assert_eq!(decoded[1].pid, 11);
    }

    #[test]
    fn read_shorter_than_one_record_yields_nothing() {
        assert!(decode_batch(&[3u8; 10]).is_empty());
    }

    #[test]
    fn mismatched_version_is_dropped_and_neighbours_kept() {
        let input = vec![
            record(1, EventMask::OPEN, FANOTIFY_METADATA_VERSION),
            record(2, EventMask::OPEN, FANOTIFY_METADATA_VERSION + 1),
            record(3, EventMask::OPEN, FANOTIFY_METADATA_VERSION),
        ];
        let decoded = decode_batch(&buffer(&input));
        let pids: Vec<_> = decoded.iter().map(|m| m.pid).collect();
        assert_eq!(pids, vec![1, 3]);
    }

    #[test]
    fn decode_record_rejects_wrong_length() {
        let err = decode_record(&[0u8; 23]).expect_err("too short");
        assert!(matches!(err, FanwatchError::Decode { .. }));
    }

    #[test]
    fn unknown_mask_bits_are_retained() {
        let raw = EventMask::from_bits_retain(0x1000_0000 | EventMask::OPEN.bits());
        let mut meta = record(4, EventMask::empty(), FANOTIFY_METADATA_VERSION);
        meta.mask = raw;
        let decoded = decode_record(&encode_record(&meta)).expect("decode");
        assert_eq!(decoded.mask.bits(), 0x1000_0020);
    }

    #[test]
    fn response_layout_is_fd_then_decision() {
        assert_eq!(encode_response(5, Decision::Allow), [5, 0, 0, 0, 1, 0, 0, 0]);
        assert_eq!(
            encode_response(-1, Decision::Deny),
            [0xff, 0xff, 0xff, 0xff, 2, 0, 0, 0]
        );
    }
}
