/// Serial NDJSON reporting.
///
/// Maps aggregator transitions onto [`DeviceMessage`]s and serializes them
/// as newline-terminated JSON for the serial log.

use crate::aggregator::{Snapshot, Transition};
use crate::protocol::{DeviceMessage, MsgBuffer, MAX_MSG_LEN, VERSION};

/// Interval between status reports, in seconds
pub const STATUS_INTERVAL_SECS: u64 = 30;

/// Serialize a DeviceMessage to JSON bytes and write to the output buffer.
/// Returns the number of bytes written, or None if serialization failed.
pub fn serialize_message(msg: &DeviceMessage, buf: &mut [u8]) -> Option<usize> {
    match serde_json_core::to_slice(msg, buf) {
        Ok(len) => {
            // Append newline for NDJSON
            if len < buf.len() {
                buf[len] = b'\n';
                Some(len + 1)
            } else {
                Some(len)
            }
        }
        Err(_) => None,
    }
}

/// Serialize into an owned fixed-capacity buffer.
pub fn encode_message(msg: &DeviceMessage) -> Option<MsgBuffer> {
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok()?;
    let len = serialize_message(msg, &mut buf)?;
    buf.truncate(len);
    Some(buf)
}

/// Message worth reporting for a transition, if any.
///
/// Only state changes and minute broadcasts are reported; per-detection and
/// per-slice transitions would flood the log.
pub fn transition_message(transition: &Transition, ts: u32) -> Option<DeviceMessage<'_>> {
    match transition {
        Transition::Activated { sequence } => Some(DeviceMessage::Activated { seq: *sequence, ts }),
        Transition::Broadcast {
            sequence,
            slots,
            detections,
            empty_minutes,
        } => Some(DeviceMessage::Presence {
            seq: *sequence,
            slots,
            detections: *detections,
            empty_minutes: *empty_minutes,
            ts,
        }),
        Transition::WentDormant { empty_minutes } => Some(DeviceMessage::Dormant {
            empty_minutes: *empty_minutes,
            ts,
        }),
        _ => None,
    }
}

/// Build a status report from an aggregator snapshot.
pub fn status_message(
    snapshot: &Snapshot,
    uptime: u32,
    heap_free: u32,
    board: &'static str,
) -> DeviceMessage<'static> {
    DeviceMessage::Status {
        state: snapshot.state.as_str(),
        seq: snapshot.next_sequence,
        slice: snapshot.slice_index,
        detections: snapshot.detections,
        empty_minutes: snapshot.empty_minutes,
        uptime,
        heap_free,
        board,
        version: VERSION,
    }
}
