/// JSON message protocol for the serial log.
///
/// All messages are newline-delimited JSON (NDJSON), so a host tool can
/// follow what the node broadcasts without a BLE receiver.
/// Uses `heapless` types for no_std/no-alloc operation.
use heapless::Vec;
use serde::Serialize;

/// Messages written by the node
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DeviceMessage<'a> {
    /// Node woke up on motion and sent its first packet
    #[serde(rename = "activated")]
    Activated {
        seq: u8,
        /// Uptime in milliseconds
        ts: u32,
    },
    /// Minute packet went on air
    #[serde(rename = "presence")]
    Presence {
        seq: u8,
        /// Per-slice activity, oldest first
        slots: &'a [u8],
        detections: u16,
        /// Consecutive empty minutes so far
        #[serde(rename = "empty")]
        empty_minutes: u8,
        ts: u32,
    },
    /// Absence threshold reached, broadcasting stopped
    #[serde(rename = "dormant")]
    Dormant {
        #[serde(rename = "empty")]
        empty_minutes: u8,
        ts: u32,
    },
    /// Periodic status report
    #[serde(rename = "status")]
    Status {
        /// "active" or "dormant"
        state: &'static str,
        /// Next sequence number to go on air
        seq: u8,
        slice: u8,
        detections: u16,
        #[serde(rename = "empty")]
        empty_minutes: u8,
        /// Uptime in seconds
        uptime: u32,
        /// Free heap in bytes
        heap_free: u32,
        /// Board identifier
        board: &'static str,
        /// Firmware version
        version: &'static str,
    },
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 256;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;
