/// Aggregator timing and policy parameters.
///
/// Compiled-in defaults reproduce the deployed node. The companion tooling
/// and tests can adjust any of them without touching the state machine.
use crate::packet::{SlotPolicy, SLOT_COUNT};

/// Length of one aggregation window
pub const MINUTE_PERIOD_MS: u32 = 60_000;

/// Slice period that divides the minute exactly (6 s)
pub const EXACT_SLICE_PERIOD_MS: u32 = MINUTE_PERIOD_MS / SLOT_COUNT as u32;

/// Slice period used by deployed nodes. Ten slices end 1 s before the minute
/// tick, so the last slice tick never races the minute boundary.
pub const COMPENSATED_SLICE_PERIOD_MS: u32 = 5_900;

/// How long each packet stays on air
pub const BROADCAST_WINDOW_MS: u32 = 1_000;

/// Consecutive empty minutes before the node goes dormant
pub const ABSENCE_THRESHOLD: u8 = 10;

/// Runtime aggregator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Period of the slice timer
    pub slice_period_ms: u32,
    /// Period of the minute timer
    pub minute_period_ms: u32,
    /// Duration of each broadcast window
    pub broadcast_window_ms: u32,
    /// Empty minutes tolerated before going dormant
    pub absence_threshold: u8,
    /// How detections are folded into slot bytes
    pub slot_policy: SlotPolicy,
}

impl AggregatorConfig {
    pub const fn new() -> Self {
        Self {
            slice_period_ms: COMPENSATED_SLICE_PERIOD_MS,
            minute_period_ms: MINUTE_PERIOD_MS,
            broadcast_window_ms: BROADCAST_WINDOW_MS,
            absence_threshold: ABSENCE_THRESHOLD,
            slot_policy: SlotPolicy::Flag,
        }
    }

    /// Use a slice period of exactly one tenth of the minute.
    ///
    /// The tenth slice tick then falls on the minute tick itself; the minute
    /// tick wins and cancels it.
    pub const fn exact_slices(mut self) -> Self {
        self.slice_period_ms = self.minute_period_ms / SLOT_COUNT as u32;
        self
    }

    pub const fn with_slot_policy(mut self, policy: SlotPolicy) -> Self {
        self.slot_policy = policy;
        self
    }

    /// A threshold of 0 is raised to 1.
    pub const fn with_absence_threshold(mut self, minutes: u8) -> Self {
        self.absence_threshold = if minutes == 0 { 1 } else { minutes };
        self
    }

    pub const fn with_broadcast_window(mut self, window_ms: u32) -> Self {
        self.broadcast_window_ms = window_ms;
        self
    }

    /// Time between the last slice tick and the minute tick, in ms.
    /// Negative when ten slices overrun the minute.
    pub fn slice_drift_ms(&self) -> i64 {
        self.minute_period_ms as i64 - self.slice_period_ms as i64 * SLOT_COUNT as i64
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self::new()
    }
}
