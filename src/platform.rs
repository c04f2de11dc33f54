//! Platform collaborator interfaces.
//!
//! The aggregator never touches hardware directly. It is handed a value
//! implementing [`Platform`] on every entry point and drives the radio,
//! timers and PIR input through these traits. The firmware implements them
//! on top of esp-hal and trouble-host; tests use an in-memory fake.

use crate::packet::PACKET_LEN;

/// Which aggregator transition a timer drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Advance to the next six-second slice
    Slice,
    /// Close the current minute window
    Minute,
    /// End the on-air window of the last packet
    BroadcastWindow,
}

impl TimerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerKind::Slice => "slice",
            TimerKind::Minute => "minute",
            TimerKind::BroadcastWindow => "broadcast_window",
        }
    }
}

/// Opaque handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimerHandle(u32);

impl TimerHandle {
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Radio broadcaster. Fire-and-forget: nothing is reported back.
pub trait Broadcaster {
    /// Start (or replace) periodic advertisement of `payload`.
    fn start_broadcast(&mut self, payload: &[u8; PACKET_LEN]);

    /// Stop advertising. A no-op when nothing is on air.
    fn stop_broadcast(&mut self);
}

/// Timer service.
///
/// # Invariants
///
/// - A cancelled timer never fires afterwards.
/// - Cancelling an unknown or already-fired handle is a no-op.
pub trait TimerService {
    /// Schedule `kind` to fire after `period_ms`, and every `period_ms`
    /// after that when `repeating`.
    fn schedule(&mut self, kind: TimerKind, period_ms: u32, repeating: bool) -> TimerHandle;

    fn cancel(&mut self, handle: TimerHandle);
}

/// Level of the PIR output pin.
pub trait MotionInput {
    /// Returns `true` while the sensor reports motion.
    fn is_high(&self) -> bool;
}

/// Everything the aggregator needs from the platform.
pub trait Platform: Broadcaster + TimerService + MotionInput {}

impl<T: Broadcaster + TimerService + MotionInput> Platform for T {}
