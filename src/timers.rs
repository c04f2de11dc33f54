/// Software timer queue.
///
/// Deadline-ordered one-shot and periodic timers over a caller-supplied
/// monotonic millisecond clock. The firmware sleeps until
/// [`TimerQueue::next_deadline`] and then drains [`TimerQueue::pop_due`];
/// tests advance the clock by hand. Fixed capacity, no allocation.
use heapless::Vec;

use crate::platform::{TimerHandle, TimerKind, TimerService};

/// Maximum simultaneously scheduled timers. The aggregator holds at most
/// three.
pub const MAX_TIMERS: usize = 4;

#[derive(Debug, Clone, Copy)]
struct Entry {
    handle: TimerHandle,
    kind: TimerKind,
    due_ms: u64,
    period_ms: u32,
    repeating: bool,
}

pub struct TimerQueue {
    now_ms: u64,
    next_id: u32,
    entries: Vec<Entry, MAX_TIMERS>,
}

impl TimerQueue {
    pub const fn new() -> Self {
        Self {
            now_ms: 0,
            next_id: 0,
            entries: Vec::new(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Move the clock forward. Earlier times are ignored.
    pub fn advance_to(&mut self, now_ms: u64) {
        if now_ms > self.now_ms {
            self.now_ms = now_ms;
        }
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.iter().map(|e| e.due_ms).min()
    }

    /// Take the next timer due at or before the current time.
    ///
    /// Ties go to the timer scheduled first. Periodic timers are re-armed one
    /// period after their previous deadline.
    pub fn pop_due(&mut self) -> Option<TimerKind> {
        let now = self.now_ms;
        let (index, entry) = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.due_ms <= now)
            .min_by_key(|(_, e)| (e.due_ms, e.handle))
            .map(|(i, e)| (i, *e))?;

        if entry.repeating {
            self.entries[index].due_ms = entry.due_ms + entry.period_ms.max(1) as u64;
        } else {
            self.entries.swap_remove(index);
        }
        Some(entry.kind)
    }

    /// Number of scheduled timers.
    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    /// Whether any timer of `kind` is scheduled.
    pub fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.entries.iter().any(|e| e.kind == kind)
    }

    fn allocate_handle(&mut self) -> TimerHandle {
        let handle = TimerHandle::from_raw(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        handle
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService for TimerQueue {
    fn schedule(&mut self, kind: TimerKind, period_ms: u32, repeating: bool) -> TimerHandle {
        let handle = self.allocate_handle();
        let entry = Entry {
            handle,
            kind,
            due_ms: self.now_ms + period_ms as u64,
            period_ms,
            repeating,
        };
        if self.entries.push(entry).is_err() {
            log::error!("Timer queue full, {} timer dropped", kind.as_str());
        }
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(index) = self.entries.iter().position(|e| e.handle == handle) {
            self.entries.swap_remove(index);
        }
    }
}
