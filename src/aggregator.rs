/// Presence aggregator state machine.
///
/// Folds PIR detections into a per-slice [`PresencePacket`], broadcasts it
/// once per minute and goes dormant after a run of empty minutes.
///
/// Two states:
/// - **Dormant**: no timers scheduled, radio idle. Left only by a detection.
/// - **Active**: minute timer scheduled; the slice timer is running for
///   slices 0..=9.
///
/// The aggregator owns its timer handles and always cancels one before
/// replacing or dropping it. The platform serializes the entry points, so no
/// locking happens here.
use crate::config::AggregatorConfig;
use crate::packet::{PresencePacket, SLOT_COUNT};
use crate::platform::{Platform, TimerHandle, TimerKind, TimerService};

/// Top-level aggregator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Dormant,
    Active,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Dormant => "dormant",
            NodeState::Active => "active",
        }
    }
}

/// What an entry point did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Dormant → Active; the first packet went on air
    Activated { sequence: u8 },
    /// Detection folded into a slot
    Counted { slot: u8, value: u8 },
    /// Detection after the last slice; counted for the minute, no slot written
    Clamped,
    /// Slice timer advanced to `index`
    SliceAdvanced { index: u8, recovered: bool },
    /// Minute closed and its packet went on air
    Broadcast {
        sequence: u8,
        slots: [u8; SLOT_COUNT],
        detections: u16,
        empty_minutes: u8,
    },
    /// Absence threshold reached; Active → Dormant
    WentDormant { empty_minutes: u8 },
    /// Broadcast window ended, radio stopped
    WindowClosed,
    /// Timer callback with nothing to do
    Ignored,
}

/// Copyable view of the aggregator for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub state: NodeState,
    /// Sequence number of the next transmitted packet
    pub next_sequence: u8,
    pub slice_index: u8,
    pub detections: u16,
    pub empty_minutes: u8,
}

impl Snapshot {
    /// State at boot.
    pub const fn dormant() -> Self {
        Self {
            state: NodeState::Dormant,
            next_sequence: 0,
            slice_index: 0,
            detections: 0,
            empty_minutes: 0,
        }
    }
}

pub struct PresenceAggregator {
    config: AggregatorConfig,
    packet: PresencePacket,
    slice_index: u8,
    /// Detections since the last minute boundary
    detections: u16,
    empty_minutes: u8,
    /// Persistent broadcast counter; reset only on dormancy
    broadcast_counter: u8,
    minute_timer: Option<TimerHandle>,
    slice_timer: Option<TimerHandle>,
    stop_timer: Option<TimerHandle>,
}

impl PresenceAggregator {
    pub const fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            packet: PresencePacket::new(),
            slice_index: 0,
            detections: 0,
            empty_minutes: 0,
            broadcast_counter: 0,
            minute_timer: None,
            slice_timer: None,
            stop_timer: None,
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn state(&self) -> NodeState {
        if self.minute_timer.is_some() {
            NodeState::Active
        } else {
            NodeState::Dormant
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == NodeState::Active
    }

    /// The packet currently being filled.
    pub fn packet(&self) -> &PresencePacket {
        &self.packet
    }

    /// Whether a broadcast window is still open.
    pub fn is_broadcasting(&self) -> bool {
        self.stop_timer.is_some()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state(),
            next_sequence: self.broadcast_counter,
            slice_index: self.slice_index,
            detections: self.detections,
            empty_minutes: self.empty_minutes,
        }
    }

    /// PIR edge. Wakes a dormant node, otherwise marks the current slice.
    pub fn on_detection<P: Platform>(&mut self, hw: &mut P) -> Transition {
        if !self.is_active() {
            return self.activate(hw);
        }

        self.detections = self.detections.saturating_add(1);

        let slot = self.slice_index;
        match self.packet.record(slot as usize, self.config.slot_policy) {
            Some(value) => {
                log::debug!("Detection in slice {} (value {})", slot, value);
                Transition::Counted { slot, value }
            }
            None => {
                log::warn!("Detection after last slice, slot not recorded");
                Transition::Clamped
            }
        }
    }

    /// Slice timer fired.
    pub fn on_slice_tick<P: Platform>(&mut self, hw: &mut P) -> Transition {
        // one-shot: the handle is spent
        self.slice_timer = None;

        if !self.is_active() {
            log::warn!("Slice tick while dormant, ignored");
            return Transition::Ignored;
        }
        let current = self.slice_index as usize;
        if current >= SLOT_COUNT {
            return Transition::Ignored;
        }

        // Catch motion whose edge was missed or debounced away.
        let recovered = hw.is_high() && self.packet.slot(current) == 0;
        if recovered {
            self.packet.record(current, self.config.slot_policy);
        }

        self.slice_index += 1;
        if (self.slice_index as usize) < SLOT_COUNT {
            self.slice_timer = Some(hw.schedule(TimerKind::Slice, self.config.slice_period_ms, false));
        }

        log::debug!("Slice {} started (recovered: {})", self.slice_index, recovered);
        Transition::SliceAdvanced {
            index: self.slice_index,
            recovered,
        }
    }

    /// Minute timer fired: broadcast the minute or go dormant.
    pub fn on_minute_tick<P: Platform>(&mut self, hw: &mut P) -> Transition {
        if !self.is_active() {
            log::warn!("Minute tick while dormant, ignored");
            return Transition::Ignored;
        }

        cancel(&mut self.slice_timer, hw);

        if self.detections == 0 {
            self.empty_minutes = self.empty_minutes.saturating_add(1);
        } else {
            self.empty_minutes = 0;
        }

        if self.empty_minutes >= self.config.absence_threshold {
            return self.go_dormant(hw);
        }

        let detections = self.detections;
        let slots = *self.packet.slots();
        let sequence = self.transmit(hw);

        self.packet = PresencePacket::with_sequence(self.broadcast_counter);
        self.slice_index = 0;
        self.detections = 0;
        self.slice_timer = Some(hw.schedule(TimerKind::Slice, self.config.slice_period_ms, false));
        cancel(&mut self.minute_timer, hw);
        self.minute_timer = Some(hw.schedule(TimerKind::Minute, self.config.minute_period_ms, true));

        log::info!(
            "Minute broadcast seq={} active_slices={} detections={} empty={}",
            sequence,
            slots.iter().filter(|&&v| v != 0).count(),
            detections,
            self.empty_minutes
        );
        Transition::Broadcast {
            sequence,
            slots,
            detections,
            empty_minutes: self.empty_minutes,
        }
    }

    /// Broadcast window timer fired.
    pub fn on_broadcast_window_elapsed<P: Platform>(&mut self, hw: &mut P) -> Transition {
        self.stop_timer = None;
        hw.stop_broadcast();
        Transition::WindowClosed
    }

    /// Dispatch a fired timer to its entry point.
    pub fn on_timer<P: Platform>(&mut self, kind: TimerKind, hw: &mut P) -> Transition {
        match kind {
            TimerKind::Slice => self.on_slice_tick(hw),
            TimerKind::Minute => self.on_minute_tick(hw),
            TimerKind::BroadcastWindow => self.on_broadcast_window_elapsed(hw),
        }
    }

    fn activate<P: Platform>(&mut self, hw: &mut P) -> Transition {
        self.packet = PresencePacket::with_sequence(self.broadcast_counter);
        self.packet.record(0, self.config.slot_policy);
        self.slice_index = 0;
        self.detections = 1;
        self.empty_minutes = 0;

        let sequence = self.transmit(hw);

        cancel(&mut self.slice_timer, hw);
        self.slice_timer = Some(hw.schedule(TimerKind::Slice, self.config.slice_period_ms, false));
        cancel(&mut self.minute_timer, hw);
        self.minute_timer = Some(hw.schedule(TimerKind::Minute, self.config.minute_period_ms, true));

        log::info!("Motion detected, node active (seq={})", sequence);
        Transition::Activated { sequence }
    }

    fn go_dormant<P: Platform>(&mut self, hw: &mut P) -> Transition {
        let empty_minutes = self.empty_minutes;

        cancel(&mut self.minute_timer, hw);
        cancel(&mut self.slice_timer, hw);
        if self.stop_timer.is_some() {
            cancel(&mut self.stop_timer, hw);
            hw.stop_broadcast();
        }

        self.broadcast_counter = 0;
        self.empty_minutes = 0;
        self.slice_index = 0;
        self.detections = 0;
        self.packet = PresencePacket::new();

        log::info!("No motion for {} minutes, node dormant", empty_minutes);
        Transition::WentDormant { empty_minutes }
    }

    /// Stamp the packet with the broadcast counter, put it on air and open a
    /// broadcast window. Returns the transmitted sequence number.
    fn transmit<P: Platform>(&mut self, hw: &mut P) -> u8 {
        let sequence = self.broadcast_counter;
        self.packet.set_sequence(sequence);
        hw.start_broadcast(&self.packet.to_bytes());

        cancel(&mut self.stop_timer, hw);
        self.stop_timer = Some(hw.schedule(
            TimerKind::BroadcastWindow,
            self.config.broadcast_window_ms,
            false,
        ));

        self.broadcast_counter = sequence.wrapping_add(1);
        sequence
    }
}

impl Default for PresenceAggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::new())
    }
}

fn cancel<T: TimerService>(slot: &mut Option<TimerHandle>, timers: &mut T) {
    if let Some(handle) = slot.take() {
        timers.cancel(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{SlotPolicy, PACKET_LEN};
    use crate::platform::{Broadcaster, MotionInput};
    use crate::timers::TimerQueue;

    /// In-memory platform: records broadcasts, runs real timers on a
    /// simulated clock.
    struct FakeNode {
        timers: TimerQueue,
        sent: Vec<PresencePacket>,
        on_air: bool,
        stops: usize,
        pir_high: bool,
    }

    impl FakeNode {
        fn new() -> Self {
            Self {
                timers: TimerQueue::new(),
                sent: Vec::new(),
                on_air: false,
                stops: 0,
                pir_high: false,
            }
        }

        fn last_sent(&self) -> PresencePacket {
            *self.sent.last().expect("nothing broadcast")
        }
    }

    impl Broadcaster for FakeNode {
        fn start_broadcast(&mut self, payload: &[u8; PACKET_LEN]) {
            let packet = PresencePacket::parse(payload).expect("malformed payload");
            self.sent.push(packet);
            self.on_air = true;
        }

        fn stop_broadcast(&mut self) {
            self.on_air = false;
            self.stops += 1;
        }
    }

    impl TimerService for FakeNode {
        fn schedule(&mut self, kind: TimerKind, period_ms: u32, repeating: bool) -> TimerHandle {
            self.timers.schedule(kind, period_ms, repeating)
        }

        fn cancel(&mut self, handle: TimerHandle) {
            self.timers.cancel(handle);
        }
    }

    impl MotionInput for FakeNode {
        fn is_high(&self) -> bool {
            self.pir_high
        }
    }

    /// Fire every timer due up to `until_ms`, in order, and collect the
    /// transitions.
    fn run_until(agg: &mut PresenceAggregator, node: &mut FakeNode, until_ms: u64) -> Vec<Transition> {
        let mut fired = Vec::new();
        while let Some(deadline) = node.timers.next_deadline() {
            if deadline > until_ms {
                break;
            }
            node.timers.advance_to(deadline);
            while let Some(kind) = node.timers.pop_due() {
                fired.push(agg.on_timer(kind, node));
            }
        }
        node.timers.advance_to(until_ms);
        fired
    }

    fn count_broadcasts(transitions: &[Transition]) -> usize {
        transitions
            .iter()
            .filter(|t| matches!(t, Transition::Broadcast { .. }))
            .count()
    }

    #[test]
    fn boots_dormant() {
        let agg = PresenceAggregator::default();
        assert_eq!(agg.state(), NodeState::Dormant);
        assert_eq!(agg.snapshot(), Snapshot::dormant());
        assert!(!agg.is_broadcasting());
    }

    #[test]
    fn first_detection_activates_and_broadcasts() {
        let mut agg = PresenceAggregator::default();
        let mut node = FakeNode::new();

        assert_eq!(agg.on_detection(&mut node), Transition::Activated { sequence: 0 });
        assert!(agg.is_active());

        let packet = node.last_sent();
        assert_eq!(packet.sequence(), 0);
        assert_eq!(packet.slots(), &[1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(node.on_air);

        assert!(node.timers.is_scheduled(TimerKind::Slice));
        assert!(node.timers.is_scheduled(TimerKind::Minute));
        assert!(node.timers.is_scheduled(TimerKind::BroadcastWindow));
        assert_eq!(node.timers.pending(), 3);
    }

    #[test]
    fn first_packet_window_closes_node_stays_active() {
        let mut agg = PresenceAggregator::default();
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);

        let fired = run_until(&mut agg, &mut node, 1_000);
        assert_eq!(fired, [Transition::WindowClosed]);
        assert!(!node.on_air);
        assert_eq!(node.stops, 1);
        assert!(agg.is_active());
        assert!(!agg.is_broadcasting());
        assert_eq!(node.sent.len(), 1);
    }

    #[test]
    fn detections_in_one_slice_saturate() {
        let mut agg = PresenceAggregator::default();
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);
        run_until(&mut agg, &mut node, 5_900 * 2);

        assert_eq!(agg.snapshot().slice_index, 2);
        assert_eq!(agg.on_detection(&mut node), Transition::Counted { slot: 2, value: 1 });
        let once = *agg.packet();
        assert_eq!(agg.on_detection(&mut node), Transition::Counted { slot: 2, value: 1 });
        assert_eq!(agg.packet(), &once);
        assert_eq!(agg.packet().slot(2), 1);
        // activation + two detections
        assert_eq!(agg.snapshot().detections, 3);
    }

    #[test]
    fn active_detection_does_not_transmit() {
        let mut agg = PresenceAggregator::default();
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);
        agg.on_detection(&mut node);
        agg.on_detection(&mut node);
        assert_eq!(node.sent.len(), 1);
    }

    #[test]
    fn every_slice_can_be_marked() {
        let mut agg = PresenceAggregator::default();
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);

        for i in 0..SLOT_COUNT as u64 {
            run_until(&mut agg, &mut node, i * 5_900 + 100);
            agg.on_detection(&mut node);
        }
        assert_eq!(agg.packet().slots(), &[1; SLOT_COUNT]);
    }

    #[test]
    fn count_policy_tracks_detections_per_slice() {
        let config = AggregatorConfig::new().with_slot_policy(SlotPolicy::Count);
        let mut agg = PresenceAggregator::new(config);
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);
        agg.on_detection(&mut node);
        assert_eq!(agg.on_detection(&mut node), Transition::Counted { slot: 0, value: 3 });
    }

    #[test]
    fn detection_in_slice_three_lands_in_slot_three() {
        let mut agg = PresenceAggregator::default();
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);

        // First minute: close it so the next packet starts clean.
        let fired = run_until(&mut agg, &mut node, 60_000);
        assert_eq!(count_broadcasts(&fired), 1);
        let first_seq = node.last_sent().sequence();

        // Slice 3 of the second minute starts at 60 000 + 3 * 5 900.
        run_until(&mut agg, &mut node, 60_000 + 3 * 5_900 + 10);
        assert_eq!(agg.snapshot().slice_index, 3);
        agg.on_detection(&mut node);

        run_until(&mut agg, &mut node, 60_000 + 4 * 5_900 + 10);
        assert_eq!(agg.snapshot().slice_index, 4);

        let fired = run_until(&mut agg, &mut node, 120_000);
        let broadcast = fired
            .iter()
            .find(|t| matches!(t, Transition::Broadcast { .. }))
            .copied()
            .expect("minute broadcast");
        assert_eq!(
            broadcast,
            Transition::Broadcast {
                sequence: first_seq.wrapping_add(1),
                slots: [0, 0, 0, 1, 0, 0, 0, 0, 0, 0],
                detections: 1,
                empty_minutes: 0,
            }
        );

        let packet = node.last_sent();
        assert_eq!(packet.slots(), &[0, 0, 0, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(packet.sequence(), first_seq.wrapping_add(1));

        // counters reset, fresh packet, both timers re-armed
        let snap = agg.snapshot();
        assert_eq!(snap.slice_index, 0);
        assert_eq!(snap.detections, 0);
        assert_eq!(agg.packet().slots(), &[0; SLOT_COUNT]);
        assert!(node.timers.is_scheduled(TimerKind::Slice));
        assert!(node.timers.is_scheduled(TimerKind::Minute));
        assert_eq!(node.timers.next_deadline(), Some(121_000));
    }

    #[test]
    fn first_minute_packet_keeps_activation_slot() {
        let mut agg = PresenceAggregator::default();
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);

        run_until(&mut agg, &mut node, 60_000);
        let packet = node.last_sent();
        assert_eq!(packet.sequence(), 1);
        assert_eq!(packet.slots(), &[1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(node.sent.len(), 2);
    }

    #[test]
    fn sequence_increments_once_per_transmission() {
        let mut agg = PresenceAggregator::default();
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);

        for minute in 1..=5u64 {
            run_until(&mut agg, &mut node, minute * 60_000 - 30_000);
            agg.on_detection(&mut node);
            run_until(&mut agg, &mut node, minute * 60_000);
        }

        let sequences: Vec<u8> = node.sent.iter().map(|p| p.sequence()).collect();
        assert_eq!(sequences, [0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn sequence_wraps_after_255() {
        let mut agg = PresenceAggregator::default();
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);

        for minute in 1..=300u64 {
            run_until(&mut agg, &mut node, minute * 60_000 - 1);
            agg.on_detection(&mut node);
            run_until(&mut agg, &mut node, minute * 60_000);
        }

        assert_eq!(node.sent.len(), 301);
        for pair in node.sent.windows(2) {
            assert_eq!(pair[1].sequence(), pair[0].sequence().wrapping_add(1));
        }
        assert_eq!(node.sent[255].sequence(), 255);
        assert_eq!(node.sent[256].sequence(), 0);
        assert!(agg.is_active());
    }

    #[test]
    fn empty_minutes_count_and_reset() {
        let mut agg = PresenceAggregator::default();
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);

        // Minute 1 holds the activation detection; minutes 2-4 are empty.
        run_until(&mut agg, &mut node, 4 * 60_000);
        assert_eq!(agg.snapshot().empty_minutes, 3);

        agg.on_detection(&mut node);
        run_until(&mut agg, &mut node, 5 * 60_000);
        assert_eq!(agg.snapshot().empty_minutes, 0);
        assert!(agg.is_active());
    }

    #[test]
    fn tenth_empty_minute_goes_dormant_without_sending() {
        let mut agg = PresenceAggregator::default();
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);

        // Minute 1 (activation) plus nine empty minutes all broadcast.
        let fired = run_until(&mut agg, &mut node, 10 * 60_000);
        assert_eq!(count_broadcasts(&fired), 10);
        assert_eq!(agg.snapshot().empty_minutes, 9);
        assert!(agg.is_active());
        let sent_before = node.sent.len();

        let fired = run_until(&mut agg, &mut node, 11 * 60_000);
        assert_eq!(fired.last(), Some(&Transition::WentDormant { empty_minutes: 10 }));
        assert_eq!(count_broadcasts(&fired), 0);
        assert_eq!(node.sent.len(), sent_before);

        assert_eq!(agg.state(), NodeState::Dormant);
        assert_eq!(node.timers.pending(), 0);
        assert_eq!(agg.snapshot(), Snapshot::dormant());

        // nothing fires while dormant
        assert!(run_until(&mut agg, &mut node, 30 * 60_000).is_empty());
    }

    #[test]
    fn wake_after_dormancy_restarts_sequence() {
        let mut agg = PresenceAggregator::default();
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);
        run_until(&mut agg, &mut node, 11 * 60_000);
        assert!(!agg.is_active());
        assert!(node.last_sent().sequence() > 0);

        assert_eq!(agg.on_detection(&mut node), Transition::Activated { sequence: 0 });
        assert_eq!(node.last_sent().sequence(), 0);
        assert_eq!(node.last_sent().slots(), &[1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn custom_threshold_shortens_absence() {
        let config = AggregatorConfig::new().with_absence_threshold(2);
        let mut agg = PresenceAggregator::new(config);
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);

        let fired = run_until(&mut agg, &mut node, 3 * 60_000);
        assert_eq!(count_broadcasts(&fired), 2);
        assert_eq!(fired.last(), Some(&Transition::WentDormant { empty_minutes: 2 }));
    }

    #[test]
    fn dormancy_closes_open_broadcast_window() {
        let config = AggregatorConfig::new()
            .with_absence_threshold(1)
            .with_broadcast_window(90_000);
        let mut agg = PresenceAggregator::new(config);
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);

        // minute 1 broadcasts, minute 2 is empty and crosses the threshold
        run_until(&mut agg, &mut node, 2 * 60_000);
        assert!(!agg.is_active());
        assert!(!agg.is_broadcasting());
        assert!(!node.on_air);
        assert_eq!(node.timers.pending(), 0);
    }

    #[test]
    fn slice_tick_recovers_missed_edge() {
        let mut agg = PresenceAggregator::default();
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);
        run_until(&mut agg, &mut node, 5_900);

        node.pir_high = true;
        let fired = run_until(&mut agg, &mut node, 2 * 5_900);
        assert_eq!(fired, [Transition::SliceAdvanced { index: 2, recovered: true }]);
        assert_eq!(agg.packet().slot(1), 1);
        // recovery marks the slot but is not a detection
        assert_eq!(agg.snapshot().detections, 1);
    }

    #[test]
    fn slice_tick_does_not_touch_marked_slot() {
        let config = AggregatorConfig::new().with_slot_policy(SlotPolicy::Count);
        let mut agg = PresenceAggregator::new(config);
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);
        agg.on_detection(&mut node);

        node.pir_high = true;
        let fired = run_until(&mut agg, &mut node, 5_900);
        assert!(fired.contains(&Transition::SliceAdvanced { index: 1, recovered: false }));
        assert_eq!(agg.packet().slot(0), 2);
    }

    #[test]
    fn compensated_slices_finish_before_minute() {
        let mut agg = PresenceAggregator::default();
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);

        run_until(&mut agg, &mut node, 59_000);
        assert_eq!(agg.snapshot().slice_index, 10);
        assert!(!node.timers.is_scheduled(TimerKind::Slice));

        // the last second of the minute has no slot
        assert_eq!(agg.on_detection(&mut node), Transition::Clamped);
        assert_eq!(agg.snapshot().detections, 2);

        let fired = run_until(&mut agg, &mut node, 60_000);
        match fired.as_slice() {
            [Transition::Broadcast { detections, .. }] => assert_eq!(*detections, 2),
            other => panic!("unexpected transitions: {other:?}"),
        }
    }

    #[test]
    fn exact_slices_race_minute_tick() {
        let mut agg = PresenceAggregator::new(AggregatorConfig::new().exact_slices());
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);

        run_until(&mut agg, &mut node, 59_999);
        assert_eq!(agg.snapshot().slice_index, 9);
        assert!(node.timers.is_scheduled(TimerKind::Slice));

        // The tenth slice tick is due together with the minute tick; the
        // minute was scheduled first, fires first and cancels it.
        let fired = run_until(&mut agg, &mut node, 60_000);
        assert_eq!(count_broadcasts(&fired), 1);
        assert!(!fired.iter().any(|t| matches!(t, Transition::SliceAdvanced { .. })));
        assert_eq!(agg.snapshot().slice_index, 0);

        // the next minute runs on the exact grid
        run_until(&mut agg, &mut node, 66_000);
        assert_eq!(agg.snapshot().slice_index, 1);
    }

    #[test]
    fn timers_while_dormant_are_ignored() {
        let mut agg = PresenceAggregator::default();
        let mut node = FakeNode::new();
        assert_eq!(agg.on_slice_tick(&mut node), Transition::Ignored);
        assert_eq!(agg.on_minute_tick(&mut node), Transition::Ignored);
        assert!(node.sent.is_empty());
        assert_eq!(node.timers.pending(), 0);
        assert!(!agg.is_active());
    }

    #[test]
    fn timer_handles_never_leak() {
        let mut agg = PresenceAggregator::default();
        let mut node = FakeNode::new();
        agg.on_detection(&mut node);

        for minute in 1..=20u64 {
            if minute % 3 == 0 {
                run_until(&mut agg, &mut node, minute * 60_000 - 20_000);
                agg.on_detection(&mut node);
            }
            run_until(&mut agg, &mut node, minute * 60_000 + 500);
            assert!(node.timers.pending() <= 3);
            if agg.is_active() {
                assert!(node.timers.is_scheduled(TimerKind::Minute));
            } else {
                assert_eq!(node.timers.pending(), 0);
            }
        }
    }
}
