/// Presence advertisement payload.
///
/// Fixed 30-byte layout, broadcast as manufacturer-specific data:
///
/// ```text
/// +------+---------+--------------+-----+----------------+-------------+
/// | 0xFF | 0A 00   | 10 x 0x00    | seq | 10 slot bytes  | 7 x 0x00    |
/// +------+---------+--------------+-----+----------------+-------------+
///  0      1         3              13    14               24          30
/// ```
///
/// Each slot covers one six-second slice of the current minute.

/// AD type for manufacturer-specific data
pub const AD_TYPE_MANUFACTURER: u8 = 0xFF;

/// CSR company identifier, sent little-endian
pub const COMPANY_ID: u16 = 0x000A;

/// Number of slices (and slot bytes) per minute window
pub const SLOT_COUNT: usize = 10;

/// Encoded payload size in bytes
pub const PACKET_LEN: usize = 30;

/// Payload plus its leading AD length byte. Exactly fills a legacy
/// advertisement.
pub const AD_STRUCTURE_LEN: usize = PACKET_LEN + 1;

const COMPANY_OFFSET: usize = 1;
const SEQUENCE_OFFSET: usize = 13;
const SLOTS_OFFSET: usize = 14;
const TRAILER_OFFSET: usize = SLOTS_OFFSET + SLOT_COUNT;

/// How a detection is folded into its slot byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPolicy {
    /// Slot is a 0/1 "motion seen" flag
    Flag,
    /// Slot counts detections, saturating at 255
    Count,
}

impl SlotPolicy {
    #[inline]
    pub fn apply(self, value: u8) -> u8 {
        match self {
            SlotPolicy::Flag => 1,
            SlotPolicy::Count => value.saturating_add(1),
        }
    }
}

/// One minute of presence data.
///
/// Only the sequence number and slots are stored; the header and reserved
/// regions are produced by [`to_bytes`](Self::to_bytes) and are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresencePacket {
    sequence: u8,
    slots: [u8; SLOT_COUNT],
}

impl PresencePacket {
    /// All-zero packet with sequence 0.
    pub const fn new() -> Self {
        Self::with_sequence(0)
    }

    pub const fn with_sequence(sequence: u8) -> Self {
        Self {
            sequence,
            slots: [0; SLOT_COUNT],
        }
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn set_sequence(&mut self, sequence: u8) {
        self.sequence = sequence;
    }

    pub fn slots(&self) -> &[u8; SLOT_COUNT] {
        &self.slots
    }

    /// Slot value, or 0 for an index past the last slice.
    pub fn slot(&self, index: usize) -> u8 {
        self.slots.get(index).copied().unwrap_or(0)
    }

    /// Fold one detection into slot `index` and return the new value.
    ///
    /// Returns `None` without touching the packet when `index` is past the
    /// last slice.
    pub fn record(&mut self, index: usize, policy: SlotPolicy) -> Option<u8> {
        let slot = self.slots.get_mut(index)?;
        *slot = policy.apply(*slot);
        Some(*slot)
    }

    /// Number of slices with any activity.
    pub fn active_slices(&self) -> usize {
        self.slots.iter().filter(|&&v| v != 0).count()
    }

    /// Wire encoding.
    pub fn to_bytes(&self) -> [u8; PACKET_LEN] {
        let mut buf = [0u8; PACKET_LEN];
        buf[0] = AD_TYPE_MANUFACTURER;
        buf[COMPANY_OFFSET..COMPANY_OFFSET + 2].copy_from_slice(&COMPANY_ID.to_le_bytes());
        buf[SEQUENCE_OFFSET] = self.sequence;
        buf[SLOTS_OFFSET..TRAILER_OFFSET].copy_from_slice(&self.slots);
        buf
    }

    /// Payload as a single AD structure.
    pub fn to_ad_structure(&self) -> [u8; AD_STRUCTURE_LEN] {
        ad_structure(&self.to_bytes())
    }

    /// Decode a payload as seen by a receiver.
    ///
    /// Rejects a wrong length, AD type or company id, and any non-zero
    /// reserved byte.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() != PACKET_LEN || data[0] != AD_TYPE_MANUFACTURER {
            return None;
        }
        let company = u16::from_le_bytes([data[COMPANY_OFFSET], data[COMPANY_OFFSET + 1]]);
        if company != COMPANY_ID {
            return None;
        }
        let header = &data[COMPANY_OFFSET + 2..SEQUENCE_OFFSET];
        let trailer = &data[TRAILER_OFFSET..];
        if header.iter().chain(trailer).any(|&b| b != 0) {
            return None;
        }

        let mut slots = [0u8; SLOT_COUNT];
        slots.copy_from_slice(&data[SLOTS_OFFSET..TRAILER_OFFSET]);
        Some(Self {
            sequence: data[SEQUENCE_OFFSET],
            slots,
        })
    }
}

/// Prefix an encoded payload with its AD length byte:
/// `[30, 0xFF, company.., data..]`.
pub fn ad_structure(payload: &[u8; PACKET_LEN]) -> [u8; AD_STRUCTURE_LEN] {
    let mut buf = [0u8; AD_STRUCTURE_LEN];
    buf[0] = PACKET_LEN as u8;
    buf[1..].copy_from_slice(payload);
    buf
}

impl Default for PresencePacket {
    fn default() -> Self {
        Self::new()
    }
}
