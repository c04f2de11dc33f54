/// Hardware abstraction for supported boards.
///
/// Each board module defines pin assignments and capabilities
/// selected at compile time via feature flags.

#[cfg(feature = "board-xiao")]
mod hw {
    pub const PIR_PIN: u8 = 1; // D0
    pub const PIR_PULL_DOWN: bool = true;
    pub const LED_PIN: u8 = 21; // user LED
    pub const LED_ACTIVE_LOW: bool = true;
    pub const BOARD_NAME: &str = "xiao_esp32s3";
}

#[cfg(feature = "board-m5stickc")]
mod hw {
    pub const PIR_PIN: u8 = 36; // PIR hat signal, input-only, no internal pulls
    pub const PIR_PULL_DOWN: bool = false;
    pub const LED_PIN: u8 = 19; // red LED
    pub const LED_ACTIVE_LOW: bool = false;
    pub const POWER_HOLD_PIN: u8 = 4;
    pub const BOARD_NAME: &str = "m5stickc_plus2";
}

#[cfg(not(any(feature = "board-xiao", feature = "board-m5stickc")))]
mod hw {
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;

/// Advertising interval while a packet is on air, in milliseconds.
pub const ADV_INTERVAL_MS: u64 = 100;

/// Static random address used by the broadcaster.
pub const BLE_ADDRESS: [u8; 6] = [0xff, 0x8f, 0x1a, 0x05, 0xe4, 0xab];
