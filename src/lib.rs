//! pirbeacon library — portable presence aggregation engine.
//!
//! Turns PIR motion interrupts into a fixed 30-byte BLE advertisement that
//! summarises, per six-second slice, whether motion was seen during the last
//! minute. The node stays silent until the first detection and goes back to
//! sleep after ten consecutive empty minutes.
//!
//! All state and policy live here with no platform dependencies, testable on
//! any host with `cargo test`. The ESP32 firmware binary is a thin consumer
//! that supplies GPIO, a clock and the radio through the traits in
//! [`platform`].
//!
//! Modules:
//! - `packet`, `config`, `platform`, `timers`, `aggregator`: the core,
//!   `no_std`, no allocator.
//! - `protocol`, `comm`: NDJSON reporting over the serial log.
//! - `board`: pin assignments per supported board.

#![cfg_attr(not(test), no_std)]

pub mod aggregator;
pub mod board;
pub mod comm;
pub mod config;
pub mod packet;
pub mod platform;
pub mod protocol;
pub mod timers;
