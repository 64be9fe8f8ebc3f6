//! Kestrel Hardware Abstraction Layer
//!
//! This crate defines the seams between the bus/display logic and the
//! chip-specific code that touches silicon. The same engine and display
//! driver run against the memory-mapped STM32F4 backend on target and
//! against an in-memory simulation on the host.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  kestrel-display (frame buffer, SH1106) │
//! └─────────────────────────────────────────┘
//!                     │ I2cBus
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  kestrel-drivers (I2C engine)           │
//! └─────────────────────────────────────────┘
//!                     │ I2cRegisters
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ kestrel-hal-  │       │  simulated    │
//! │   stm32f4     │       │  registers    │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Modules
//!
//! - [`i2c`] - Bus-level trait, addressing, errors and configuration
//! - [`regs`] - Named register block of the I2C peripheral
//! - [`poll`] - The one bounded-retry helper every status wait goes through
//! - [`timing`] - Monotonic tick source abstraction

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod i2c;
pub mod poll;
pub mod regs;
pub mod timing;

// Re-export key types at crate root for convenience
pub use i2c::{BusSpeed, DeviceAddress, Direction, I2cBus, I2cConfig, I2cError, I2cTiming};
pub use poll::{poll_until, PollTimeout};
pub use regs::{I2cReg, I2cRegisters};
pub use timing::TickSource;
