//! Bus driver implementations
//!
//! This crate provides the concrete I2C controller built on the register
//! abstraction in kestrel-hal:
//!
//! - Transaction engine (start/address/data/stop sequencing with bounded polls)
//! - Addressed register and raw transfer operations via [`kestrel_hal::I2cBus`]
//! - `embedded-hal` I2C adapter for third-party drivers
//! - Simulated register block for host tests

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

// This must go first so the macros are visible to the other modules
mod fmt;

pub mod i2c;

pub use i2c::{BusState, I2cEngine};
