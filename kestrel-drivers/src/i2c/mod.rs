//! I2C controller
//!
//! [`I2cEngine`] sequences the peripheral's state machine one phase at a
//! time and composes the phases into the transactions of
//! [`kestrel_hal::I2cBus`]. [`sim::SimulatedI2c`] stands in for the
//! peripheral on the host.

mod engine;
mod hal;
pub mod sim;

pub use engine::{BusState, I2cEngine};
