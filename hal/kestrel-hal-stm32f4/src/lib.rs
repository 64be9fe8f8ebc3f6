//! STM32F4-specific HAL for the Kestrel firmware
//!
//! This crate provides the silicon-facing pieces the portable crates need
//! on STM32F401/F411 boards:
//!
//! - [`rcc`] - HSE + PLL clock bring-up and peripheral clock gates
//! - [`gpio`] - Pin muxing for the I2C peripherals
//! - [`i2c`] - Memory-mapped [`kestrel_hal::I2cRegisters`] backend
//! - [`dwt`] - Cycle-counter tick source and busy-wait delay
//!
//! # Features
//!
//! - `defmt` - Enable debug formatting support
//!
//! # Usage
//!
//! Bring up clocks first, then gate and mux the bus before handing the
//! register block to the engine:
//!
//! ```ignore
//! let dp = pac::Peripherals::take().unwrap();
//! let clocks = rcc::init(&dp.RCC, &dp.FLASH, &ClockConfig::default())?;
//! rcc::enable_i2c(&dp.RCC, I2cInstance::I2c1);
//! let ports = gpio::Ports { a: &dp.GPIOA, b: &dp.GPIOB, c: &dp.GPIOC };
//! gpio::configure_i2c_pins(&dp.RCC, &ports, I2cInstance::I2c1);
//! let regs = MmioI2c::from(dp.I2C1);
//! ```

#![cfg_attr(not(test), no_std)]

pub use stm32f4::stm32f401 as pac;

pub mod dwt;
pub mod gpio;
pub mod i2c;
pub mod rcc;

pub use dwt::{DwtClock, DwtDelay};
pub use i2c::{I2cInstance, MmioI2c};
pub use rcc::{ClockConfig, ClockError, Clocks};
