//! Frame buffer and SH1106 OLED driver for Kestrel
//!
//! This crate provides:
//! - [`FrameBuffer`]: a 1-bit page-organised buffer that tracks which pages
//!   changed since they were last sent, usable as an `embedded-graphics`
//!   draw target
//! - [`Sh1106`]: the display driver that initializes the panel and flushes
//!   only the dirty pages over any [`kestrel_hal::I2cBus`]
//!
//! # Example
//!
//! ```ignore
//! let mut oled = Sh1106::new(engine, Sh1106Config::default());
//! oled.init()?;
//! loop {
//!     oled.draw_rectangle(x, y, 8, 8, true);
//!     let report = oled.flush();
//!     // failed pages stay dirty and go out again next frame
//! }
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

// This mod MUST go first, so that the others see its macros.
mod fmt;

pub mod framebuffer;
pub mod sh1106;

// Re-export key types
pub use framebuffer::{DirtyMask, FrameBuffer};
pub use sh1106::{FlushReport, Sh1106, Sh1106Config};
