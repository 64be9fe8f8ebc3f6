//! GPIO pin muxing for STM32F4
//!
//! Only what the I2C bus needs: switching a pin to an alternate function
//! with open-drain output, pull-up and high slew rate.

use stm32f4::stm32f401::{GPIOA, GPIOB, GPIOC, RCC};

use crate::i2c::I2cInstance;

/// GPIO port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Port {
    A,
    B,
    C,
}

/// A single pin on a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pin {
    pub port: Port,
    pub index: u8,
}

impl Pin {
    pub const fn new(port: Port, index: u8) -> Self {
        Self { port, index }
    }
}

/// The GPIO ports an I2C instance can be routed to
pub struct Ports<'a> {
    pub a: &'a GPIOA,
    pub b: &'a GPIOB,
    pub c: &'a GPIOC,
}

const MODE_ALTERNATE: u32 = 0b10;
const SPEED_HIGH: u32 = 0b10;
const PULL_UP: u32 = 0b01;

/// Alternate function number of I2C1..3 on every pin they use
pub const AF_I2C: u8 = 4;

/// Replace the `width`-bit field of pin `index` in a packed register
pub(crate) const fn set_field(value: u32, index: u8, width: u32, field: u32) -> u32 {
    let shift = index as u32 * width;
    let mask = ((1 << width) - 1) << shift;
    (value & !mask) | ((field << shift) & mask)
}

// Each port has its own register block type, with the same layout
macro_rules! open_drain_af {
    ($gpio:expr, $index:expr, $af:expr) => {{
        let gpio = $gpio;
        let index: u8 = $index;
        let af = u32::from($af);

        // AF number before MODER so the pin never glitches onto a wrong function
        if index < 8 {
            gpio.afrl
                .modify(|r, w| unsafe { w.bits(set_field(r.bits(), index, 4, af)) });
        } else {
            gpio.afrh
                .modify(|r, w| unsafe { w.bits(set_field(r.bits(), index - 8, 4, af)) });
        }
        gpio.otyper
            .modify(|r, w| unsafe { w.bits(r.bits() | (1 << index)) });
        gpio.ospeedr
            .modify(|r, w| unsafe { w.bits(set_field(r.bits(), index, 2, SPEED_HIGH)) });
        gpio.pupdr
            .modify(|r, w| unsafe { w.bits(set_field(r.bits(), index, 2, PULL_UP)) });
        gpio.moder
            .modify(|r, w| unsafe { w.bits(set_field(r.bits(), index, 2, MODE_ALTERNATE)) });
    }};
}

/// Put a pin into open-drain alternate function mode with pull-up
///
/// The port clock must already be enabled.
pub fn configure_open_drain_af(ports: &Ports<'_>, pin: Pin, af: u8) {
    match pin.port {
        Port::A => open_drain_af!(ports.a, pin.index, af),
        Port::B => open_drain_af!(ports.b, pin.index, af),
        Port::C => open_drain_af!(ports.c, pin.index, af),
    }
}

/// Mux the SCL and SDA pins of an I2C instance
///
/// Enables the port clocks, then configures both pins as AF4 open-drain
/// with pull-up and high speed.
pub fn configure_i2c_pins(rcc: &RCC, ports: &Ports<'_>, instance: I2cInstance) {
    let (scl, sda) = instance.pins();
    crate::rcc::enable_gpio(rcc, scl.port);
    crate::rcc::enable_gpio(rcc, sda.port);
    configure_open_drain_af(ports, scl, AF_I2C);
    configure_open_drain_af(ports, sda, AF_I2C);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_field_two_bit() {
        assert_eq!(set_field(0, 6, 2, MODE_ALTERNATE), 0b10 << 12);
        assert_eq!(set_field(0xFFFF_FFFF, 7, 2, 0b01), 0xFFFF_FFFF & !(0b10 << 14));
    }

    #[test]
    fn test_set_field_masks_oversized_value() {
        assert_eq!(set_field(0, 0, 2, 0b111), 0b11);
    }

    #[test]
    fn test_afr_nibble() {
        // PB7 -> AF4 in AFRL bits 28..32, PB10 -> AFRH bits 8..12
        assert_eq!(set_field(0, 7, 4, AF_I2C as u32), 0x4000_0000);
        assert_eq!(set_field(0, 10 - 8, 4, AF_I2C as u32), 0x0000_0400);
    }
}
