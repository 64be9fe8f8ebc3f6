//! Memory-mapped I2C register block for STM32F4
//!
//! [`MmioI2c`] is the on-target [`I2cRegisters`] backend: it owns one of
//! the device crate's I2C peripherals and maps each named register onto
//! its register block. The transaction logic lives in `kestrel-drivers`.

use kestrel_hal::regs::{I2cReg, I2cRegisters};
use stm32f4::stm32f401::{i2c1::RegisterBlock, I2C1, I2C2, I2C3};

use crate::gpio::{Pin, Port};

/// I2C peripheral instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cInstance {
    I2c1,
    I2c2,
    I2c3,
}

impl I2cInstance {
    /// Default (SCL, SDA) pins
    pub const fn pins(self) -> (Pin, Pin) {
        match self {
            I2cInstance::I2c1 => (Pin::new(Port::B, 6), Pin::new(Port::B, 7)),
            I2cInstance::I2c2 => (Pin::new(Port::B, 10), Pin::new(Port::B, 11)),
            I2cInstance::I2c3 => (Pin::new(Port::A, 8), Pin::new(Port::C, 9)),
        }
    }

    /// Look up an instance by its 1-based number
    pub const fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(I2cInstance::I2c1),
            2 => Some(I2cInstance::I2c2),
            3 => Some(I2cInstance::I2c3),
            _ => None,
        }
    }
}

enum Peripheral {
    I2c1(I2C1),
    I2c2(I2C2),
    I2c3(I2C3),
}

/// Memory-mapped I2C registers
pub struct MmioI2c {
    peripheral: Peripheral,
}

impl MmioI2c {
    /// Which peripheral this block belongs to
    pub fn instance(&self) -> I2cInstance {
        match self.peripheral {
            Peripheral::I2c1(_) => I2cInstance::I2c1,
            Peripheral::I2c2(_) => I2cInstance::I2c2,
            Peripheral::I2c3(_) => I2cInstance::I2c3,
        }
    }

    fn block(&self) -> &RegisterBlock {
        match &self.peripheral {
            Peripheral::I2c1(i2c) => &**i2c,
            Peripheral::I2c2(i2c) => &**i2c,
            Peripheral::I2c3(i2c) => &**i2c,
        }
    }
}

impl From<I2C1> for MmioI2c {
    fn from(i2c: I2C1) -> Self {
        Self {
            peripheral: Peripheral::I2c1(i2c),
        }
    }
}

impl From<I2C2> for MmioI2c {
    fn from(i2c: I2C2) -> Self {
        Self {
            peripheral: Peripheral::I2c2(i2c),
        }
    }
}

impl From<I2C3> for MmioI2c {
    fn from(i2c: I2C3) -> Self {
        Self {
            peripheral: Peripheral::I2c3(i2c),
        }
    }
}

// Raw `bits` writes: the engine composes whole register values itself
impl I2cRegisters for MmioI2c {
    #[inline]
    fn read(&mut self, reg: I2cReg) -> u32 {
        let i2c = self.block();
        match reg {
            I2cReg::Cr1 => i2c.cr1.read().bits(),
            I2cReg::Cr2 => i2c.cr2.read().bits(),
            I2cReg::Oar1 => i2c.oar1.read().bits(),
            I2cReg::Oar2 => i2c.oar2.read().bits(),
            I2cReg::Dr => i2c.dr.read().bits(),
            I2cReg::Sr1 => i2c.sr1.read().bits(),
            I2cReg::Sr2 => i2c.sr2.read().bits(),
            I2cReg::Ccr => i2c.ccr.read().bits(),
            I2cReg::Trise => i2c.trise.read().bits(),
            I2cReg::Fltr => i2c.fltr.read().bits(),
        }
    }

    #[inline]
    fn write(&mut self, reg: I2cReg, value: u32) {
        let i2c = self.block();
        match reg {
            I2cReg::Cr1 => i2c.cr1.write(|w| unsafe { w.bits(value) }),
            I2cReg::Cr2 => i2c.cr2.write(|w| unsafe { w.bits(value) }),
            I2cReg::Oar1 => i2c.oar1.write(|w| unsafe { w.bits(value) }),
            I2cReg::Oar2 => i2c.oar2.write(|w| unsafe { w.bits(value) }),
            I2cReg::Dr => i2c.dr.write(|w| unsafe { w.bits(value) }),
            I2cReg::Sr1 => i2c.sr1.write(|w| unsafe { w.bits(value) }),
            // Read-only
            I2cReg::Sr2 => {}
            I2cReg::Ccr => i2c.ccr.write(|w| unsafe { w.bits(value) }),
            I2cReg::Trise => i2c.trise.write(|w| unsafe { w.bits(value) }),
            I2cReg::Fltr => i2c.fltr.write(|w| unsafe { w.bits(value) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_pins() {
        let (scl, sda) = I2cInstance::I2c3.pins();
        assert_eq!(scl, Pin::new(Port::A, 8));
        assert_eq!(sda, Pin::new(Port::C, 9));
    }

    #[test]
    fn test_from_number() {
        assert_eq!(I2cInstance::from_number(2), Some(I2cInstance::I2c2));
        assert_eq!(I2cInstance::from_number(0), None);
        assert_eq!(I2cInstance::from_number(4), None);
    }
}
