//! I2C peripheral register block
//!
//! The bus engine never dereferences an address. It names a register and
//! asks a backend to read or write it; the STM32F4 HAL maps the names onto
//! the memory-mapped peripheral, tests map them onto a simulation.

/// Registers of one I2C peripheral instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cReg {
    /// Control register 1
    Cr1,
    /// Control register 2
    Cr2,
    /// Own address register 1
    Oar1,
    /// Own address register 2
    Oar2,
    /// Data register
    Dr,
    /// Status register 1
    Sr1,
    /// Status register 2
    Sr2,
    /// Clock control register
    Ccr,
    /// Rise time register
    Trise,
    /// Noise filter register
    Fltr,
}

impl I2cReg {
    /// Byte offset from the peripheral base address
    pub const fn offset(self) -> usize {
        match self {
            I2cReg::Cr1 => 0x00,
            I2cReg::Cr2 => 0x04,
            I2cReg::Oar1 => 0x08,
            I2cReg::Oar2 => 0x0C,
            I2cReg::Dr => 0x10,
            I2cReg::Sr1 => 0x14,
            I2cReg::Sr2 => 0x18,
            I2cReg::Ccr => 0x1C,
            I2cReg::Trise => 0x20,
            I2cReg::Fltr => 0x24,
        }
    }
}

/// Access to an I2C register block
///
/// `read` takes `&mut self`: several status reads have side effects on the
/// hardware (reading SR2 after SR1 clears ADDR, reading DR clears RXNE).
pub trait I2cRegisters {
    /// Read a register
    fn read(&mut self, reg: I2cReg) -> u32;

    /// Write a register
    fn write(&mut self, reg: I2cReg, value: u32);

    /// Read-modify-write a register
    fn modify(&mut self, reg: I2cReg, f: impl FnOnce(u32) -> u32) {
        let value = self.read(reg);
        self.write(reg, f(value));
    }
}

impl<T: I2cRegisters + ?Sized> I2cRegisters for &mut T {
    fn read(&mut self, reg: I2cReg) -> u32 {
        (**self).read(reg)
    }

    fn write(&mut self, reg: I2cReg, value: u32) {
        (**self).write(reg, value)
    }
}

/// CR1 bits
pub mod cr1 {
    /// Peripheral enable
    pub const PE: u32 = 1 << 0;
    /// Generate START
    pub const START: u32 = 1 << 8;
    /// Generate STOP
    pub const STOP: u32 = 1 << 9;
    /// ACK the next received byte
    pub const ACK: u32 = 1 << 10;
    /// Software reset
    pub const SWRST: u32 = 1 << 15;
}

/// SR1 bits
pub mod sr1 {
    /// START condition generated
    pub const SB: u32 = 1 << 0;
    /// Address sent and matched
    pub const ADDR: u32 = 1 << 1;
    /// Byte transfer finished
    pub const BTF: u32 = 1 << 2;
    /// Receive data register not empty
    pub const RXNE: u32 = 1 << 6;
    /// Transmit data register empty
    pub const TXE: u32 = 1 << 7;
    /// Acknowledge failure (rc_w0)
    pub const AF: u32 = 1 << 10;
}

/// SR2 bits
pub mod sr2 {
    /// Controller mode
    pub const MSL: u32 = 1 << 0;
    /// Bus busy
    pub const BUSY: u32 = 1 << 1;
}

/// CCR bits
pub mod ccr {
    /// Fast mode select
    pub const FS: u32 = 1 << 15;
    /// Fast mode duty cycle (16/9 when set)
    pub const DUTY: u32 = 1 << 14;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Block([u32; 10]);

    impl I2cRegisters for Block {
        fn read(&mut self, reg: I2cReg) -> u32 {
            self.0[reg.offset() / 4]
        }

        fn write(&mut self, reg: I2cReg, value: u32) {
            self.0[reg.offset() / 4] = value;
        }
    }

    #[test]
    fn test_offsets_match_reference_manual() {
        assert_eq!(I2cReg::Dr.offset(), 0x10);
        assert_eq!(I2cReg::Sr2.offset(), 0x18);
        assert_eq!(I2cReg::Fltr.offset(), 0x24);
    }

    #[test]
    fn test_modify_preserves_other_bits() {
        let mut block = Block([0; 10]);
        block.write(I2cReg::Cr1, cr1::PE);
        block.modify(I2cReg::Cr1, |v| v | cr1::START);
        assert_eq!(block.read(I2cReg::Cr1), cr1::PE | cr1::START);
    }
}
