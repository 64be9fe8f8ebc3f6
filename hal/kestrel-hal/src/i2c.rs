//! I2C bus abstractions
//!
//! Provides the addressed register and raw transfer operations that
//! peripheral drivers are written against, the error taxonomy shared by
//! every bus backend, and the bus configuration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::poll::PollTimeout;

/// 7-bit I2C device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceAddress(u8);

impl DeviceAddress {
    /// Create an address, discarding anything above bit 6
    pub const fn new(address: u8) -> Self {
        Self(address & 0x7F)
    }

    /// The 7-bit address
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Address byte as it goes on the wire (address in bits 7..1, R/W in bit 0)
    pub const fn frame(self, direction: Direction) -> u8 {
        (self.0 << 1) | direction as u8
    }
}

impl From<u8> for DeviceAddress {
    fn from(address: u8) -> Self {
        Self::new(address)
    }
}

/// Transfer direction encoded in the address byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Direction {
    /// Controller transmits
    Write = 0,
    /// Controller receives
    Read = 1,
}

/// Errors returned by bus operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cError {
    /// Hardware did not reach the expected status within the poll budget.
    /// The bus may be stuck or the peripheral unresponsive; retrying is allowed.
    Timeout,
    /// Peer rejected the address or a data byte
    Nack,
    /// Caller passed a zero-length buffer
    EmptyBuffer,
}

impl From<PollTimeout> for I2cError {
    fn from(_: PollTimeout) -> Self {
        I2cError::Timeout
    }
}

impl embedded_hal::i2c::Error for I2cError {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

        match self {
            I2cError::Nack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            I2cError::Timeout | I2cError::EmptyBuffer => ErrorKind::Other,
        }
    }
}

/// I2C bus master
///
/// Every operation is a complete transaction: it starts with a START
/// condition and, whatever happens in between, ends with a STOP before
/// returning. Implementations provide the three buffer operations; the
/// single-byte forms are built on top of them and put the same bytes on
/// the wire.
pub trait I2cBus {
    /// Write the concatenation of `chunks` to a device in one transaction
    ///
    /// Returns the number of bytes transmitted. Fails with
    /// [`I2cError::EmptyBuffer`] without touching the bus if there is
    /// nothing to send.
    fn write_chunks(&mut self, address: DeviceAddress, chunks: &[&[u8]])
        -> Result<usize, I2cError>;

    /// Read `buf.len()` bytes starting at register `reg`
    ///
    /// Writes the register address, stops, then re-addresses the device
    /// for reading. Every byte but the last is ACKed.
    fn read_registers(
        &mut self,
        address: DeviceAddress,
        reg: u8,
        buf: &mut [u8],
    ) -> Result<usize, I2cError>;

    /// Read `buf.len()` bytes without a register-address phase
    fn read_raw_bytes(&mut self, address: DeviceAddress, buf: &mut [u8])
        -> Result<usize, I2cError>;

    /// Write a byte buffer to a device
    ///
    /// No register address is sent; if the peripheral needs one it must
    /// be the first byte of `bytes`.
    fn write_bytes(&mut self, address: DeviceAddress, bytes: &[u8]) -> Result<usize, I2cError> {
        self.write_chunks(address, &[bytes])
    }

    /// Write `value` into register `reg`
    fn write_register(&mut self, address: DeviceAddress, reg: u8, value: u8) -> Result<(), I2cError> {
        self.write_bytes(address, &[reg, value]).map(|_| ())
    }

    /// Write a single byte with no register-address phase
    fn write_raw(&mut self, address: DeviceAddress, byte: u8) -> Result<(), I2cError> {
        self.write_bytes(address, &[byte]).map(|_| ())
    }

    /// Read a single register; the byte is NACKed to end the transfer
    fn read_register(&mut self, address: DeviceAddress, reg: u8) -> Result<u8, I2cError> {
        let mut byte = [0u8; 1];
        self.read_registers(address, reg, &mut byte)?;
        Ok(byte[0])
    }

    /// Read a single byte with no register-address phase
    fn read_raw(&mut self, address: DeviceAddress) -> Result<u8, I2cError> {
        let mut byte = [0u8; 1];
        self.read_raw_bytes(address, &mut byte)?;
        Ok(byte[0])
    }
}

impl<T: I2cBus + ?Sized> I2cBus for &mut T {
    fn write_chunks(&mut self, address: DeviceAddress, chunks: &[&[u8]]) -> Result<usize, I2cError> {
        (**self).write_chunks(address, chunks)
    }

    fn read_registers(
        &mut self,
        address: DeviceAddress,
        reg: u8,
        buf: &mut [u8],
    ) -> Result<usize, I2cError> {
        (**self).read_registers(address, reg, buf)
    }

    fn read_raw_bytes(&mut self, address: DeviceAddress, buf: &mut [u8]) -> Result<usize, I2cError> {
        (**self).read_raw_bytes(address, buf)
    }
}

/// Bus clock profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BusSpeed {
    /// 100 kHz standard mode
    Standard,
    /// 400 kHz fast mode, 2:1 low/high duty
    Fast,
}

impl BusSpeed {
    /// SCL frequency in Hz
    pub const fn frequency(self) -> u32 {
        match self {
            BusSpeed::Standard => 100_000,
            BusSpeed::Fast => 400_000,
        }
    }
}

/// Default poll budget for every status wait
pub const DEFAULT_TIMEOUT_POLLS: u32 = 10_000;

/// I2C configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct I2cConfig {
    /// Clock profile
    pub speed: BusSpeed,
    /// Maximum number of status polls before a primitive reports `Timeout`
    pub timeout_polls: u32,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self::FAST
    }
}

impl I2cConfig {
    /// Standard mode (100 kHz)
    pub const STANDARD: Self = Self {
        speed: BusSpeed::Standard,
        timeout_polls: DEFAULT_TIMEOUT_POLLS,
    };

    /// Fast mode (400 kHz)
    pub const FAST: Self = Self {
        speed: BusSpeed::Fast,
        timeout_polls: DEFAULT_TIMEOUT_POLLS,
    };

    /// Same profile with a different poll budget
    pub const fn with_timeout_polls(self, timeout_polls: u32) -> Self {
        Self {
            speed: self.speed,
            timeout_polls,
        }
    }

    /// Clock register values for a given APB1 peripheral clock
    ///
    /// `pclk1_hz` must be between 2 MHz and 50 MHz for the peripheral to
    /// run at all; fast mode additionally needs at least 4 MHz.
    pub const fn timing(&self, pclk1_hz: u32) -> I2cTiming {
        let freq_mhz = pclk1_hz / 1_000_000;
        let scl = self.speed.frequency();

        match self.speed {
            BusSpeed::Standard => {
                let ccr = pclk1_hz / (2 * scl);
                I2cTiming {
                    freq_mhz,
                    ccr: if ccr < 4 { 4 } else { ccr },
                    fast: false,
                    trise: freq_mhz + 1,
                }
            }
            BusSpeed::Fast => {
                let ccr = pclk1_hz / (3 * scl);
                I2cTiming {
                    freq_mhz,
                    ccr: if ccr < 1 { 1 } else { ccr },
                    fast: true,
                    trise: freq_mhz * 300 / 1000 + 1,
                }
            }
        }
    }
}

/// Values for the CR2, CCR and TRISE registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cTiming {
    /// APB1 clock in MHz (CR2.FREQ)
    pub freq_mhz: u32,
    /// Clock control divider (CCR.CCR, 12 bits)
    pub ccr: u32,
    /// Fast mode select (CCR.F/S)
    pub fast: bool,
    /// Maximum rise time in APB1 cycles plus one
    pub trise: u32,
}

impl I2cTiming {
    /// Value to program into CCR
    pub const fn ccr_register(&self) -> u32 {
        let ccr = self.ccr & 0x0FFF;
        if self.fast {
            ccr | crate::regs::ccr::FS
        } else {
            ccr
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_address_frame() {
        let addr = DeviceAddress::new(0x3C);
        assert_eq!(addr.frame(Direction::Write), 0x78);
        assert_eq!(addr.frame(Direction::Read), 0x79);
    }

    #[test]
    fn test_address_masks_to_seven_bits() {
        assert_eq!(DeviceAddress::new(0xBC).get(), 0x3C);
    }

    #[test]
    fn test_fast_mode_timing_42mhz() {
        let timing = I2cConfig::FAST.timing(42_000_000);
        assert_eq!(timing.freq_mhz, 42);
        assert_eq!(timing.ccr, 35);
        assert!(timing.fast);
        assert_eq!(timing.trise, 13);
        assert_eq!(timing.ccr_register(), (1 << 15) | 35);
    }

    #[test]
    fn test_standard_mode_timing_42mhz() {
        let timing = I2cConfig::STANDARD.timing(42_000_000);
        assert_eq!(timing.ccr, 210);
        assert!(!timing.fast);
        assert_eq!(timing.trise, 43);
        assert_eq!(timing.ccr_register(), 210);
    }

    #[test]
    fn test_standard_mode_ccr_floor() {
        let timing = I2cConfig::STANDARD.timing(600_000);
        assert_eq!(timing.ccr, 4);
    }

    #[test]
    fn test_with_timeout_polls() {
        let config = I2cConfig::STANDARD.with_timeout_polls(32);
        assert_eq!(config.speed, BusSpeed::Standard);
        assert_eq!(config.timeout_polls, 32);
    }

    #[test]
    fn test_nack_maps_to_no_acknowledge() {
        use embedded_hal::i2c::{Error, ErrorKind, NoAcknowledgeSource};

        assert_eq!(
            I2cError::Nack.kind(),
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown)
        );
        assert_eq!(I2cError::Timeout.kind(), ErrorKind::Other);
    }

    proptest! {
        #[test]
        fn prop_scl_never_exceeds_profile(mhz in 4u32..=50) {
            for config in [I2cConfig::STANDARD, I2cConfig::FAST] {
                let pclk = mhz * 1_000_000;
                let timing = config.timing(pclk);
                let divisor = if timing.fast { 3 } else { 2 };
                let scl = pclk / (divisor * timing.ccr);
                // Integer division rounds CCR down, so allow the rounding step
                let limit = config.speed.frequency() * 14 / 10;
                prop_assert!(scl <= limit);
                prop_assert!(timing.ccr <= 0x0FFF);
            }
        }
    }
}
