//! I2C transaction engine
//!
//! Drives the START / address / data / STOP phases of the bus one byte at
//! a time. Every wait on a status flag is bounded by the configured poll
//! budget, and every composite operation issues a STOP before returning,
//! whichever step failed.
//!
//! # Phases
//!
//! ```text
//! Idle ─start()─▶ StartIssued ─send_address()─▶ AddressSent
//!                     ▲                              │
//!                     │ start() (repeated)           ▼ send_byte() / receive_byte()
//!                     └────────────────────────  DataPhase
//!                                                    │
//! Idle ◀──── bus not busy ──── StopIssued ◀─stop()───┘
//! ```

use kestrel_hal::i2c::{DeviceAddress, Direction, I2cBus, I2cConfig, I2cError};
use kestrel_hal::poll::poll_until;
use kestrel_hal::regs::{cr1, sr1, sr2, I2cReg, I2cRegisters};

/// Where the engine is in the current transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusState {
    /// No transaction in progress
    Idle,
    /// START (or repeated START) generated
    StartIssued,
    /// Address byte acknowledged
    AddressSent,
    /// At least one data byte transferred
    DataPhase,
    /// STOP requested but the bus has not released yet
    StopIssued,
}

/// Blocking I2C controller over a register block
pub struct I2cEngine<R> {
    regs: R,
    config: I2cConfig,
    state: BusState,
}

impl<R: I2cRegisters> I2cEngine<R> {
    /// Create an engine over `regs`
    ///
    /// The peripheral clock and the SCL/SDA pins must already be set up;
    /// call [`init`](Self::init) before the first transfer.
    pub fn new(regs: R, config: I2cConfig) -> Self {
        Self {
            regs,
            config,
            state: BusState::Idle,
        }
    }

    /// Reset the peripheral and program the bus clock
    ///
    /// `pclk1_hz` is the APB1 clock feeding the peripheral.
    pub fn init(&mut self, pclk1_hz: u32) {
        let timing = self.config.timing(pclk1_hz);

        self.regs.write(I2cReg::Cr1, cr1::SWRST);
        self.regs.write(I2cReg::Cr1, 0);

        self.regs.write(I2cReg::Cr2, timing.freq_mhz & 0x3F);
        self.regs.write(I2cReg::Ccr, timing.ccr_register());
        self.regs.write(I2cReg::Trise, timing.trise & 0x3F);

        self.regs.modify(I2cReg::Cr1, |v| v | cr1::PE);
        self.state = BusState::Idle;

        debug!(
            "i2c init: {} MHz, ccr={}, trise={}",
            timing.freq_mhz,
            timing.ccr,
            timing.trise
        );
    }

    /// Bus configuration
    pub fn config(&self) -> &I2cConfig {
        &self.config
    }

    /// Current transaction phase
    pub fn state(&self) -> BusState {
        self.state
    }

    /// Borrow the register block
    pub fn regs(&self) -> &R {
        &self.regs
    }

    /// Mutably borrow the register block
    pub fn regs_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    /// Give the register block back
    pub fn release(self) -> R {
        self.regs
    }

    /// Wait until all bits of `mask` in `reg` are set
    fn wait_set(&mut self, reg: I2cReg, mask: u32) -> Result<u32, I2cError> {
        let regs = &mut self.regs;
        let value = poll_until(self.config.timeout_polls, || regs.read(reg) & mask == mask)?;
        Ok(value)
    }

    /// Wait until any bit of `mask` in `reg` is set, returning the register value
    fn wait_any(&mut self, reg: I2cReg, mask: u32) -> Result<u32, I2cError> {
        let regs = &mut self.regs;
        let mut last = 0;
        poll_until(self.config.timeout_polls, || {
            last = regs.read(reg);
            last & mask != 0
        })?;
        Ok(last)
    }

    /// Check and clear the acknowledge-failure flag
    fn take_nack(&mut self) -> Result<(), I2cError> {
        if self.regs.read(I2cReg::Sr1) & sr1::AF != 0 {
            // AF is rc_w0: writing zero clears it, writing one is ignored
            self.regs.write(I2cReg::Sr1, !sr1::AF);
            return Err(I2cError::Nack);
        }
        Ok(())
    }

    /// Generate a START (or repeated START) condition
    pub fn start(&mut self) -> Result<(), I2cError> {
        self.regs.modify(I2cReg::Cr1, |v| v | cr1::START);
        self.state = BusState::StartIssued;
        self.wait_set(I2cReg::Sr1, sr1::SB)?;
        Ok(())
    }

    /// Generate a STOP condition and wait for the bus to release
    pub fn stop(&mut self) -> Result<(), I2cError> {
        self.regs.modify(I2cReg::Cr1, |v| v | cr1::STOP);
        self.state = BusState::StopIssued;

        let regs = &mut self.regs;
        poll_until(self.config.timeout_polls, || {
            regs.read(I2cReg::Sr2) & sr2::BUSY == 0
        })?;

        self.state = BusState::Idle;
        Ok(())
    }

    /// Transmit the address byte for `direction`
    pub fn send_address(&mut self, address: DeviceAddress, direction: Direction) -> Result<(), I2cError> {
        self.regs
            .write(I2cReg::Dr, u32::from(address.frame(direction)));

        self.wait_any(I2cReg::Sr1, sr1::ADDR | sr1::AF)?;

        // ADDR is only cleared by reading SR2 after SR1
        let _ = self.regs.read(I2cReg::Sr2);

        self.take_nack()?;
        self.state = BusState::AddressSent;
        Ok(())
    }

    /// Transmit one data byte
    pub fn send_byte(&mut self, data: u8) -> Result<(), I2cError> {
        self.regs.write(I2cReg::Dr, u32::from(data));
        self.wait_any(I2cReg::Sr1, sr1::BTF | sr1::AF)?;
        self.take_nack()?;
        self.state = BusState::DataPhase;
        Ok(())
    }

    /// Receive one byte
    ///
    /// `ack` selects whether the controller acknowledges this byte; the
    /// last byte of a read must be NACKed so the peripheral releases SDA.
    pub fn receive_byte(&mut self, ack: bool) -> Result<u8, I2cError> {
        self.regs.modify(I2cReg::Cr1, |v| {
            if ack {
                v | cr1::ACK
            } else {
                v & !cr1::ACK
            }
        });

        self.wait_set(I2cReg::Sr1, sr1::RXNE)?;
        self.state = BusState::DataPhase;
        Ok(self.regs.read(I2cReg::Dr) as u8)
    }

    /// START and address the device
    pub(crate) fn begin(&mut self, address: DeviceAddress, direction: Direction) -> Result<(), I2cError> {
        self.start()?;
        self.send_address(address, direction)
    }

    /// Receive into `buf`, NACKing the final byte when `nack_last` is set
    pub(crate) fn receive_into(&mut self, buf: &mut [u8], nack_last: bool) -> Result<(), I2cError> {
        let len = buf.len();
        for (i, slot) in buf.iter_mut().enumerate() {
            let last = i + 1 == len;
            *slot = self.receive_byte(!(last && nack_last))?;
        }
        Ok(())
    }

    /// Run `body` as one transaction and STOP on every exit path
    ///
    /// An error from `body` is reported in preference to one from the STOP.
    pub(crate) fn transact<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T, I2cError>,
    ) -> Result<T, I2cError> {
        let result = body(self);
        let stopped = self.stop();

        match (result, stopped) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), _) | (Ok(_), Err(e)) => {
                debug!("i2c transaction failed: {}", e);
                Err(e)
            }
        }
    }

    /// Write-phase of a register read: address the device and select `reg`
    fn select_register(&mut self, address: DeviceAddress, reg: u8) -> Result<(), I2cError> {
        self.transact(|bus| {
            bus.begin(address, Direction::Write)?;
            bus.send_byte(reg)
        })
    }
}

impl<R: I2cRegisters> I2cBus for I2cEngine<R> {
    fn write_chunks(&mut self, address: DeviceAddress, chunks: &[&[u8]]) -> Result<usize, I2cError> {
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        if total == 0 {
            return Err(I2cError::EmptyBuffer);
        }

        trace!("i2c write {=u8:#x} ({} bytes)", address.get(), total);

        self.transact(|bus| {
            bus.begin(address, Direction::Write)?;
            for &byte in chunks.iter().flat_map(|c| c.iter()) {
                bus.send_byte(byte)?;
            }
            Ok(total)
        })
    }

    fn read_registers(
        &mut self,
        address: DeviceAddress,
        reg: u8,
        buf: &mut [u8],
    ) -> Result<usize, I2cError> {
        if buf.is_empty() {
            return Err(I2cError::EmptyBuffer);
        }

        trace!("i2c read {=u8:#x} reg {=u8:#x} ({} bytes)", address.get(), reg, buf.len());

        self.select_register(address, reg)?;
        self.transact(|bus| {
            bus.begin(address, Direction::Read)?;
            bus.receive_into(buf, true)?;
            Ok(buf.len())
        })
    }

    fn read_raw_bytes(&mut self, address: DeviceAddress, buf: &mut [u8]) -> Result<usize, I2cError> {
        if buf.is_empty() {
            return Err(I2cError::EmptyBuffer);
        }

        trace!("i2c read {=u8:#x} ({} bytes)", address.get(), buf.len());

        self.transact(|bus| {
            bus.begin(address, Direction::Read)?;
            bus.receive_into(buf, true)?;
            Ok(buf.len())
        })
    }
}
