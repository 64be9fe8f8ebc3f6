//! Simulated I2C peripheral
//!
//! An in-memory [`I2cRegisters`] backend that behaves like the STM32F4 I2C
//! block closely enough to exercise the engine on the host:
//!
//! - Setting CR1.START raises SR1.SB and marks the bus busy
//! - Writing the address byte raises SR1.ADDR (or SR1.AF when nobody answers)
//! - ADDR stays set until SR2 is read
//! - Each written data byte raises SR1.BTF (or SR1.AF when the peer NACKs)
//! - Received bytes are staged in DR with SR1.RXNE; the next byte is only
//!   staged if CR1.ACK was set when the previous one was read
//! - AF is cleared by writing zero to it
//! - Setting CR1.STOP releases the bus
//!
//! Every transfer is recorded so tests can assert on exactly what went over
//! the wire.

use heapless::Vec;
use kestrel_hal::regs::{cr1, sr1, sr2, I2cReg, I2cRegisters};

/// Maximum number of simulated devices on the bus
pub const MAX_DEVICES: usize = 4;

/// Maximum number of recorded transfers
pub const MAX_TRANSFERS: usize = 64;

/// Maximum recorded bytes per transfer
pub const MAX_TRANSFER_LEN: usize = 160;

/// How a simulated device answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Acknowledge everything
    Ack,
    /// Refuse the address byte
    NackAddress,
    /// Acknowledge the address and the first `n` data bytes of each write,
    /// then NACK
    NackAfter(usize),
    /// Never answer the address byte (neither ADDR nor AF is raised)
    Stall,
}

/// A device with a 256-byte register file
///
/// The first byte of a write sets the register pointer, further bytes are
/// stored at the pointer and advance it. Reads return bytes from the
/// pointer onwards.
#[derive(Debug, Clone)]
pub struct SimDevice {
    address: u8,
    response: Response,
    memory: [u8; 256],
    pointer: u8,
}

impl SimDevice {
    /// 7-bit address
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Change how the device answers
    pub fn set_response(&mut self, response: Response) {
        self.response = response;
    }

    /// Register file
    pub fn memory(&self) -> &[u8; 256] {
        &self.memory
    }

    /// Mutable register file
    pub fn memory_mut(&mut self) -> &mut [u8; 256] {
        &mut self.memory
    }

    /// Current register pointer
    pub fn pointer(&self) -> u8 {
        self.pointer
    }
}

/// One addressed transfer between a START and the following START or STOP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// 7-bit target address
    pub address: u8,
    /// Controller was receiving
    pub read: bool,
    /// Data bytes, in order, excluding the address byte
    pub bytes: Vec<u8, MAX_TRANSFER_LEN>,
    /// For reads: whether each received byte was ACKed by the controller
    pub acks: Vec<bool, MAX_TRANSFER_LEN>,
    /// The address or a data byte was NACKed
    pub nacked: bool,
    /// The transfer was closed by a STOP (rather than a repeated START)
    pub stopped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    AwaitAddress,
    Writing,
    Reading,
    /// Addressed but refused, or NACKed mid-write: waiting for STOP
    Rejected,
}

/// Simulated I2C register block
#[derive(Debug, Clone)]
pub struct SimulatedI2c {
    cr1: u32,
    cr2: u32,
    oar1: u32,
    oar2: u32,
    ccr: u32,
    trise: u32,
    fltr: u32,
    sr1: u32,
    sr2: u32,
    rx: u8,
    phase: Phase,
    active: Option<usize>,
    /// Bytes written since the last address byte, independent of the log
    written: usize,
    open: bool,
    devices: Vec<SimDevice, MAX_DEVICES>,
    transfers: Vec<Transfer, MAX_TRANSFERS>,
    status_reads: u32,
    starts: u32,
    stops: u32,
    stuck_start: bool,
    stuck_busy: bool,
}

impl Default for SimulatedI2c {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedI2c {
    /// Create an idle bus with no devices
    pub fn new() -> Self {
        Self {
            cr1: 0,
            cr2: 0,
            oar1: 0,
            oar2: 0,
            ccr: 0,
            trise: 0,
            fltr: 0,
            sr1: 0,
            sr2: 0,
            rx: 0,
            phase: Phase::Idle,
            active: None,
            written: 0,
            open: false,
            devices: Vec::new(),
            transfers: Vec::new(),
            status_reads: 0,
            starts: 0,
            stops: 0,
            stuck_start: false,
            stuck_busy: false,
        }
    }

    /// Put a device on the bus
    ///
    /// Devices beyond [`MAX_DEVICES`] are ignored.
    pub fn attach(&mut self, address: u8, response: Response) {
        let _ = self.devices.push(SimDevice {
            address: address & 0x7F,
            response,
            memory: [0; 256],
            pointer: 0,
        });
    }

    /// Look up a device by address
    pub fn device(&self, address: u8) -> Option<&SimDevice> {
        self.devices.iter().find(|d| d.address == address)
    }

    /// Look up a device by address, mutably
    pub fn device_mut(&mut self, address: u8) -> Option<&mut SimDevice> {
        self.devices.iter_mut().find(|d| d.address == address)
    }

    /// START never completes (SB is never raised)
    pub fn set_stuck_start(&mut self, stuck: bool) {
        self.stuck_start = stuck;
    }

    /// The bus never reports idle after a STOP
    pub fn set_stuck_busy(&mut self, stuck: bool) {
        self.stuck_busy = stuck;
    }

    /// Recorded transfers, oldest first
    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    /// Forget recorded transfers and counters
    pub fn clear_log(&mut self) {
        self.transfers.clear();
        self.status_reads = 0;
        self.starts = 0;
        self.stops = 0;
    }

    /// Number of SR1/SR2 reads so far
    pub fn status_reads(&self) -> u32 {
        self.status_reads
    }

    /// Number of START conditions (including repeated STARTs)
    pub fn starts(&self) -> u32 {
        self.starts
    }

    /// Number of STOP conditions
    pub fn stops(&self) -> u32 {
        self.stops
    }

    /// SR1 without the side effects of a register read
    pub fn sr1(&self) -> u32 {
        self.sr1
    }

    /// Bus is between START and STOP
    pub fn is_busy(&self) -> bool {
        self.sr2 & sr2::BUSY != 0
    }

    fn current(&mut self) -> Option<&mut Transfer> {
        if self.open {
            self.transfers.last_mut()
        } else {
            None
        }
    }

    fn close_transfer(&mut self, stopped: bool) {
        if let Some(transfer) = self.current() {
            transfer.stopped = stopped;
        }
        self.open = false;
    }

    fn generate_start(&mut self) {
        self.close_transfer(false);
        self.starts += 1;
        self.sr1 &= !(sr1::ADDR | sr1::BTF | sr1::RXNE | sr1::TXE);
        if !self.stuck_start {
            self.sr1 |= sr1::SB;
        }
        self.sr2 |= sr2::BUSY | sr2::MSL;
        self.phase = Phase::AwaitAddress;
        self.active = None;
    }

    fn generate_stop(&mut self) {
        self.close_transfer(true);
        self.stops += 1;
        self.sr1 &= !(sr1::SB | sr1::ADDR | sr1::BTF | sr1::RXNE | sr1::TXE);
        if !self.stuck_busy {
            self.sr2 &= !(sr2::BUSY | sr2::MSL);
        }
        self.phase = Phase::Idle;
        self.active = None;
    }

    fn address_byte(&mut self, byte: u8) {
        self.sr1 &= !sr1::SB;

        let address = byte >> 1;
        let read = byte & 1 != 0;
        self.written = 0;

        let transfer = Transfer {
            address,
            read,
            bytes: Vec::new(),
            acks: Vec::new(),
            nacked: false,
            stopped: false,
        };
        self.open = self.transfers.push(transfer).is_ok();

        let index = self.devices.iter().position(|d| d.address == address);
        let response = index.map(|i| self.devices[i].response);

        match response {
            Some(Response::Stall) => {
                self.phase = Phase::Rejected;
            }
            Some(Response::Ack) | Some(Response::NackAfter(_)) => {
                self.sr1 |= sr1::ADDR;
                self.active = index;
                self.phase = if read { Phase::Reading } else { Phase::Writing };
            }
            Some(Response::NackAddress) | None => {
                self.sr1 |= sr1::AF;
                self.phase = Phase::Rejected;
                if let Some(transfer) = self.current() {
                    transfer.nacked = true;
                }
            }
        }
    }

    fn data_byte(&mut self, byte: u8) {
        self.sr1 &= !sr1::BTF;

        let Some(index) = self.active else {
            return;
        };

        self.written += 1;
        let written = self.written;
        if let Some(transfer) = self.current() {
            let _ = transfer.bytes.push(byte);
        }

        if let Response::NackAfter(limit) = self.devices[index].response {
            if written > limit {
                self.sr1 |= sr1::AF;
                self.phase = Phase::Rejected;
                if let Some(transfer) = self.current() {
                    transfer.nacked = true;
                }
                return;
            }
        }

        let device = &mut self.devices[index];
        if written == 1 {
            device.pointer = byte;
        } else {
            device.memory[device.pointer as usize] = byte;
            device.pointer = device.pointer.wrapping_add(1);
        }
        self.sr1 |= sr1::BTF | sr1::TXE;
    }

    fn stage_rx(&mut self) {
        if let Some(index) = self.active {
            let device = &mut self.devices[index];
            self.rx = device.memory[device.pointer as usize];
            device.pointer = device.pointer.wrapping_add(1);
            self.sr1 |= sr1::RXNE;
        }
    }

    fn take_rx(&mut self) -> u8 {
        if self.phase != Phase::Reading || self.sr1 & sr1::RXNE == 0 {
            return self.rx;
        }

        self.sr1 &= !sr1::RXNE;
        let byte = self.rx;
        let ack = self.cr1 & cr1::ACK != 0;

        if let Some(transfer) = self.current() {
            let _ = transfer.bytes.push(byte);
            let _ = transfer.acks.push(ack);
        }

        if ack {
            self.stage_rx();
        }
        byte
    }
}

impl I2cRegisters for SimulatedI2c {
    fn read(&mut self, reg: I2cReg) -> u32 {
        match reg {
            I2cReg::Cr1 => self.cr1,
            I2cReg::Cr2 => self.cr2,
            I2cReg::Oar1 => self.oar1,
            I2cReg::Oar2 => self.oar2,
            I2cReg::Dr => u32::from(self.take_rx()),
            I2cReg::Sr1 => {
                self.status_reads += 1;
                self.sr1
            }
            I2cReg::Sr2 => {
                self.status_reads += 1;
                if self.sr1 & sr1::ADDR != 0 {
                    self.sr1 &= !sr1::ADDR;
                    match self.phase {
                        Phase::Reading => self.stage_rx(),
                        Phase::Writing => self.sr1 |= sr1::TXE,
                        _ => {}
                    }
                }
                self.sr2
            }
            I2cReg::Ccr => self.ccr,
            I2cReg::Trise => self.trise,
            I2cReg::Fltr => self.fltr,
        }
    }

    fn write(&mut self, reg: I2cReg, value: u32) {
        match reg {
            I2cReg::Cr1 => {
                if value & cr1::SWRST != 0 {
                    let devices = core::mem::take(&mut self.devices);
                    let transfers = core::mem::take(&mut self.transfers);
                    let (stuck_start, stuck_busy) = (self.stuck_start, self.stuck_busy);
                    *self = Self::new();
                    self.devices = devices;
                    self.transfers = transfers;
                    self.stuck_start = stuck_start;
                    self.stuck_busy = stuck_busy;
                    self.cr1 = value;
                    return;
                }

                // START and STOP are self-clearing
                self.cr1 = value & !(cr1::START | cr1::STOP);
                if value & cr1::PE == 0 {
                    return;
                }
                if value & cr1::START != 0 {
                    self.generate_start();
                }
                if value & cr1::STOP != 0 {
                    self.generate_stop();
                }
            }
            I2cReg::Cr2 => self.cr2 = value,
            I2cReg::Oar1 => self.oar1 = value,
            I2cReg::Oar2 => self.oar2 = value,
            I2cReg::Dr => {
                let byte = value as u8;
                match self.phase {
                    Phase::AwaitAddress if self.sr1 & sr1::SB != 0 => self.address_byte(byte),
                    Phase::Writing => self.data_byte(byte),
                    _ => {}
                }
            }
            I2cReg::Sr1 => {
                // AF is rc_w0, the other flags are read-only here
                if value & sr1::AF == 0 {
                    self.sr1 &= !sr1::AF;
                }
            }
            I2cReg::Sr2 => {}
            I2cReg::Ccr => self.ccr = value,
            I2cReg::Trise => self.trise = value,
            I2cReg::Fltr => self.fltr = value,
        }
    }
}
