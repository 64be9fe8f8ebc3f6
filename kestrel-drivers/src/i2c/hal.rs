//! `embedded-hal` I2C implementation
//!
//! Lets drivers written against `embedded_hal::i2c::I2c` share the bus with
//! the display. Follows the trait's transaction contract: adjacent
//! operations of the same kind are merged, a change of direction issues a
//! repeated START, and the transaction always ends with a STOP.

use embedded_hal::i2c::{ErrorType, I2c, Operation, SevenBitAddress};
use kestrel_hal::i2c::{DeviceAddress, Direction, I2cError};
use kestrel_hal::regs::I2cRegisters;

use super::engine::I2cEngine;

impl<R: I2cRegisters> ErrorType for I2cEngine<R> {
    type Error = I2cError;
}

impl<R: I2cRegisters> I2c<SevenBitAddress> for I2cEngine<R> {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if operations.is_empty() {
            return Ok(());
        }

        let address = DeviceAddress::new(address);

        self.transact(|bus| {
            let mut current: Option<Direction> = None;

            for i in 0..operations.len() {
                let direction = direction_of(&operations[i]);
                // A read run ends (and its last byte is NACKed) when no
                // later operation of the same run carries any bytes
                let run_continues = operations[i + 1..]
                    .iter()
                    .take_while(|next| direction_of(next) == direction)
                    .any(|next| !is_empty(next));

                if current != Some(direction) {
                    bus.begin(address, direction)?;
                    current = Some(direction);
                }

                match &mut operations[i] {
                    Operation::Write(bytes) => {
                        for &byte in bytes.iter() {
                            bus.send_byte(byte)?;
                        }
                    }
                    Operation::Read(buf) => {
                        bus.receive_into(buf, !run_continues)?;
                    }
                }
            }

            Ok(())
        })
    }
}

fn direction_of(operation: &Operation<'_>) -> Direction {
    match operation {
        Operation::Read(_) => Direction::Read,
        Operation::Write(_) => Direction::Write,
    }
}

fn is_empty(operation: &Operation<'_>) -> bool {
    match operation {
        Operation::Read(buf) => buf.is_empty(),
        Operation::Write(bytes) => bytes.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use crate::i2c::sim::{Response, SimulatedI2c};
    use crate::I2cEngine;
    use embedded_hal::i2c::{I2c, Operation};
    use kestrel_hal::i2c::{I2cConfig, I2cError};

    const DEV: u8 = 0x50;

    fn engine() -> I2cEngine<SimulatedI2c> {
        let mut sim = SimulatedI2c::new();
        sim.attach(DEV, Response::Ack);
        let mut engine = I2cEngine::new(sim, I2cConfig::STANDARD.with_timeout_polls(32));
        engine.init(16_000_000);
        engine
    }

    #[test]
    fn test_write_read_uses_repeated_start() {
        let mut engine = engine();
        engine.regs_mut().device_mut(DEV).unwrap().memory_mut()[0x08..0x0A]
            .copy_from_slice(&[0xDE, 0xAD]);

        let mut buf = [0u8; 2];
        I2c::write_read(&mut engine, DEV, &[0x08], &mut buf).unwrap();
        assert_eq!(buf, [0xDE, 0xAD]);

        let sim = engine.regs();
        // One START, one repeated START, a single STOP at the end
        assert_eq!(sim.starts(), 2);
        assert_eq!(sim.stops(), 1);
        let transfers = sim.transfers();
        assert_eq!(transfers.len(), 2);
        assert!(!transfers[0].stopped);
        assert!(transfers[1].stopped);
        assert_eq!(transfers[1].acks.as_slice(), &[true, false]);
    }

    #[test]
    fn test_adjacent_writes_are_merged() {
        let mut engine = engine();
        let mut ops = [Operation::Write(&[0x00, 0x11]), Operation::Write(&[0x22])];
        engine.transaction(DEV, &mut ops).unwrap();

        let sim = engine.regs();
        assert_eq!(sim.starts(), 1);
        assert_eq!(sim.transfers()[0].bytes.as_slice(), &[0x00, 0x11, 0x22]);
    }

    #[test]
    fn test_adjacent_reads_nack_only_final_byte() {
        let mut engine = engine();
        let mut a = [0u8; 2];
        let mut b = [0u8; 1];
        let mut ops = [Operation::Read(&mut a), Operation::Read(&mut b)];
        engine.transaction(DEV, &mut ops).unwrap();

        let transfers = engine.regs().transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].acks.as_slice(), &[true, true, false]);
    }

    #[test]
    fn test_trailing_empty_read_still_nacks_last_byte() {
        let mut engine = engine();
        let mut a = [0u8; 2];
        let mut b = [0u8; 0];
        let mut ops = [Operation::Read(&mut a), Operation::Read(&mut b)];
        engine.transaction(DEV, &mut ops).unwrap();

        let transfers = engine.regs().transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].acks.as_slice(), &[true, false]);
    }

    #[test]
    fn test_empty_read_inside_run_is_skipped() {
        let mut engine = engine();
        let mut a = [0u8; 1];
        let mut b = [0u8; 0];
        let mut c = [0u8; 1];
        let mut ops = [
            Operation::Read(&mut a),
            Operation::Read(&mut b),
            Operation::Read(&mut c),
            Operation::Write(&[0x00]),
        ];
        engine.transaction(DEV, &mut ops).unwrap();

        let transfers = engine.regs().transfers();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].acks.as_slice(), &[true, false]);
        assert!(!transfers[1].read);
    }

    #[test]
    fn test_nack_surfaces_as_error_and_stops() {
        let mut engine = engine();
        let result = engine.write(0x51, &[0x00]);
        assert_eq!(result, Err(I2cError::Nack));
        assert_eq!(engine.regs().stops(), 1);
    }

    #[test]
    fn test_empty_transaction_is_noop() {
        let mut engine = engine();
        engine.transaction(DEV, &mut []).unwrap();
        assert_eq!(engine.regs().starts(), 0);
    }
}
