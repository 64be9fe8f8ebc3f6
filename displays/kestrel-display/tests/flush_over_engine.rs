//! Display driver over the real I2C engine and the simulated peripheral

use kestrel_display::{DirtyMask, Sh1106, Sh1106Config};
use kestrel_drivers::i2c::sim::{Response, SimulatedI2c};
use kestrel_drivers::I2cEngine;
use kestrel_hal::{I2cConfig, I2cError};

const PCLK1_HZ: u32 = 42_000_000;
const OLED: u8 = 0x3C;

fn oled(response: Response) -> Sh1106<I2cEngine<SimulatedI2c>> {
    let mut sim = SimulatedI2c::new();
    sim.attach(OLED, response);
    let mut engine = I2cEngine::new(sim, I2cConfig::FAST.with_timeout_polls(64));
    engine.init(PCLK1_HZ);
    Sh1106::new(engine, Sh1106Config::default())
}

#[test]
fn init_then_flush_repaints_each_page_once_in_order() {
    let mut oled = oled(Response::Ack);
    oled.init().unwrap();
    oled.bus_mut().regs_mut().clear_log();

    let report = oled.flush();
    assert!(report.is_complete());
    assert!(oled.buffer().dirty().is_empty());

    let sim = oled.bus_mut().regs();
    let transfers = sim.transfers();
    assert_eq!(transfers.len(), 16);
    for (page, pair) in transfers.chunks(2).enumerate() {
        let (select, data) = (&pair[0], &pair[1]);
        assert_eq!(select.address, OLED);
        assert!(!select.read && select.stopped && !select.nacked);
        assert_eq!(select.bytes.as_slice(), &[0x00, 0xB0 | page as u8, 0x02, 0x10]);
        assert_eq!(data.bytes.len(), 129);
        assert_eq!(data.bytes[0], 0x40);
        assert!(data.stopped);
    }
    assert_eq!(sim.starts(), 16);
    assert_eq!(sim.stops(), 16);
}

#[test]
fn init_command_stream_is_one_transfer() {
    let mut oled = oled(Response::Ack);
    oled.init().unwrap();

    let transfers = oled.bus_mut().regs().transfers();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].bytes[0], 0x00);
    assert_eq!(transfers[0].bytes.last(), Some(&0xAF));
}

#[test]
fn pixels_reach_display_ram() {
    let mut oled = oled(Response::Ack);
    oled.init().unwrap();
    oled.flush();
    oled.bus_mut().regs_mut().clear_log();

    oled.set_pixel(3, 9, true); // page 1, bit 1
    oled.flush();

    let transfers = oled.bus_mut().regs().transfers();
    assert_eq!(transfers.len(), 2);
    assert_eq!(transfers[0].bytes[1], 0xB1);
    assert_eq!(transfers[1].bytes[1 + 3], 0b10);
}

#[test]
fn rejected_data_leaves_pages_dirty_until_device_recovers() {
    // Page-select (4 bytes) is accepted, the data write is refused
    let mut oled = oled(Response::NackAfter(4));
    assert_eq!(oled.init(), Err(I2cError::Nack));
    assert_eq!(oled.buffer().dirty(), DirtyMask::all(8));

    let report = oled.flush();
    assert_eq!(report.failed, DirtyMask::all(8));
    assert_eq!(report.error, Some(I2cError::Nack));
    assert_eq!(oled.buffer().dirty(), DirtyMask::all(8));
    // Every failed transfer still ended with a STOP
    assert!(!oled.bus_mut().regs().is_busy());

    oled.bus_mut()
        .regs_mut()
        .device_mut(OLED)
        .unwrap()
        .set_response(Response::Ack);
    let report = oled.flush();
    assert_eq!(report.flushed, DirtyMask::all(8));
    assert!(oled.buffer().dirty().is_empty());
}

#[test]
fn stalled_display_times_out_without_hanging() {
    let mut oled = oled(Response::Stall);
    oled.set_pixel(0, 0, true);

    let report = oled.flush();
    assert_eq!(report.error, Some(I2cError::Timeout));
    assert!(oled.buffer().dirty().contains(0));
}
