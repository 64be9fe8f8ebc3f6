//! Kestrel Firmware
//!
//! Demo firmware for STM32F401 boards with an SH1106 OLED on I2C.
//! Brings up the clock tree, the I2C engine and the display, then animates
//! a bouncing rectangle, flushing only the pages that changed each frame.

#![no_std]
#![no_main]

mod bouncer;

/// Constants generated from board.toml
mod board {
    use kestrel_hal::BusSpeed;

    include!(concat!(env!("OUT_DIR"), "/board_config.rs"));
}

use cortex_m_rt::entry;
use defmt::*;
use embedded_hal::delay::DelayNs;
use {defmt_rtt as _, panic_probe as _};

use kestrel_display::{Sh1106, Sh1106Config};
use kestrel_drivers::I2cEngine;
use kestrel_hal::I2cConfig;
use kestrel_hal_stm32f4::{gpio, pac, rcc, ClockConfig, DwtClock, DwtDelay, I2cInstance, MmioI2c};

use crate::bouncer::Bouncer;

#[entry]
fn main() -> ! {
    info!("Kestrel firmware starting...");

    let mut core = unwrap!(cortex_m::Peripherals::take());
    let dp = unwrap!(pac::Peripherals::take());

    let clock_config = ClockConfig {
        hse_hz: board::HSE_HZ,
        sysclk_hz: board::SYSCLK_HZ,
        ..Default::default()
    };
    let clocks = unwrap!(rcc::init(&dp.RCC, &dp.FLASH, &clock_config));
    info!(
        "Clocks: SYSCLK {} Hz, APB1 {} Hz",
        clocks.sysclk_hz, clocks.pclk1_hz
    );

    let mut delay = DwtDelay::new(DwtClock::new(
        &mut core.DCB,
        &mut core.DWT,
        clocks.sysclk_hz,
    ));

    // Pin and clock setup must precede bus init
    let instance = unwrap!(I2cInstance::from_number(board::I2C_INSTANCE));
    rcc::enable_i2c(&dp.RCC, instance);
    let ports = gpio::Ports {
        a: &dp.GPIOA,
        b: &dp.GPIOB,
        c: &dp.GPIOC,
    };
    gpio::configure_i2c_pins(&dp.RCC, &ports, instance);

    let regs = match instance {
        I2cInstance::I2c1 => MmioI2c::from(dp.I2C1),
        I2cInstance::I2c2 => MmioI2c::from(dp.I2C2),
        I2cInstance::I2c3 => MmioI2c::from(dp.I2C3),
    };
    let mut engine = I2cEngine::new(
        regs,
        I2cConfig {
            speed: board::BUS_SPEED,
            timeout_polls: board::TIMEOUT_POLLS,
        },
    );
    engine.init(clocks.pclk1_hz);
    info!("I2C{} ready", board::I2C_INSTANCE);

    let mut display = Sh1106::new(
        engine,
        Sh1106Config {
            address: board::DISPLAY_ADDRESS,
            column_offset: board::COLUMN_OFFSET,
            contrast: board::CONTRAST,
        },
    );
    match display.init() {
        Ok(()) => info!("OLED initialized"),
        Err(e) => error!("Failed to initialize display: {}", e),
    }

    let mut bouncer = Bouncer::new(board::RECT_WIDTH, board::RECT_HEIGHT);

    loop {
        bouncer.step(display.buffer_mut());

        let report = display.flush();
        if !report.is_complete() {
            warn!(
                "Flush incomplete: pages {=u32:b} pending ({})",
                report.failed.bits(),
                report.error
            );
        }

        delay.delay_ms(board::FRAME_MS);
    }
}
