//! Reset and clock control for STM32F401/F411
//!
//! Brings the core up from the 16 MHz HSI to a PLL fed by the external
//! crystal, and gates peripheral clocks. The PLL factors are computed by
//! [`ClockConfig::plan`], which is pure and testable on the host.

use kestrel_hal::poll::poll_until;
use stm32f4::stm32f401::{FLASH, RCC};

use crate::gpio::Port;
use crate::i2c::I2cInstance;

/// CFGR.SW / CFGR.SWS encoding of the PLL
const SW_PLL: u8 = 0b10;

const MAX_SYSCLK_HZ: u32 = 84_000_000;
const MAX_PCLK1_HZ: u32 = 42_000_000;
const VCO_MIN_HZ: u32 = 192_000_000;
const VCO_MAX_HZ: u32 = 432_000_000;
const USB_MAX_HZ: u32 = 48_000_000;
/// Flash access time step at 2.7-3.6 V
const HZ_PER_WAIT_STATE: u32 = 30_000_000;

/// Clock tree configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockConfig {
    /// External crystal frequency (a whole number of MHz, 4-26 MHz)
    pub hse_hz: u32,
    /// Target system clock (a whole number of MHz, up to 84 MHz)
    pub sysclk_hz: u32,
    /// Poll budget for each ready flag
    pub timeout_polls: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            hse_hz: 25_000_000,
            sysclk_hz: MAX_SYSCLK_HZ,
            timeout_polls: 100_000,
        }
    }
}

/// Frozen bus frequencies after [`init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Clocks {
    pub sysclk_hz: u32,
    pub hclk_hz: u32,
    /// APB1 clock, which feeds the I2C peripherals
    pub pclk1_hz: u32,
    pub pclk2_hz: u32,
}

/// Clock bring-up failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockError {
    /// Requested frequencies cannot be produced
    Unsupported,
    /// Crystal did not stabilise
    HseTimeout,
    /// PLL did not lock
    PllTimeout,
    /// System clock switch did not take effect
    SwitchTimeout,
}

/// PLL factors and prescalers for one configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockPlan {
    pub pllm: u32,
    pub plln: u32,
    pub pllp: u32,
    pub pllq: u32,
    /// APB1 divider (1, 2, 4, 8 or 16)
    pub apb1_div: u32,
    pub flash_latency: u32,
    pub clocks: Clocks,
}

impl ClockPlan {
    /// PLLCFGR.PLLP encoding of the output divider
    fn pllp_bits(&self) -> u8 {
        (self.pllp / 2 - 1) as u8
    }

    /// CFGR.PPRE1 encoding of the APB1 divider
    fn ppre1_bits(&self) -> u8 {
        match self.apb1_div {
            1 => 0b000,
            2 => 0b100,
            4 => 0b101,
            8 => 0b110,
            _ => 0b111,
        }
    }
}

impl ClockConfig {
    /// Work out PLL factors for this configuration
    ///
    /// The PLL input is divided down to 1 MHz; the smallest output divider
    /// that keeps the VCO in range is used.
    pub fn plan(&self) -> Result<ClockPlan, ClockError> {
        const MHZ: u32 = 1_000_000;

        if self.hse_hz % MHZ != 0 || !(4..=26).contains(&(self.hse_hz / MHZ)) {
            return Err(ClockError::Unsupported);
        }
        if self.sysclk_hz % MHZ != 0 || self.sysclk_hz == 0 || self.sysclk_hz > MAX_SYSCLK_HZ {
            return Err(ClockError::Unsupported);
        }

        let pllm = self.hse_hz / MHZ;
        let pllp = [2, 4, 6, 8]
            .into_iter()
            .find(|p| (VCO_MIN_HZ..=VCO_MAX_HZ).contains(&(self.sysclk_hz * p)))
            .ok_or(ClockError::Unsupported)?;
        let vco_hz = self.sysclk_hz * pllp;
        let plln = vco_hz / MHZ;
        let pllq = vco_hz.div_ceil(USB_MAX_HZ).clamp(2, 15);

        let apb1_div = [1, 2, 4, 8, 16]
            .into_iter()
            .find(|div| self.sysclk_hz / div <= MAX_PCLK1_HZ)
            .ok_or(ClockError::Unsupported)?;

        Ok(ClockPlan {
            pllm,
            plln,
            pllp,
            pllq,
            apb1_div,
            flash_latency: (self.sysclk_hz - 1) / HZ_PER_WAIT_STATE,
            clocks: Clocks {
                sysclk_hz: self.sysclk_hz,
                hclk_hz: self.sysclk_hz,
                pclk1_hz: self.sysclk_hz / apb1_div,
                pclk2_hz: self.sysclk_hz,
            },
        })
    }
}

/// Switch the system clock to the HSE-fed PLL
///
/// Must run once, before any peripheral is configured, since the I2C
/// timing depends on the resulting APB1 frequency.
pub fn init(rcc: &RCC, flash: &FLASH, config: &ClockConfig) -> Result<Clocks, ClockError> {
    let plan = config.plan()?;
    let budget = config.timeout_polls;

    rcc.cr.modify(|_, w| w.hseon().set_bit());
    poll_until(budget, || rcc.cr.read().hserdy().bit_is_set())
        .map_err(|_| ClockError::HseTimeout)?;

    // Wait states must be in place before the core speeds up
    flash.acr.modify(|_, w| {
        unsafe { w.latency().bits(plan.flash_latency as u8) }
            .prften()
            .set_bit()
            .icen()
            .set_bit()
            .dcen()
            .set_bit()
    });

    // AHB and APB2 undivided
    rcc.cfgr.modify(|_, w| unsafe {
        w.hpre()
            .bits(0b0000)
            .ppre1()
            .bits(plan.ppre1_bits())
            .ppre2()
            .bits(0b000)
    });

    rcc.pllcfgr.modify(|_, w| unsafe {
        w.pllm()
            .bits(plan.pllm as u8)
            .plln()
            .bits(plan.plln as u16)
            .pllp()
            .bits(plan.pllp_bits())
            .pllq()
            .bits(plan.pllq as u8)
            .pllsrc()
            .set_bit()
    });
    rcc.cr.modify(|_, w| w.pllon().set_bit());
    poll_until(budget, || rcc.cr.read().pllrdy().bit_is_set())
        .map_err(|_| ClockError::PllTimeout)?;

    rcc.cfgr.modify(|_, w| unsafe { w.sw().bits(SW_PLL) });
    poll_until(budget, || rcc.cfgr.read().sws().bits() == SW_PLL)
        .map_err(|_| ClockError::SwitchTimeout)?;

    Ok(plan.clocks)
}

/// Enable the clock of an I2C instance and pulse its reset
pub fn enable_i2c(rcc: &RCC, instance: I2cInstance) {
    match instance {
        I2cInstance::I2c1 => {
            rcc.apb1enr.modify(|_, w| w.i2c1en().set_bit());
            rcc.apb1rstr.modify(|_, w| w.i2c1rst().set_bit());
            rcc.apb1rstr.modify(|_, w| w.i2c1rst().clear_bit());
        }
        I2cInstance::I2c2 => {
            rcc.apb1enr.modify(|_, w| w.i2c2en().set_bit());
            rcc.apb1rstr.modify(|_, w| w.i2c2rst().set_bit());
            rcc.apb1rstr.modify(|_, w| w.i2c2rst().clear_bit());
        }
        I2cInstance::I2c3 => {
            rcc.apb1enr.modify(|_, w| w.i2c3en().set_bit());
            rcc.apb1rstr.modify(|_, w| w.i2c3rst().set_bit());
            rcc.apb1rstr.modify(|_, w| w.i2c3rst().clear_bit());
        }
    }
}

/// Enable the clock of a GPIO port
pub fn enable_gpio(rcc: &RCC, port: Port) {
    match port {
        Port::A => rcc.ahb1enr.modify(|_, w| w.gpioaen().set_bit()),
        Port::B => rcc.ahb1enr.modify(|_, w| w.gpioben().set_bit()),
        Port::C => rcc.ahb1enr.modify(|_, w| w.gpiocen().set_bit()),
    }
    // Dummy read lets the clock reach the port before it is used
    let _ = rcc.ahb1enr.read();
}
