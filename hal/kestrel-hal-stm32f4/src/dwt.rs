//! DWT cycle counter time source
//!
//! The Cortex-M4 data watchpoint unit has a free-running 32-bit cycle
//! counter. [`DwtClock`] exposes it as a [`TickSource`]; [`DwtDelay`]
//! busy-waits on any tick source.

use cortex_m::peripheral::{DCB, DWT};
use embedded_hal::delay::DelayNs;
use kestrel_hal::timing::TickSource;

/// Cycle counter running at the core clock
#[derive(Debug, Clone, Copy)]
pub struct DwtClock {
    hz: u32,
}

impl DwtClock {
    /// Enable tracing and start the cycle counter
    ///
    /// `sysclk_hz` must be the core clock after clock bring-up.
    pub fn new(dcb: &mut DCB, dwt: &mut DWT, sysclk_hz: u32) -> Self {
        dcb.enable_trace();
        dwt.enable_cycle_counter();
        Self { hz: sysclk_hz }
    }
}

impl TickSource for DwtClock {
    #[inline]
    fn ticks(&self) -> u32 {
        DWT::cycle_count()
    }

    fn ticks_per_second(&self) -> u32 {
        self.hz
    }
}

/// Busy-wait delay on a tick source
pub struct DwtDelay<T = DwtClock> {
    clock: T,
}

impl<T: TickSource> DwtDelay<T> {
    pub fn new(clock: T) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &T {
        &self.clock
    }

    /// Spin for `ticks`, in slices short enough to survive counter wrap
    fn spin(&self, ticks: u64) {
        const SLICE: u64 = (u32::MAX / 2) as u64;

        let mut remaining = ticks;
        while remaining > 0 {
            let slice = remaining.min(SLICE) as u32;
            let start = self.clock.ticks();
            while self.clock.ticks_elapsed(start) < slice {
                core::hint::spin_loop();
            }
            remaining -= u64::from(slice);
        }
    }
}

impl<T: TickSource> DelayNs for DwtDelay<T> {
    fn delay_ns(&mut self, ns: u32) {
        let ticks = (u64::from(ns) * u64::from(self.clock.ticks_per_second())).div_ceil(1_000_000_000);
        self.spin(ticks);
    }

    fn delay_us(&mut self, us: u32) {
        let ticks = u64::from(us) * u64::from(self.clock.ticks_per_second()) / 1_000_000;
        self.spin(ticks);
    }

    fn delay_ms(&mut self, ms: u32) {
        let ticks = u64::from(ms) * u64::from(self.clock.ticks_per_second()) / 1_000;
        self.spin(ticks);
    }
}
