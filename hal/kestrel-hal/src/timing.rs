//! Monotonic time source
//!
//! A free-running counter such as the Cortex-M cycle counter. It wraps, so
//! differences are always taken with wrapping arithmetic.

/// Free-running monotonic counter
pub trait TickSource {
    /// Current counter value
    fn ticks(&self) -> u32;

    /// Counter frequency in Hz
    fn ticks_per_second(&self) -> u32;

    /// Ticks elapsed since `start`, correct across one counter wrap
    fn ticks_elapsed(&self, start: u32) -> u32 {
        self.ticks().wrapping_sub(start)
    }

    /// Number of ticks in `us` microseconds
    fn ticks_for_us(&self, us: u32) -> u32 {
        let ticks = u64::from(us) * u64::from(self.ticks_per_second()) / 1_000_000;
        ticks.min(u64::from(u32::MAX)) as u32
    }
}
