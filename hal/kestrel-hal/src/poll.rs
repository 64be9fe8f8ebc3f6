//! Bounded status polling
//!
//! Every wait on a hardware flag goes through [`poll_until`]. The bound is a
//! number of attempts, not a wall-clock duration.

/// The condition was not met within the poll budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollTimeout;

/// Call `ready` until it returns `true`, at most `budget` times
///
/// Returns the number of attempts it took. A zero budget times out
/// without calling `ready`.
pub fn poll_until(budget: u32, mut ready: impl FnMut() -> bool) -> Result<u32, PollTimeout> {
    for attempt in 1..=budget {
        if ready() {
            return Ok(attempt);
        }
        core::hint::spin_loop();
    }
    Err(PollTimeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_immediately() {
        assert_eq!(poll_until(10, || true), Ok(1));
    }

    #[test]
    fn test_ready_after_some_attempts() {
        let mut calls = 0;
        let result = poll_until(10, || {
            calls += 1;
            calls == 4
        });
        assert_eq!(result, Ok(4));
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_budget_exhausted() {
        let mut calls = 0;
        let result = poll_until(25, || {
            calls += 1;
            false
        });
        assert_eq!(result, Err(PollTimeout));
        assert_eq!(calls, 25);
    }

    #[test]
    fn test_zero_budget_never_polls() {
        let mut calls = 0;
        let result = poll_until(0, || {
            calls += 1;
            true
        });
        assert_eq!(result, Err(PollTimeout));
        assert_eq!(calls, 0);
    }
}
