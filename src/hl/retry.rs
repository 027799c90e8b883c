//! Bounded polling budgets for calibration loops
//!
//! The budgets are tuned against real silicon, keep them as they are.

/// Lock status polls per PLL calibration pass
pub(crate) const PLL_LOCK_POLLS: u16 = 50;
/// PLL calibration passes before giving up
pub(crate) const PLL_CAL_LOOPS: u16 = 2;
/// Status polls while waiting for the PGF calibration
pub(crate) const PGF_CAL_POLLS: u16 = 3;
/// Delay between two polls
pub(crate) const POLL_DELAY_US: u32 = 20;
/// Polls while waiting for IDLE_RC after reset or wake up
pub(crate) const IDLE_RC_POLLS: u16 = 100;
/// Polls of a SAR conversion or an AES job
pub(crate) const SHORT_JOB_POLLS: u16 = 100;
/// Status polls while an OTP word is programmed
pub(crate) const OTP_PROG_POLLS: u16 = 1000;

/// Outcome of a bounded wait
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Outcome {
    /// The condition was met after this many attempts
    Done(u16),
    /// The budget ran out
    Exhausted,
}

/// A bounded retry state machine
///
/// `next_attempt` hands out at most `budget` attempts, each one preceded by
/// `delay_us` of waiting. `finish` records success.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Retry {
    budget: u16,
    used: u16,
    delay_us: u32,
    done: bool,
}

impl Retry {
    pub(crate) const fn new(budget: u16, delay_us: u32) -> Self {
        Retry {
            budget,
            used: 0,
            delay_us,
            done: false,
        }
    }

    /// Starts the next attempt, `false` once the budget is spent or the
    /// condition was met
    pub(crate) fn next_attempt(&mut self) -> bool {
        if self.done || self.used >= self.budget {
            return false;
        }
        self.used += 1;
        true
    }

    /// Number of the current attempt, starting at 1
    pub(crate) fn attempt(&self) -> u16 {
        self.used
    }

    /// Delay to wait before checking the condition
    pub(crate) fn delay_us(&self) -> u32 {
        self.delay_us
    }

    /// The condition was met during the current attempt
    pub(crate) fn finish(&mut self) {
        self.done = true;
    }

    pub(crate) fn outcome(&self) -> Outcome {
        if self.done {
            Outcome::Done(self.used)
        } else {
            Outcome::Exhausted
        }
    }
}
