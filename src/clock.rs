//! Monotonic deadline pacing for the 20ms voice tick.

use crate::constants::TIMESTEP_LENGTH;
use spin_sleep::SpinSleeper;
use std::time::{Duration, Instant};

/// Drives a fixed-cadence tick with drift compensation.
///
/// Each call to [`Pacer::tick`] sleeps (coarse sleep, then a short spin-wait)
/// until the next deadline, then pushes the deadline forward by one
/// [`TIMESTEP_LENGTH`] minus a leaky share of whatever overrun has
/// accumulated so far. This keeps sub-millisecond scheduler jitter from
/// compounding into audible drift over a long session.
pub struct Pacer {
    sleeper: SpinSleeper,
    deadline: Instant,
    overrun: Duration,
    frames: u32,
}

impl Pacer {
    pub fn new() -> Self {
        Self {
            sleeper: SpinSleeper::default(),
            deadline: Instant::now() + TIMESTEP_LENGTH,
            overrun: Duration::ZERO,
            frames: 0,
        }
    }

    /// Blocks the calling thread until the next deadline, then schedules the
    /// following one. Intended to be called once per mix/send cycle from a
    /// dedicated pacing thread — never from an async task.
    pub fn tick(&mut self) {
        let now = Instant::now();
        if now > self.deadline {
            self.overrun += now - self.deadline;
        }
        self.sleeper.sleep(self.deadline.saturating_duration_since(now));

        self.frames += 1;
        let correction = self.overrun / self.frames.max(1);
        self.overrun = self.overrun.saturating_sub(correction);
        self.deadline += TIMESTEP_LENGTH - correction.min(TIMESTEP_LENGTH);
    }

    /// Resets the pacer as though it had just started a fresh session.
    pub fn reset(&mut self) {
        self.deadline = Instant::now() + TIMESTEP_LENGTH;
        self.overrun = Duration::ZERO;
        self.frames = 0;
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_advances_deadline_by_one_timestep_under_no_load() {
        let mut pacer = Pacer::new();
        let before = pacer.deadline;
        pacer.tick();
        assert_eq!(pacer.deadline, before + TIMESTEP_LENGTH);
    }

    #[test]
    fn reset_clears_accumulated_overrun() {
        let mut pacer = Pacer::new();
        pacer.overrun = Duration::from_millis(5);
        pacer.frames = 3;
        pacer.reset();
        assert_eq!(pacer.overrun, Duration::ZERO);
        assert_eq!(pacer.frames, 0);
    }
}
