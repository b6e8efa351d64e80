//! Duration accounting
//!
//! Elapsed time comes from a monotonic clock sampled at the
//! pause/resume/stop boundaries, never from a tick counter, so the
//! reported duration stays accurate under scheduling jitter.

use std::time::{Duration, Instant};

/// Monotonic session clock excluding paused intervals
#[derive(Debug, Default)]
pub struct DurationClock {
    started: Option<Instant>,
    paused_at: Option<Instant>,
    accumulated_paused: Duration,
    frozen: Option<Duration>,
}

impl DurationClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin accounting from now
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.paused_at = None;
        self.accumulated_paused = Duration::ZERO;
        self.frozen = None;
    }

    /// Freeze at the current elapsed value. No-op unless running.
    pub fn pause(&mut self) {
        if self.started.is_some() && self.paused_at.is_none() && self.frozen.is_none() {
            self.paused_at = Some(Instant::now());
        }
    }

    /// Resume accounting, accumulating the paused interval. No-op unless
    /// paused.
    pub fn resume(&mut self) {
        if let Some(paused_at) = self.paused_at.take() {
            self.accumulated_paused += paused_at.elapsed();
        }
    }

    /// Permanently freeze at the current elapsed value
    pub fn stop(&mut self) {
        self.frozen = Some(self.elapsed());
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Elapsed recording time, paused intervals excluded.
    /// Monotonically non-decreasing while running, constant while paused.
    pub fn elapsed(&self) -> Duration {
        if let Some(frozen) = self.frozen {
            return frozen;
        }
        let Some(started) = self.started else {
            return Duration::ZERO;
        };
        let live_end = self.paused_at.unwrap_or_else(Instant::now);
        live_end
            .saturating_duration_since(started)
            .saturating_sub(self.accumulated_paused)
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn unstarted_clock_reads_zero() {
        let clock = DurationClock::new();
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn pause_freezes_elapsed() {
        let mut clock = DurationClock::new();
        clock.start();
        sleep(Duration::from_millis(30));
        clock.pause();
        let frozen = clock.elapsed();
        sleep(Duration::from_millis(30));
        assert_eq!(clock.elapsed(), frozen);
    }

    #[test]
    fn resume_excludes_paused_interval() {
        let mut clock = DurationClock::new();
        clock.start();
        sleep(Duration::from_millis(20));
        clock.pause();
        sleep(Duration::from_millis(50));
        clock.resume();
        sleep(Duration::from_millis(20));
        clock.stop();

        let elapsed = clock.elapsed();
        assert!(elapsed >= Duration::from_millis(40), "elapsed = {elapsed:?}");
        assert!(elapsed < Duration::from_millis(90), "elapsed = {elapsed:?}");
    }

    #[test]
    fn stop_freezes_permanently() {
        let mut clock = DurationClock::new();
        clock.start();
        sleep(Duration::from_millis(10));
        clock.stop();
        let frozen = clock.elapsed();
        sleep(Duration::from_millis(20));
        assert_eq!(clock.elapsed(), frozen);
    }

    #[test]
    fn illegal_transitions_are_no_ops() {
        let mut clock = DurationClock::new();
        clock.pause();
        clock.resume();
        assert_eq!(clock.elapsed(), Duration::ZERO);

        clock.start();
        clock.resume();
        sleep(Duration::from_millis(10));
        assert!(clock.elapsed() >= Duration::from_millis(10));
    }
}
