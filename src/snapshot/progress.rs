use std::time::{Duration, Instant};
use tracing::info;

/// Receives one tick per completed account. Purely observational.
pub trait ProgressSink {
    fn tick(&mut self);
}

/// Discards ticks
#[derive(Debug, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn tick(&mut self) {}
}

/// Logs `done/total`, percentage and ETA every `every` accounts and on the last one.
#[derive(Debug)]
pub struct LogProgress {
    total: usize,
    done: usize,
    every: usize,
    started: Instant,
}

impl LogProgress {
    pub fn new(total: usize, every: usize) -> Self {
        Self {
            total,
            done: 0,
            every: every.max(1),
            started: Instant::now(),
        }
    }

    pub fn done(&self) -> usize {
        self.done
    }

    /// Linear extrapolation from the average time per account so far
    pub fn eta(&self) -> Option<Duration> {
        if self.done == 0 || self.done >= self.total {
            return None;
        }
        let per_account = self.started.elapsed() / self.done as u32;
        Some(per_account * (self.total - self.done) as u32)
    }

    fn should_report(&self) -> bool {
        self.done % self.every == 0 || self.done == self.total
    }
}

impl ProgressSink for LogProgress {
    fn tick(&mut self) {
        self.done += 1;
        if !self.should_report() {
            return;
        }

        let percent = if self.total == 0 {
            100.0
        } else {
            self.done as f64 * 100.0 / self.total as f64
        };
        let eta_secs = self.eta().map(|d| d.as_secs()).unwrap_or(0);
        info!(
            done = self.done,
            total = self.total,
            "Processing [{}/{}] {:.1}% eta {}s",
            self.done,
            self.total,
            percent,
            eta_secs
        );
    }
}

/// Counts ticks; handy in tests.
impl ProgressSink for usize {
    fn tick(&mut self) {
        *self += 1;
    }
}
