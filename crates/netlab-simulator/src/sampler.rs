//! Periodic sampling of the received-byte total into a time series.

use netlab_abstract::SimTime;
use serde::{Deserialize, Serialize};

/// One point of the throughput series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplePoint {
    pub time: SimTime,
    pub value: f64,
}

/// How a tick turns the received-byte total into a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleMode {
    /// `bytes * 8 / 1e6` of the cumulative total. The series is a
    /// non-decreasing curve of delivered megabits, not a rate.
    #[default]
    CumulativeMbits,
    /// Cumulative megabits divided by the time elapsed since the sampler
    /// started. Zero at elapsed zero.
    AverageMbps,
    /// Megabits received since the previous tick divided by the period.
    IntervalMbps,
}

fn megabits(bytes: u64) -> f64 {
    (bytes as f64 * 8.0) / 1_000_000.0
}

#[derive(Debug, Clone)]
pub struct PeriodicSampler {
    period: SimTime,
    mode: SampleMode,
    started_at: SimTime,
    last_bytes: u64,
    points: Vec<SamplePoint>,
}

impl PeriodicSampler {
    /// A zero period is clamped to one nanosecond.
    pub fn new(period: SimTime, mode: SampleMode, started_at: SimTime) -> Self {
        Self {
            period: period.max(SimTime::from_nanos(1)),
            mode,
            started_at,
            last_bytes: 0,
            points: Vec::new(),
        }
    }

    /// Record a point for `now` and return when the next tick is due.
    pub fn tick(&mut self, now: SimTime, received_bytes: u64) -> SimTime {
        debug_assert!(self.points.last().is_none_or(|p| p.time < now));

        let value = match self.mode {
            SampleMode::CumulativeMbits => megabits(received_bytes),
            SampleMode::AverageMbps => {
                let elapsed = now.saturating_sub(self.started_at).as_secs_f64();
                if elapsed > 0.0 {
                    megabits(received_bytes) / elapsed
                } else {
                    0.0
                }
            }
            SampleMode::IntervalMbps => {
                let delta = received_bytes.saturating_sub(self.last_bytes);
                megabits(delta) / self.period.as_secs_f64()
            }
        };
        self.last_bytes = received_bytes;
        self.points.push(SamplePoint { time: now, value });
        now + self.period
    }

    pub fn points(&self) -> &[SamplePoint] {
        &self.points
    }
}
