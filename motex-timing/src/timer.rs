use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Clock plus a record of presented frame durations.
pub trait Timer: Clone + Send + Sync {
    type Timestamp: Copy + Clone + Send + Sync;
    fn now(&self) -> Self::Timestamp;
    fn elapsed(&self, ts: Self::Timestamp) -> Duration;
    fn record_frame(&mut self, d: Duration);
    fn frame_count(&self) -> usize;
    fn calibration_stats(&self) -> CalibrationStats;
}

/// Summary of the recorded frame window, in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationStats {
    pub average_frame_time_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_time_ns: f64,
    pub max_frame_time_ns: f64,
    pub effective_fps: f64,
}

impl CalibrationStats {
    fn from_samples(samples: impl ExactSizeIterator<Item = f64> + Clone) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self::default();
        }
        let (sum, min, max) = samples.clone().fold(
            (0.0, f64::INFINITY, f64::NEG_INFINITY),
            |(sum, lo, hi), ns| (sum + ns, lo.min(ns), hi.max(ns)),
        );
        let mean = sum / n as f64;
        let variance = samples.map(|ns| (ns - mean) * (ns - mean)).sum::<f64>() / n as f64;
        Self {
            average_frame_time_ns: mean,
            jitter_ns: variance.sqrt(),
            min_frame_time_ns: min,
            max_frame_time_ns: max,
            effective_fps: if mean > 0.0 { 1e9 / mean } else { 0.0 },
        }
    }
}

/// Monotonic clock keeping the most recent `capacity` frame durations.
#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    epoch: Instant,
    window: VecDeque<Duration>,
    capacity: usize,
}

impl Timer for HighPrecisionTimer {
    type Timestamp = u64;

    fn now(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }

    fn record_frame(&mut self, d: Duration) {
        while self.window.len() >= self.capacity.max(1) {
            self.window.pop_front();
        }
        self.window.push_back(d);
    }

    fn frame_count(&self) -> usize {
        self.window.len()
    }

    fn calibration_stats(&self) -> CalibrationStats {
        CalibrationStats::from_samples(self.window.iter().map(|d| d.as_nanos() as f64))
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            epoch: Instant::now(),
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}
