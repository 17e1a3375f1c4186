//! Per-channel signal conditioning: slerp smoothing, median filtering,
//! deadband suppression, and windowed gyro RMS.
//!
//! Each struct owns its own buffers; one set per IMU source.

use std::collections::VecDeque;

use crate::quat::{slerp, Quaternion};

/// Exponential orientation smoother built on shortest-path slerp.
///
/// The blend factor is `alpha = 1 - exp(-dt/tau)`, so settling behavior is a
/// property of wall time, not of the sample rate. `dt` is clamped to 100 ms
/// so a stalled stream cannot snap the filter to the newest sample.
pub struct QuatSmoother {
    smoothed: Option<Quaternion>,
    last_timestamp: f64,
}

/// Maximum inter-sample interval credited to the smoother, seconds.
const MAX_SMOOTHING_DT: f64 = 0.1;

impl QuatSmoother {
    pub fn new() -> Self {
        Self { smoothed: None, last_timestamp: 0.0 }
    }

    /// Blend a normalized quaternion into the smoothed estimate.
    ///
    /// The first sample initializes the filter with no blending.
    pub fn update(&mut self, q: Quaternion, now: f64, tau: f64) -> Quaternion {
        let next = match self.smoothed {
            None => q,
            Some(current) => {
                let dt = (now - self.last_timestamp).clamp(0.0, MAX_SMOOTHING_DT);
                let alpha = 1.0 - (-dt / tau).exp();
                slerp(current, q, alpha)
            }
        };
        self.smoothed = Some(next);
        self.last_timestamp = now;
        next
    }

    pub fn is_initialized(&self) -> bool {
        self.smoothed.is_some()
    }
}

impl Default for QuatSmoother {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-length FIFO median filter over a single angle channel.
pub struct MedianFilter {
    window: VecDeque<f64>,
    window_size: usize,
}

impl MedianFilter {
    pub fn new(window_size: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size: window_size.max(1),
        }
    }

    /// Push a value, evicting the oldest once the window is full.
    pub fn push(&mut self, value: f64) {
        self.window.push_back(value);
        while self.window.len() > self.window_size {
            self.window.pop_front();
        }
    }

    /// Numeric median of the current window; even windows average the two
    /// middle values. Empty window reports 0.
    pub fn median(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.window.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 != 0 {
            sorted[mid]
        } else {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        }
    }

    /// Shrink or grow the window capacity; oldest samples drop on shrink.
    pub fn resize(&mut self, window_size: usize) {
        self.window_size = window_size.max(1);
        while self.window.len() > self.window_size {
            self.window.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

/// Report values inside the deadband as exactly zero.
pub fn apply_deadband(value: f64, threshold: f64) -> f64 {
    if value.abs() < threshold {
        0.0
    } else {
        value
    }
}

/// Sliding RMS of the roll/pitch angular rates over a trailing time window.
///
/// Entries are evicted by age, not by count; a quiet stream therefore decays
/// to an empty window rather than holding stale rates.
pub struct GyroRms {
    samples: VecDeque<(f64, f64, f64)>, // (timestamp, roll_rate, pitch_rate)
    window_secs: f64,
}

impl GyroRms {
    pub fn new(window_secs: f64) -> Self {
        Self { samples: VecDeque::new(), window_secs }
    }

    /// Record a rate sample and return the RMS over the retained window.
    pub fn update(&mut self, roll_rate: f64, pitch_rate: f64, now: f64) -> f64 {
        self.samples.push_back((now, roll_rate, pitch_rate));
        self.evict(now);
        self.rms()
    }

    fn evict(&mut self, now: f64) {
        while let Some(&(ts, _, _)) = self.samples.front() {
            if now - ts > self.window_secs {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// `sqrt(mean(roll^2 + pitch^2))` over retained samples; 0 when empty.
    pub fn rms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_squares: f64 = self
            .samples
            .iter()
            .map(|&(_, r, p)| r * r + p * p)
            .sum();
        (sum_squares / self.samples.len() as f64).sqrt()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
