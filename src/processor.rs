//! processor.rs — Pure computation layer for the IMU monitor.
//!
//! Everything in this module is independent of:
//!   - tokio / async runtime
//!   - the text-dump parser and stdin plumbing
//!   - WebSocket fan-out and the HTTP control surface
//!
//! It takes one structured sample in, produces one classified result out.
//! Time enters only through the explicit `now` parameter (monotonic
//! seconds), so recorded streams and unit tests drive the pipeline with a
//! simulated clock.

use serde::Deserialize;

use crate::calibration::{CalibrationEvent, CalibrationManager};
use crate::conditioning::{apply_deadband, GyroRms, MedianFilter, QuatSmoother};
use crate::state_machine::{MotionClassifier, MotionState, TriggerThresholds};
use crate::types::{ImuSample, ProcessedSample};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    /// Smoothing time constant, seconds.
    pub smoothing_tau: f64,
    /// Roll/pitch median window length, samples.
    pub median_window: usize,
    /// Deadband on filtered angles, degrees.
    pub deadband: f64,

    // ── Tilt-magnitude thresholds, degrees ──
    pub tilt_threshold: f64,
    pub tilt_hysteresis: f64,
    pub aggressive_threshold: f64,
    pub aggressive_hysteresis: f64,

    // ── Gyro-rate thresholds, deg/s ──
    pub rate_tilt_threshold: f64,
    pub rate_aggressive_threshold: f64,
    pub rate_hysteresis: f64,

    // ── Dwell times, seconds ──
    pub dwell_tilt_mag: f64,
    pub dwell_aggressive_mag: f64,
    pub dwell_tilt_rate: f64,
    pub dwell_aggressive_rate: f64,
    /// Minimum hold before a return to Still is applied, seconds.
    pub debounce: f64,

    /// Trailing window for gyro RMS, seconds.
    pub gyro_window_secs: f64,

    // ── Calibration ──
    pub calibration_samples: usize,
    /// Auto-calibration arms below this tilt magnitude, degrees.
    pub calibration_max_tilt: f64,
    /// ... and below this gyro RMS, deg/s.
    pub calibration_max_rate: f64,

    /// No sample for longer than this means the signal is lost, seconds.
    pub signal_loss_timeout: f64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            smoothing_tau: 0.9,
            median_window: 5,
            deadband: 1.5,
            tilt_threshold: 8.0,
            tilt_hysteresis: 6.0,
            aggressive_threshold: 15.0,
            aggressive_hysteresis: 13.0,
            rate_tilt_threshold: 12.0,
            rate_aggressive_threshold: 20.0,
            rate_hysteresis: 4.0,
            dwell_tilt_mag: 0.5,
            dwell_aggressive_mag: 0.3,
            dwell_tilt_rate: 0.4,
            dwell_aggressive_rate: 0.25,
            debounce: 1.0,
            gyro_window_secs: 0.3,
            calibration_samples: 50,
            calibration_max_tilt: 2.0,
            calibration_max_rate: 2.0,
            signal_loss_timeout: 1.0,
        }
    }
}

impl ProcessorConfig {
    fn trigger_thresholds(&self) -> TriggerThresholds {
        TriggerThresholds {
            tilt_threshold: self.tilt_threshold,
            tilt_hysteresis: self.tilt_hysteresis,
            aggressive_threshold: self.aggressive_threshold,
            aggressive_hysteresis: self.aggressive_hysteresis,
            rate_tilt_threshold: self.rate_tilt_threshold,
            rate_aggressive_threshold: self.rate_aggressive_threshold,
            rate_hysteresis: self.rate_hysteresis,
            dwell_tilt_mag: self.dwell_tilt_mag,
            dwell_aggressive_mag: self.dwell_aggressive_mag,
            dwell_tilt_rate: self.dwell_tilt_rate,
            dwell_aggressive_rate: self.dwell_aggressive_rate,
            debounce: self.debounce,
        }
    }
}

/// Partial config update from the control surface. Absent fields leave the
/// live value alone; unknown fields are ignored rather than rejected.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    pub smoothing_tau: Option<f64>,
    pub median_window: Option<usize>,
    pub deadband: Option<f64>,
    pub tilt_threshold: Option<f64>,
    pub tilt_hysteresis: Option<f64>,
    pub aggressive_threshold: Option<f64>,
    pub aggressive_hysteresis: Option<f64>,
    pub rate_tilt_threshold: Option<f64>,
    pub rate_aggressive_threshold: Option<f64>,
    pub rate_hysteresis: Option<f64>,
    pub dwell_tilt_mag: Option<f64>,
    pub dwell_aggressive_mag: Option<f64>,
    pub dwell_tilt_rate: Option<f64>,
    pub dwell_aggressive_rate: Option<f64>,
    pub debounce: Option<f64>,
    pub gyro_window_secs: Option<f64>,
    pub calibration_samples: Option<usize>,
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub enum PipelineEvent {
    CalibrationStarted { auto: bool },
    CalibrationComplete { baseline_roll: f64, baseline_pitch: f64 },
    StateChanged { from: MotionState, to: MotionState },
}

// ─── The sample processor ────────────────────────────────────────────────────

/// Owns all mutable pipeline state for one IMU source.
///
/// Single writer: one instance per data source, samples fed in arrival
/// order. `process_sample` never fails for structurally valid input; the
/// degenerate numeric cases are handled as policies inside the math.
pub struct SampleProcessor {
    config: ProcessorConfig,

    smoother: QuatSmoother,
    roll_filter: MedianFilter,
    pitch_filter: MedianFilter,
    gyro_rms: GyroRms,

    calibration: CalibrationManager,
    classifier: MotionClassifier,

    last_arrival: Option<f64>,
}

impl SampleProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self {
            smoother: QuatSmoother::new(),
            roll_filter: MedianFilter::new(config.median_window),
            pitch_filter: MedianFilter::new(config.median_window),
            gyro_rms: GyroRms::new(config.gyro_window_secs),
            calibration: CalibrationManager::new(config.calibration_samples),
            classifier: MotionClassifier::new(),
            last_arrival: None,
            config,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn state(&self) -> MotionState {
        self.classifier.state()
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibration.is_calibrating()
    }

    /// Process one sample. `now` is monotonic seconds from the clock that
    /// drives every timer in the pipeline.
    pub fn process_sample(
        &mut self,
        sample: &ImuSample,
        now: f64,
    ) -> (ProcessedSample, Vec<PipelineEvent>) {
        let mut events = Vec::new();
        self.last_arrival = Some(now);

        // Normalize, smooth, convert.
        let normalized = sample.quaternion.normalize();
        let smoothed = self
            .smoother
            .update(normalized, now, self.config.smoothing_tau);
        let mut euler = smoothed.to_euler();

        // Calibration offsets bias the angles only; the quaternion stays.
        let raw_roll = euler.roll;
        let raw_pitch = euler.pitch;
        let offset_roll = raw_roll - self.calibration.baseline_roll();
        let offset_pitch = raw_pitch - self.calibration.baseline_pitch();

        // Median + deadband.
        self.roll_filter.push(offset_roll);
        self.pitch_filter.push(offset_pitch);
        let filtered_roll = apply_deadband(self.roll_filter.median(), self.config.deadband);
        let filtered_pitch = apply_deadband(self.pitch_filter.median(), self.config.deadband);
        euler.roll = filtered_roll;
        euler.pitch = filtered_pitch;

        // Windowed gyro RMS over roll/pitch rates.
        let gyro_rms = self.gyro_rms.update(sample.gyro.x, sample.gyro.y, now);

        let tilt_magnitude =
            (filtered_roll * filtered_roll + filtered_pitch * filtered_pitch).sqrt();

        // Calibration cycle (auto-arm, advance, finish).
        if let Some(ev) = self.calibration.update(
            raw_roll,
            raw_pitch,
            tilt_magnitude,
            gyro_rms,
            self.config.calibration_max_tilt,
            self.config.calibration_max_rate,
        ) {
            events.push(match ev {
                CalibrationEvent::Started { auto } => PipelineEvent::CalibrationStarted { auto },
                CalibrationEvent::Completed { baseline_roll, baseline_pitch } => {
                    PipelineEvent::CalibrationComplete { baseline_roll, baseline_pitch }
                }
            });
        }

        // Triggers and debounced state.
        let thresholds = self.config.trigger_thresholds();
        let (state, changed_from) =
            self.classifier
                .update(tilt_magnitude, gyro_rms, &thresholds, now);
        if let Some(from) = changed_from {
            events.push(PipelineEvent::StateChanged { from, to: state });
        }

        let result = ProcessedSample {
            timestamp: sample.timestamp,
            quaternion: smoothed,
            euler,
            acceleration: sample.acceleration,
            gyro_rms,
            tilt_magnitude,
            state,
            is_calibrating: self.calibration.is_calibrating(),
        };

        (result, events)
    }

    /// Discard any in-progress calibration and restart unconditionally.
    pub fn recalibrate(&mut self) -> PipelineEvent {
        self.calibration.recalibrate();
        PipelineEvent::CalibrationStarted { auto: false }
    }

    /// Merge a partial settings update into the live configuration.
    /// Changes apply to subsequent samples only.
    pub fn update_settings(&mut self, update: &SettingsUpdate) {
        let c = &mut self.config;
        if let Some(v) = update.smoothing_tau {
            c.smoothing_tau = v;
        }
        if let Some(v) = update.median_window {
            c.median_window = v.max(1);
            self.roll_filter.resize(c.median_window);
            self.pitch_filter.resize(c.median_window);
        }
        if let Some(v) = update.deadband {
            c.deadband = v;
        }
        if let Some(v) = update.tilt_threshold {
            c.tilt_threshold = v;
        }
        if let Some(v) = update.tilt_hysteresis {
            c.tilt_hysteresis = v;
        }
        if let Some(v) = update.aggressive_threshold {
            c.aggressive_threshold = v;
        }
        if let Some(v) = update.aggressive_hysteresis {
            c.aggressive_hysteresis = v;
        }
        if let Some(v) = update.rate_tilt_threshold {
            c.rate_tilt_threshold = v;
        }
        if let Some(v) = update.rate_aggressive_threshold {
            c.rate_aggressive_threshold = v;
        }
        if let Some(v) = update.rate_hysteresis {
            c.rate_hysteresis = v;
        }
        if let Some(v) = update.dwell_tilt_mag {
            c.dwell_tilt_mag = v;
        }
        if let Some(v) = update.dwell_aggressive_mag {
            c.dwell_aggressive_mag = v;
        }
        if let Some(v) = update.dwell_tilt_rate {
            c.dwell_tilt_rate = v;
        }
        if let Some(v) = update.dwell_aggressive_rate {
            c.dwell_aggressive_rate = v;
        }
        if let Some(v) = update.debounce {
            c.debounce = v;
        }
        if let Some(v) = update.gyro_window_secs {
            c.gyro_window_secs = v;
            self.gyro_rms = GyroRms::new(v);
        }
        if let Some(v) = update.calibration_samples {
            c.calibration_samples = v.max(1);
            self.calibration.set_target_samples(c.calibration_samples);
        }
    }

    /// Pure time-based query, polled by an external scheduler. Does not
    /// mutate pipeline state.
    pub fn is_signal_lost(&self, now: f64) -> bool {
        match self.last_arrival {
            Some(last) => now - last > self.config.signal_loss_timeout,
            None => false,
        }
    }
}
