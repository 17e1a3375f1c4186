//! Baseline calibration: zero out the mounting bias of the IMU.
//!
//! The camera head is rarely mounted perfectly level, so a fixed roll/pitch
//! offset shows up in every sample. When the platform looks stationary the
//! manager collects smoothed (pre-offset) angles, averages them, and stores
//! the means as baseline offsets. Offsets only bias the Euler angles; the
//! quaternion is never modified.

/// Outcome of advancing the calibration manager by one sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CalibrationEvent {
    Started { auto: bool },
    Completed { baseline_roll: f64, baseline_pitch: f64 },
}

pub struct CalibrationManager {
    baseline_roll: f64,
    baseline_pitch: f64,
    is_calibrating: bool,
    has_calibrated: bool,
    samples: Vec<(f64, f64)>,
    target_samples: usize,
}

impl CalibrationManager {
    pub fn new(target_samples: usize) -> Self {
        Self {
            baseline_roll: 0.0,
            baseline_pitch: 0.0,
            is_calibrating: false,
            has_calibrated: false,
            samples: Vec::new(),
            target_samples: target_samples.max(1),
        }
    }

    pub fn baseline_roll(&self) -> f64 {
        self.baseline_roll
    }

    pub fn baseline_pitch(&self) -> f64 {
        self.baseline_pitch
    }

    pub fn is_calibrating(&self) -> bool {
        self.is_calibrating
    }

    /// True once any calibration cycle has completed.
    pub fn has_calibrated(&self) -> bool {
        self.has_calibrated
    }

    pub fn set_target_samples(&mut self, target: usize) {
        self.target_samples = target.max(1);
    }

    /// Advance one sample.
    ///
    /// `raw_roll`/`raw_pitch` are the smoothed pre-offset angles; `tilt_mag`
    /// and `gyro_rms` gate the auto-start (both must look quiet). Returns at
    /// most one event per call.
    pub fn update(
        &mut self,
        raw_roll: f64,
        raw_pitch: f64,
        tilt_mag: f64,
        gyro_rms: f64,
        stillness_tilt: f64,
        stillness_rate: f64,
    ) -> Option<CalibrationEvent> {
        if self.is_calibrating {
            self.samples.push((raw_roll, raw_pitch));
            if self.samples.len() >= self.target_samples {
                return self.finish();
            }
            return None;
        }

        // Auto-arm exactly once, when the platform first looks stationary.
        if !self.has_calibrated && tilt_mag < stillness_tilt && gyro_rms < stillness_rate {
            self.start();
            return Some(CalibrationEvent::Started { auto: true });
        }

        None
    }

    /// Discard any in-progress samples and restart unconditionally.
    pub fn recalibrate(&mut self) -> CalibrationEvent {
        self.start();
        CalibrationEvent::Started { auto: false }
    }

    fn start(&mut self) {
        self.is_calibrating = true;
        self.samples.clear();
    }

    /// Average the collected samples into baseline offsets and reset.
    /// Finishing with no samples is a no-op.
    fn finish(&mut self) -> Option<CalibrationEvent> {
        if self.samples.is_empty() {
            self.is_calibrating = false;
            return None;
        }

        let n = self.samples.len() as f64;
        let (roll_sum, pitch_sum) = self
            .samples
            .iter()
            .fold((0.0, 0.0), |acc, &(r, p)| (acc.0 + r, acc.1 + p));

        self.baseline_roll = roll_sum / n;
        self.baseline_pitch = pitch_sum / n;
        self.is_calibrating = false;
        self.has_calibrated = true;
        self.samples.clear();

        Some(CalibrationEvent::Completed {
            baseline_roll: self.baseline_roll,
            baseline_pitch: self.baseline_pitch,
        })
    }
}
