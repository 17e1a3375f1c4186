use serde::{Deserialize, Serialize};

use crate::quat::{EulerAngles, Quaternion};
use crate::state_machine::MotionState;

/// One 3-axis channel reading (acceleration in m/s^2, angular rate in deg/s).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zeros() -> Self {
        Self { x: 0.0, y: 0.0, z: 0.0 }
    }
}

/// One structured IMU sample as handed to the processor.
///
/// The quaternion arrives pre-fused from the sensor; the pipeline never
/// re-derives it from the raw channels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    /// Sample timestamp in seconds (sensor clock), passed through to the result.
    pub timestamp: f64,
    pub quaternion: Quaternion,
    pub acceleration: Vec3,
    pub gyro: Vec3,
}

/// One processed result per accepted sample.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ProcessedSample {
    pub timestamp: f64,
    /// Smoothed orientation after slerp filtering.
    pub quaternion: Quaternion,
    /// Roll/pitch are post-median, post-deadband; yaw is the raw smoothed yaw.
    pub euler: EulerAngles,
    /// Raw acceleration, passed through untouched.
    pub acceleration: Vec3,
    /// RMS of roll/pitch angular rate over the trailing window, deg/s.
    pub gyro_rms: f64,
    /// sqrt(roll^2 + pitch^2) of the filtered angles, degrees.
    pub tilt_magnitude: f64,
    pub state: MotionState,
    pub is_calibrating: bool,
}
