//! Dwell-timed trigger bank and the prioritized motion classifier.
//!
//! Each trigger arms only after its condition has held continuously for the
//! configured dwell time, and clears only through a separate, lower
//! hysteresis threshold. The classifier folds the four triggers into
//! Still / Tilting / Aggressive with a debounced return to Still.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionState {
    Still,
    Tilting,
    Aggressive,
}

impl MotionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionState::Still => "still",
            MotionState::Tilting => "tilting",
            MotionState::Aggressive => "aggressive",
        }
    }
}

/// One dwell-timed trigger.
///
/// `armed_since` is unset whenever the arm condition is false: an
/// interrupted dwell earns no partial credit. Once active, only the
/// hysteresis condition clears the trigger.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trigger {
    pub active: bool,
    armed_since: Option<f64>,
}

impl Trigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the arming side of the trigger.
    pub fn update(&mut self, condition: bool, dwell_secs: f64, now: f64) {
        if condition && !self.active {
            match self.armed_since {
                None => self.armed_since = Some(now),
                Some(t0) => {
                    if now - t0 >= dwell_secs {
                        self.active = true;
                    }
                }
            }
        } else if !condition {
            // active flag is cleared by the hysteresis side, not here
            self.armed_since = None;
        }
    }

    /// Clear through the hysteresis band; takes priority over arming.
    pub fn clear_below(&mut self, value: f64, hysteresis: f64) {
        if self.active && value < hysteresis {
            self.active = false;
        }
    }
}

/// Thresholds and timing for the trigger bank, degrees / deg/s / seconds.
#[derive(Clone, Copy, Debug)]
pub struct TriggerThresholds {
    pub tilt_threshold: f64,
    pub tilt_hysteresis: f64,
    pub aggressive_threshold: f64,
    pub aggressive_hysteresis: f64,
    pub rate_tilt_threshold: f64,
    pub rate_aggressive_threshold: f64,
    pub rate_hysteresis: f64,
    pub dwell_tilt_mag: f64,
    pub dwell_aggressive_mag: f64,
    pub dwell_tilt_rate: f64,
    pub dwell_aggressive_rate: f64,
    pub debounce: f64,
}

/// The four-trigger bank plus the debounced state.
pub struct MotionClassifier {
    tilt_mag: Trigger,
    aggressive_mag: Trigger,
    tilt_rate: Trigger,
    aggressive_rate: Trigger,
    state: MotionState,
    state_start: f64,
}

impl MotionClassifier {
    pub fn new() -> Self {
        Self {
            tilt_mag: Trigger::new(),
            aggressive_mag: Trigger::new(),
            tilt_rate: Trigger::new(),
            aggressive_rate: Trigger::new(),
            state: MotionState::Still,
            state_start: 0.0,
        }
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn state_start(&self) -> f64 {
        self.state_start
    }

    /// Feed one sample's tilt magnitude and gyro RMS; returns the (possibly
    /// held) state after debounce, plus the previous state when a transition
    /// actually applied.
    pub fn update(
        &mut self,
        tilt_mag: f64,
        gyro_rms: f64,
        th: &TriggerThresholds,
        now: f64,
    ) -> (MotionState, Option<MotionState>) {
        self.update_triggers(tilt_mag, gyro_rms, th, now);

        let candidate = self.determine_state();
        let mut changed_from = None;

        if candidate != self.state {
            let held_for = now - self.state_start;
            let suppressed = candidate == MotionState::Still && held_for < th.debounce;
            if !suppressed {
                changed_from = Some(self.state);
                self.state = candidate;
                self.state_start = now;
            }
        }

        (self.state, changed_from)
    }

    fn update_triggers(&mut self, tilt_mag: f64, gyro_rms: f64, th: &TriggerThresholds, now: f64) {
        self.tilt_mag
            .update(tilt_mag >= th.tilt_threshold, th.dwell_tilt_mag, now);
        self.aggressive_mag
            .update(tilt_mag >= th.aggressive_threshold, th.dwell_aggressive_mag, now);
        self.tilt_rate
            .update(gyro_rms >= th.rate_tilt_threshold, th.dwell_tilt_rate, now);
        self.aggressive_rate
            .update(gyro_rms >= th.rate_aggressive_threshold, th.dwell_aggressive_rate, now);

        self.tilt_mag.clear_below(tilt_mag, th.tilt_hysteresis);
        self.aggressive_mag.clear_below(tilt_mag, th.aggressive_hysteresis);
        self.tilt_rate.clear_below(gyro_rms, th.rate_hysteresis);
        self.aggressive_rate.clear_below(gyro_rms, th.rate_hysteresis);
    }

    /// Priority order: aggressive beats tilting beats still.
    fn determine_state(&self) -> MotionState {
        if self.aggressive_mag.active || self.aggressive_rate.active {
            MotionState::Aggressive
        } else if self.tilt_mag.active || self.tilt_rate.active {
            MotionState::Tilting
        } else {
            MotionState::Still
        }
    }

    pub fn tilt_mag_active(&self) -> bool {
        self.tilt_mag.active
    }

    pub fn aggressive_mag_active(&self) -> bool {
        self.aggressive_mag.active
    }

    pub fn tilt_rate_active(&self) -> bool {
        self.tilt_rate.active
    }

    pub fn aggressive_rate_active(&self) -> bool {
        self.aggressive_rate.active
    }
}

impl Default for MotionClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> TriggerThresholds {
        TriggerThresholds {
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
        }
    }

    /// Drive the classifier with constant inputs over [start, end) at 100 Hz.
    fn drive(
        cls: &mut MotionClassifier,
        tilt: f64,
        rms: f64,
        th: &TriggerThresholds,
        start: f64,
        end: f64,
    ) -> MotionState {
        let mut state = cls.state();
        let mut t = start;
        while t < end {
            state = cls.update(tilt, rms, th, t).0;
            t += 0.01;
        }
        state
    }

    #[test]
    fn test_tilt_dwell_then_active() {
        let th = thresholds();
        let mut cls = MotionClassifier::new();

        // 10 deg: above tilting (8), below aggressive (15)
        let state = drive(&mut cls, 10.0, 0.0, &th, 0.0, 0.45);
        assert_eq!(state, MotionState::Still);

        let state = drive(&mut cls, 10.0, 0.0, &th, 0.45, 0.6);
        assert_eq!(state, MotionState::Tilting);
        assert!(cls.tilt_mag_active());
        assert!(!cls.aggressive_mag_active());
    }

    #[test]
    fn test_hysteresis_holds_between_bands() {
        let th = thresholds();
        let mut cls = MotionClassifier::new();
        drive(&mut cls, 10.0, 0.0, &th, 0.0, 0.6);
        assert!(cls.tilt_mag_active());

        // 7 deg is below the 8-deg arm threshold but above the 6-deg
        // hysteresis: the trigger must stay active.
        drive(&mut cls, 7.0, 0.0, &th, 0.6, 0.8);
        assert!(cls.tilt_mag_active());

        // 5 deg clears it.
        cls.update(5.0, 0.0, &th, 0.81);
        assert!(!cls.tilt_mag_active());
    }

    #[test]
    fn test_interrupted_dwell_resets() {
        let th = thresholds();
        let mut cls = MotionClassifier::new();

        // 0.4 s above threshold, then a dip: no partial credit.
        drive(&mut cls, 10.0, 0.0, &th, 0.0, 0.4);
        cls.update(0.0, 0.0, &th, 0.41);
        drive(&mut cls, 10.0, 0.0, &th, 0.42, 0.8);
        assert!(!cls.tilt_mag_active());

        // A fresh uninterrupted 0.5 s arms it.
        drive(&mut cls, 10.0, 0.0, &th, 0.8, 1.35);
        assert!(cls.tilt_mag_active());
    }

    #[test]
    fn test_debounced_return_to_still() {
        let th = thresholds();
        let mut cls = MotionClassifier::new();
        drive(&mut cls, 10.0, 0.0, &th, 0.0, 0.6);
        assert_eq!(cls.state(), MotionState::Tilting);
        let entered_tilting = cls.state_start();

        // Magnitude collapses; trigger clears immediately, but the state must
        // hold Tilting until debounce since the last change has elapsed.
        let state = drive(&mut cls, 0.0, 0.0, &th, 0.6, entered_tilting + 0.95);
        assert_eq!(state, MotionState::Tilting);

        let state = drive(&mut cls, 0.0, 0.0, &th, entered_tilting + 0.95, entered_tilting + 1.1);
        assert_eq!(state, MotionState::Still);
    }

    #[test]
    fn test_aggressive_priority() {
        let th = thresholds();
        let mut cls = MotionClassifier::new();

        // 20 deg holds both magnitude conditions; aggressive dwell (0.3 s)
        // arms first and outranks tilting.
        drive(&mut cls, 20.0, 0.0, &th, 0.0, 0.35);
        assert_eq!(cls.state(), MotionState::Aggressive);

        drive(&mut cls, 20.0, 0.0, &th, 0.35, 0.6);
        assert!(cls.tilt_mag_active());
        assert_eq!(cls.state(), MotionState::Aggressive);
    }

    #[test]
    fn test_rate_triggers_arm_on_rms() {
        let th = thresholds();
        let mut cls = MotionClassifier::new();

        drive(&mut cls, 0.0, 14.0, &th, 0.0, 0.45);
        assert!(cls.tilt_rate_active());
        assert_eq!(cls.state(), MotionState::Tilting);

        drive(&mut cls, 0.0, 25.0, &th, 0.45, 0.75);
        assert!(cls.aggressive_rate_active());
        assert_eq!(cls.state(), MotionState::Aggressive);

        // Both rate triggers share the 4 deg/s hysteresis floor.
        cls.update(0.0, 3.0, &th, 0.76);
        assert!(!cls.tilt_rate_active());
        assert!(!cls.aggressive_rate_active());
    }

    #[test]
    fn test_non_still_transition_applies_immediately() {
        let th = thresholds();
        let mut cls = MotionClassifier::new();
        drive(&mut cls, 10.0, 0.0, &th, 0.0, 0.6);
        assert_eq!(cls.state(), MotionState::Tilting);

        // Escalation to Aggressive is not debounced.
        drive(&mut cls, 20.0, 0.0, &th, 0.6, 0.95);
        assert_eq!(cls.state(), MotionState::Aggressive);
    }
}
