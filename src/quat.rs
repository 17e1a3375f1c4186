//! Quaternion algebra for the orientation pipeline.
//!
//! The IMU delivers a pre-fused orientation quaternion; this module only
//! normalizes, interpolates, and converts it. Everything here is pure and
//! stateless.

use serde::{Deserialize, Serialize};

/// Orientation quaternion, `(x, y, z, w)` with `w` the scalar part.
///
/// Unit-norm after [`Quaternion::normalize`]; passed by value between
/// pipeline stages.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

/// Roll/pitch/yaw in degrees, derived from a quaternion each sample.
/// Never stored as a source of truth.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Quaternion {
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// Identity rotation.
    pub fn identity() -> Self {
        Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 }
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    pub fn dot(&self, other: &Quaternion) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    /// Normalize to unit length. A zero-magnitude quaternion yields the
    /// identity rather than NaN components.
    pub fn normalize(&self) -> Quaternion {
        let mag = self.norm();
        if mag == 0.0 {
            return Quaternion::identity();
        }
        Quaternion::new(self.x / mag, self.y / mag, self.z / mag, self.w / mag)
    }

    fn negate(&self) -> Quaternion {
        Quaternion::new(-self.x, -self.y, -self.z, -self.w)
    }

    /// Convert to aerospace roll/pitch/yaw in degrees.
    ///
    /// The pitch arcsine argument is clamped so gimbal-lock inputs report
    /// exactly ±90° instead of NaN.
    pub fn to_euler(&self) -> EulerAngles {
        // roll (x-axis rotation)
        let sinr_cosp = 2.0 * (self.w * self.x + self.y * self.z);
        let cosr_cosp = 1.0 - 2.0 * (self.x * self.x + self.y * self.y);
        let roll = sinr_cosp.atan2(cosr_cosp);

        // pitch (y-axis rotation), gimbal lock clamped
        let sinp = 2.0 * (self.w * self.y - self.z * self.x);
        let pitch = if sinp.abs() >= 1.0 {
            (std::f64::consts::FRAC_PI_2).copysign(sinp)
        } else {
            sinp.asin()
        };

        // yaw (z-axis rotation)
        let siny_cosp = 2.0 * (self.w * self.z + self.x * self.y);
        let cosy_cosp = 1.0 - 2.0 * (self.y * self.y + self.z * self.z);
        let yaw = siny_cosp.atan2(cosy_cosp);

        EulerAngles {
            roll: roll.to_degrees(),
            pitch: pitch.to_degrees(),
            yaw: yaw.to_degrees(),
        }
    }
}

/// Shortest-path spherical linear interpolation, `t` in `[0, 1]`.
///
/// Two fallback branches are load-bearing, not optimizations:
/// - a negative dot product flips `q2` so the blend takes the short arc;
/// - near-parallel inputs (`|dot| > 0.9995`) use lerp + normalize, since the
///   sine-weighted formula divides by a vanishing `sin(theta)` there.
pub fn slerp(q1: Quaternion, q2: Quaternion, t: f64) -> Quaternion {
    let mut q2 = q2;
    let mut dot = q1.dot(&q2);

    if dot < 0.0 {
        q2 = q2.negate();
        dot = -dot;
    }

    if dot > 0.9995 {
        let lerp = Quaternion::new(
            q1.x + t * (q2.x - q1.x),
            q1.y + t * (q2.y - q1.y),
            q1.z + t * (q2.z - q1.z),
            q1.w + t * (q2.w - q1.w),
        );
        return lerp.normalize();
    }

    let theta = dot.abs().acos();
    let sin_theta = theta.sin();
    let a = ((1.0 - t) * theta).sin() / sin_theta;
    let b = (t * theta).sin() / sin_theta;

    Quaternion::new(
        a * q1.x + b * q2.x,
        a * q1.y + b * q2.y,
        a * q1.z + b * q2.z,
        a * q1.w + b * q2.w,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quat_close(a: Quaternion, b: Quaternion, eps: f64) {
        assert_relative_eq!(a.x, b.x, epsilon = eps);
        assert_relative_eq!(a.y, b.y, epsilon = eps);
        assert_relative_eq!(a.z, b.z, epsilon = eps);
        assert_relative_eq!(a.w, b.w, epsilon = eps);
    }

    #[test]
    fn test_normalize_idempotent_on_unit() {
        let q = Quaternion::new(0.5, 0.5, 0.5, 0.5);
        quat_close(q.normalize(), q, 1e-12);

        let half = std::f64::consts::FRAC_PI_4;
        let q = Quaternion::new(half.sin(), 0.0, 0.0, half.cos());
        quat_close(q.normalize(), q, 1e-12);
    }

    #[test]
    fn test_normalize_zero_yields_identity() {
        let q = Quaternion::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(q.normalize(), Quaternion::identity());
    }

    #[test]
    fn test_normalize_scales_magnitude() {
        let q = Quaternion::new(2.0, 0.0, 0.0, 0.0).normalize();
        assert_relative_eq!(q.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(q.x, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_slerp_identity_property() {
        let q = Quaternion::new(0.1, 0.2, 0.3, 0.9).normalize();
        for t in [0.0, 0.25, 0.5, 0.75, 1.0] {
            quat_close(slerp(q, q, t), q, 1e-9);
        }
    }

    #[test]
    fn test_slerp_boundaries() {
        let q1 = Quaternion::identity();
        let axis = std::f64::consts::FRAC_PI_3;
        let q2 = Quaternion::new((axis / 2.0).sin(), 0.0, 0.0, (axis / 2.0).cos());

        quat_close(slerp(q1, q2, 0.0), q1, 1e-9);
        quat_close(slerp(q1, q2, 1.0), q2, 1e-9);
    }

    #[test]
    fn test_slerp_takes_short_arc() {
        // q2 negated represents the same rotation; slerp must not swing the
        // long way around.
        let q1 = Quaternion::identity();
        let half = std::f64::consts::FRAC_PI_8;
        let q2 = Quaternion::new(half.sin(), 0.0, 0.0, half.cos()).negate();

        let mid = slerp(q1, q2, 0.5);
        assert!(q1.dot(&mid).abs() > 0.9);
        assert!(mid.norm() > 0.999 && mid.norm() < 1.001);
    }

    #[test]
    fn test_slerp_near_parallel_no_nan() {
        let q1 = Quaternion::identity();
        let q2 = Quaternion::new(1e-8, 0.0, 0.0, 1.0).normalize();
        let out = slerp(q1, q2, 0.5);
        assert!(out.x.is_finite() && out.w.is_finite());
        assert_relative_eq!(out.norm(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_euler_gimbal_lock_clamped() {
        // sin(pitch-arg) = 2(wy - zx); w = y = sqrt(0.5) drives it to 1.
        let s = 0.5_f64.sqrt();
        let up = Quaternion::new(0.0, s, 0.0, s);
        let e = up.to_euler();
        assert!(!e.pitch.is_nan());
        assert_relative_eq!(e.pitch, 90.0, epsilon = 1e-9);

        let down = Quaternion::new(0.0, -s, 0.0, s);
        let e = down.to_euler();
        assert_relative_eq!(e.pitch, -90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_euler_pure_roll() {
        let angle = 30.0_f64.to_radians();
        let q = Quaternion::new((angle / 2.0).sin(), 0.0, 0.0, (angle / 2.0).cos());
        let e = q.to_euler();
        assert_relative_eq!(e.roll, 30.0, epsilon = 1e-9);
        assert_relative_eq!(e.pitch, 0.0, epsilon = 1e-9);
        assert_relative_eq!(e.yaw, 0.0, epsilon = 1e-9);
    }
}
