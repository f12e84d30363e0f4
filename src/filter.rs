// Copyright (c) 2022, Zachary D. Olkin.
// This code is provided under the MIT license.

use core::f64::consts::PI;

/// Default process noise of the angle.
pub const Q_ANGLE: f64 = 0.001;
/// Default process noise of the rate bias.
pub const Q_BIAS: f64 = 0.003;
/// Default measurement noise.
pub const R_MEASURE: f64 = 0.03;

/// Two-state Kalman filter fusing an angle observation (e.g. from the accelerometer) with an
/// angular rate (from the gyro). Tracks the angle and the gyro's constant bias.
///
/// The time step is passed to every [`AngleFilter::update`], so irregular sampling is fine. With a
/// zero time step the prediction does nothing and only the correction runs.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AngleFilter {
    q_angle: f64,
    q_bias: f64,
    r_measure: f64,

    angle: f64,
    bias: f64,
    rate: f64,

    p: [[f64; 2]; 2],
}

impl Default for AngleFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl AngleFilter {
    /// A filter at rest with the default noise terms.
    pub const fn new() -> Self {
        Self::with_noise(Q_ANGLE, Q_BIAS, R_MEASURE)
    }

    /// A filter at rest with the given noise terms. They should be non-negative.
    pub const fn with_noise(q_angle: f64, q_bias: f64, r_measure: f64) -> Self {
        Self {
            q_angle,
            q_bias,
            r_measure,
            angle: 0.0,
            bias: 0.0,
            rate: 0.0,
            p: [[0.0; 2]; 2],
        }
    }

    /// Runs one predict + correct step and returns the corrected angle.
    ///
    /// `new_angle` in degrees, `new_rate` in degrees per unit of `dt`.
    pub fn update(&mut self, new_angle: f64, new_rate: f64, dt: f64) -> f64 {
        self.rate = new_rate - self.bias;
        self.angle += dt * self.rate;

        self.p[0][0] += dt * (dt * self.p[1][1] - self.p[0][1] - self.p[1][0] + self.q_angle);
        self.p[0][1] -= dt * self.p[1][1];
        self.p[1][0] -= dt * self.p[1][1];
        self.p[1][1] += self.q_bias * dt;

        let s = self.p[0][0] + self.r_measure;

        let mut k = [0.0; 2];
        k[0] = self.p[0][0] / s;
        k[1] = self.p[1][0] / s;

        let y = new_angle - self.angle;
        self.angle += k[0] * y;
        self.bias += k[1] * y;

        // the second row is corrected with the already corrected first row
        self.p[0][0] -= k[0] * self.p[0][0];
        self.p[0][1] -= k[0] * self.p[0][1];
        self.p[1][0] -= k[1] * self.p[0][0];
        self.p[1][1] -= k[1] * self.p[0][1];

        self.angle
    }

    /// Current angle estimate.
    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Overrides the angle, e.g. to seed the filter with a first accelerometer reading.
    pub fn set_angle(&mut self, angle: f64) {
        self.angle = angle;
    }

    /// Unbiased rate from the last update.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Current rate bias estimate.
    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// Overrides the rate bias.
    pub fn set_bias(&mut self, bias: f64) {
        self.bias = bias;
    }

    /// Error covariance.
    pub fn covariance(&self) -> [[f64; 2]; 2] {
        self.p
    }

    /// Process noise of the angle.
    pub fn q_angle(&self) -> f64 {
        self.q_angle
    }

    /// Sets the process noise of the angle.
    pub fn set_q_angle(&mut self, q_angle: f64) {
        self.q_angle = q_angle;
    }

    /// Process noise of the rate bias.
    pub fn q_bias(&self) -> f64 {
        self.q_bias
    }

    /// Sets the process noise of the rate bias.
    pub fn set_q_bias(&mut self, q_bias: f64) {
        self.q_bias = q_bias;
    }

    /// Measurement noise.
    pub fn r_measure(&self) -> f64 {
        self.r_measure
    }

    /// Sets the measurement noise.
    pub fn set_r_measure(&mut self, r_measure: f64) {
        self.r_measure = r_measure;
    }
}

fn tilt(a: f64, b: f64) -> f64 {
    (libm::atan2(a, b) + PI) * 180.0 / PI - 180.0
}

/// Pitch in degrees from the x and z accelerometer axes.
pub fn pitch(x: f64, z: f64) -> f64 {
    tilt(x, z)
}

/// Roll in degrees from the y and z accelerometer axes.
pub fn roll(y: f64, z: f64) -> f64 {
    tilt(y, z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_update_regression() {
        let mut filter = AngleFilter::new();
        let angle = filter.update(10.0, 5.0, 1.0);

        assert!((angle - 5.161290322580645).abs() < 1e-12);
        assert!((angle - 160.0 / 31.0).abs() < 1e-12);
        assert_eq!(filter.bias(), 0.0);
        assert_eq!(filter.rate(), 5.0);

        let p = filter.covariance();
        assert!((p[0][0] - 0.000967741935483871).abs() < 1e-15);
        assert_eq!(p[0][1], 0.0);
        assert_eq!(p[1][0], 0.0);
        assert!((p[1][1] - 0.003).abs() < 1e-15);
    }

    #[test]
    fn bias_converges_to_constant_offset() {
        // still sensor with a gyro offset of 2 deg/s
        let mut filter = AngleFilter::new();
        let mut prev = f64::INFINITY;
        for _ in 0..8 {
            let mut worst: f64 = 0.0;
            for _ in 0..500 {
                filter.update(0.0, 2.0, 0.01);
                worst = worst.max((filter.bias() - 2.0).abs());
            }
            assert!(worst <= prev, "bias error grew: {} > {}", worst, prev);
            prev = worst;
        }
        assert!((filter.bias() - 2.0).abs() < 1e-6);
        assert!(filter.angle().abs() < 1e-6);
    }

    #[test]
    fn zero_innovation_leaves_bias_alone() {
        let mut filter = AngleFilter::new();
        for _ in 0..100 {
            filter.update(0.0, 0.0, 0.01);
        }
        assert_eq!(filter.bias(), 0.0);
        assert_eq!(filter.angle(), 0.0);
    }

    #[test]
    fn covariance_diagonal_stays_non_negative() {
        let dts = [0.0, 0.001, 0.005, 0.01, 0.02, 0.1];
        let mut filter = AngleFilter::new();
        for i in 0..2000usize {
            let dt = dts[(i * 7 + 3) % dts.len()];
            let angle = ((i * 37) % 41) as f64 - 20.0;
            let rate = ((i * 13) % 17) as f64 - 8.0;
            filter.update(angle, rate, dt);

            let p = filter.covariance();
            assert!(p[0][0] >= 0.0, "P00 negative at step {}", i);
            assert!(p[1][1] >= 0.0, "P11 negative at step {}", i);
        }
    }

    #[test]
    fn zero_time_step_skips_prediction() {
        let mut filter = AngleFilter::new();
        filter.set_angle(3.0);
        let angle = filter.update(1.0, 50.0, 0.0);
        // no covariance yet, so no correction either
        assert_eq!(angle, 3.0);
        assert!(angle.is_finite());
    }

    #[test]
    fn set_r_measure_changes_noise_not_angle() {
        let mut filter = AngleFilter::new();
        filter.update(10.0, 5.0, 1.0);
        let angle = filter.angle();

        filter.set_r_measure(0.5);
        assert_eq!(filter.r_measure(), 0.5);
        assert_eq!(filter.angle(), angle);
    }

    #[test]
    fn noise_setters() {
        let mut filter = AngleFilter::with_noise(0.1, 0.2, 0.3);
        assert_eq!(filter.q_angle(), 0.1);
        assert_eq!(filter.q_bias(), 0.2);
        filter.set_q_angle(0.4);
        filter.set_q_bias(0.5);
        filter.set_bias(1.5);
        assert_eq!(filter.q_angle(), 0.4);
        assert_eq!(filter.q_bias(), 0.5);
        assert_eq!(filter.bias(), 1.5);
        assert_eq!(AngleFilter::default(), AngleFilter::new());
    }

    #[test]
    fn tilt_from_gravity() {
        assert!(pitch(0.0, 1.0).abs() < 1e-9);
        assert!((pitch(1.0, 0.0) - 90.0).abs() < 1e-9);
        assert!((roll(-1.0, 0.0) + 90.0).abs() < 1e-9);
        assert!((roll(1.0, 1.0) - 45.0).abs() < 1e-9);
    }
}
