use num_complex::Complex;

use crate::dsp::DspBlock;

/// A DSP block that applies a complex rotation to a sequence of samples.
///
/// The `Rotate` struct maintains an internal complex rotation state (`rot`)
/// and a multiplier (`mult`) that represents the rotation per sample, determined
/// by the given angle in radians. Changing the angle keeps the current phase,
/// so a retuned mixer does not introduce a phase jump.
///
/// # Example
/// ```
/// use num_complex::Complex;
/// use channelizer::dsp::{DspBlock, Rotate};
///
/// let mut rotator = Rotate::new(std::f32::consts::FRAC_PI_2); // 90 degrees per sample
/// let input = vec![Complex::new(1.0, 0.0); 4];
/// let output = rotator.process(&input);
/// assert!((output[1].im - 1.0).abs() < 1e-6);
/// ```
pub struct Rotate {
    /// Per-sample rotation in radians
    angle: f32,
    /// Current complex rotation factor
    rot: Complex<f32>,
    /// Per-sample rotation multiplier
    mult: Complex<f32>,
}

impl Rotate {
    /// Create a new Rotate DSP block with the specified rotation angle in radians
    pub fn new(angle: f32) -> Self {
        Self {
            angle,
            rot: Complex::new(1.0, 0.0),
            mult: Complex::from_polar(1.0, angle),
        }
    }

    /// Change the per-sample rotation, keeping the current phase
    pub fn set_angle(&mut self, angle: f32) {
        self.angle = angle;
        self.mult = Complex::from_polar(1.0, angle);
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }
}

impl DspBlock for Rotate {
    /// Process a slice of complex samples, applying the rotation
    fn process(&mut self, data: &[Complex<f32>]) -> Vec<Complex<f32>> {
        let mut out = Vec::with_capacity(data.len());
        for &s in data {
            out.push(s * self.rot);
            self.rot *= self.mult;
        }
        if self.rot.norm() > 0.0 {
            self.rot /= self.rot.norm();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_angle_is_identity() {
        let mut rotate = Rotate::new(0.0);
        let input: Vec<_> = (0..8).map(|n| Complex::new(n as f32, -(n as f32))).collect();
        assert_eq!(rotate.process(&input), input);
    }

    #[test]
    fn test_set_angle_keeps_phase() {
        let mut rotate = Rotate::new(std::f32::consts::FRAC_PI_2);
        let out = rotate.process(&[Complex::new(1.0, 0.0); 1]);
        assert_relative_eq!(out[0].re, 1.0);
        // phase is now π/2
        rotate.set_angle(0.0);
        assert_eq!(rotate.angle(), 0.0);
        let out = rotate.process(&[Complex::new(1.0, 0.0); 2]);
        for s in out {
            assert_relative_eq!(s.re, 0.0, epsilon = 1e-6);
            assert_relative_eq!(s.im, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_rotation_moves_tone_to_dc() {
        let angle = 0.3f32;
        let tone: Vec<_> = (0..64)
            .map(|n| Complex::from_polar(1.0, angle * n as f32))
            .collect();
        let mut rotate = Rotate::new(-angle);
        for s in rotate.process(&tone) {
            assert_relative_eq!(s.re, 1.0, epsilon = 1e-4);
            assert_relative_eq!(s.im, 0.0, epsilon = 1e-4);
        }
    }
}
