//! Prototype filter design.
//!
//! The polyphase filter bank splits a single low-pass prototype across its
//! arms. The prototype is a Kaiser-windowed sinc whose cutoff sits at half the
//! channel spacing, so that it is 6 dB down at the edge of each channel and
//! adjacent channels sum back to unity gain.
//!
//! # Example
//!
//! ```
//! use channelizer::dsp::filters::PrototypeFilter;
//!
//! // 10 channels, 17 taps per channel, 80 dB stopband
//! let prototype = PrototypeFilter::new(10, 17, 80.0).unwrap();
//! assert_eq!(prototype.taps(), 169);
//!
//! // -6 dB at the channel edge
//! let edge = prototype.frequency_response_db(0.05);
//! assert!((edge + 6.0).abs() < 0.5);
//! ```

use std::f64::consts::PI;

use crate::error::{Error, Result};

/// Stopband attenuation used by the filter bank
pub const DEFAULT_ATTENUATION_DB: f64 = 80.0;

/// Low-pass prototype of an M-channel polyphase filter bank.
///
/// # Design Method
///
/// 1. Ideal sinc with a cutoff of `0.5 / channels` cycles per sample
/// 2. Kaiser window sized for the requested stopband attenuation
/// 3. Normalization to unity gain at DC
///
/// The length is `channels × taps_per_channel − 1`: odd, so the filter has a
/// center tap, and one short of filling every arm, so the last arm is
/// zero-padded by one tap.
pub struct PrototypeFilter {
    fir: Vec<f32>,
    channels: usize,
    taps_per_channel: usize,
}

impl PrototypeFilter {
    /// Design the prototype filter.
    ///
    /// # Arguments
    ///
    /// * `channels` - Number of filter bank channels (must be > 0)
    /// * `taps_per_channel` - Taps per polyphase arm (must be > 0)
    /// * `attenuation_db` - Stopband attenuation in dB (must be > 0)
    ///
    /// # Errors
    ///
    /// Returns [`Error::FilterDesign`] when a parameter is out of range or the
    /// resulting filter would have fewer than two taps.
    pub fn new(channels: usize, taps_per_channel: usize, attenuation_db: f64) -> Result<Self> {
        if channels == 0 {
            return Err(Error::filter_design("number of channels must be greater than 0"));
        }
        if taps_per_channel == 0 {
            return Err(Error::filter_design("taps per channel must be greater than 0"));
        }
        if attenuation_db <= 0.0 {
            return Err(Error::filter_design("attenuation must be greater than 0 dB"));
        }
        let length = channels * taps_per_channel - 1;
        if length < 2 {
            return Err(Error::filter_design(format!(
                "{channels} channels with {taps_per_channel} taps each is too short for a filter"
            )));
        }

        let cutoff = 0.5 / channels as f64;
        let window = kaiser_window(length, kaiser_beta(attenuation_db));
        let mid = (length - 1) as f64 / 2.0;

        let mut fir: Vec<f64> = window
            .iter()
            .enumerate()
            .map(|(n, w)| {
                let x = n as f64 - mid;
                let sinc = if x == 0.0 {
                    2.0 * cutoff
                } else {
                    (2.0 * PI * cutoff * x).sin() / (PI * x)
                };
                sinc * w
            })
            .collect();

        // Normalize to unity gain
        let norm: f64 = fir.iter().sum();
        if norm.abs() < f64::EPSILON {
            return Err(Error::filter_design("prototype filter has no DC gain"));
        }
        for v in fir.iter_mut() {
            *v /= norm;
        }

        Ok(Self {
            fir: fir.into_iter().map(|v| v as f32).collect(),
            channels,
            taps_per_channel,
        })
    }

    pub fn taps(&self) -> usize {
        self.fir.len()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Taps held by each polyphase arm (the last arm is zero-padded)
    pub fn taps_per_channel(&self) -> usize {
        self.taps_per_channel
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.fir
    }

    /// Magnitude response in dB at `frequency`, in cycles per sample
    pub fn frequency_response_db(&self, frequency: f64) -> f64 {
        let (re, im) = self
            .fir
            .iter()
            .enumerate()
            .fold((0.0f64, 0.0f64), |(re, im), (n, &h)| {
                let phase = -2.0 * PI * frequency * n as f64;
                (re + h as f64 * phase.cos(), im + h as f64 * phase.sin())
            });
        20.0 * (re.hypot(im)).log10()
    }
}

/// Kaiser window shape parameter for a given stopband attenuation in dB
pub fn kaiser_beta(attenuation_db: f64) -> f64 {
    if attenuation_db > 50.0 {
        0.1102 * (attenuation_db - 8.7)
    } else if attenuation_db >= 21.0 {
        0.5842 * (attenuation_db - 21.0).powf(0.4) + 0.07886 * (attenuation_db - 21.0)
    } else {
        0.0
    }
}

/// Kaiser window of `length` points
pub fn kaiser_window(length: usize, beta: f64) -> Vec<f64> {
    if length == 1 {
        return vec![1.0];
    }
    let denominator = bessel_i0(beta);
    let span = (length - 1) as f64;
    (0..length)
        .map(|n| {
            let ratio = 2.0 * n as f64 / span - 1.0;
            bessel_i0(beta * (1.0 - ratio * ratio).max(0.0).sqrt()) / denominator
        })
        .collect()
}

/// Zeroth order modified Bessel function of the first kind (series expansion)
pub fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut sum = 1.0;
    let mut term = 1.0;
    for k in 1..64 {
        term *= half / k as f64;
        let squared = term * term;
        sum += squared;
        if squared < sum * 1e-16 {
            break;
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_prototype_length() {
        let prototype = PrototypeFilter::new(10, 17, 80.0).unwrap();
        assert_eq!(prototype.taps(), 169);
        assert_eq!(prototype.channels(), 10);
        assert_eq!(prototype.taps_per_channel(), 17);
    }

    #[test]
    fn test_prototype_coefficients_normalized() {
        let prototype = PrototypeFilter::new(16, 17, 80.0).unwrap();
        let sum: f32 = prototype.coefficients().iter().sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-5);
        assert_relative_eq!(prototype.frequency_response_db(0.0), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_prototype_symmetric() {
        let prototype = PrototypeFilter::new(8, 9, 80.0).unwrap();
        let fir = prototype.coefficients();
        for n in 0..fir.len() / 2 {
            assert_relative_eq!(fir[n], fir[fir.len() - 1 - n], epsilon = 1e-7);
        }
    }

    #[test]
    fn test_prototype_edge_is_6db_down() {
        for channels in [4, 10, 16] {
            let prototype = PrototypeFilter::new(channels, 17, 80.0).unwrap();
            let edge = prototype.frequency_response_db(0.5 / channels as f64);
            assert!((edge + 6.02).abs() < 0.5, "edge response {edge} dB");
        }
    }

    #[test]
    fn test_prototype_stopband() {
        let prototype = PrototypeFilter::new(10, 17, 80.0).unwrap();
        // center of the adjacent channel and beyond
        for f in [0.1, 0.15, 0.25, 0.5] {
            let response = prototype.frequency_response_db(f);
            assert!(response < -60.0, "response at {f} is {response} dB");
        }
    }

    #[test]
    fn test_prototype_invalid_parameters() {
        assert!(matches!(
            PrototypeFilter::new(0, 17, 80.0),
            Err(Error::FilterDesign(_))
        ));
        assert!(PrototypeFilter::new(10, 0, 80.0).is_err());
        assert!(PrototypeFilter::new(10, 17, 0.0).is_err());
        assert!(PrototypeFilter::new(2, 1, 80.0).is_err());
    }

    #[test]
    fn test_bessel_i0() {
        assert_relative_eq!(bessel_i0(0.0), 1.0);
        assert_relative_eq!(bessel_i0(1.0), 1.266_065_877_752_008, epsilon = 1e-12);
        assert_relative_eq!(bessel_i0(5.0), 27.239_871_823_604_45, epsilon = 1e-9);
    }

    #[test]
    fn test_kaiser_window_shape() {
        let window = kaiser_window(21, kaiser_beta(80.0));
        assert_relative_eq!(window[10], 1.0);
        assert_relative_eq!(window[0], window[20]);
        assert!(window[0] < 1e-2);
        assert_eq!(kaiser_beta(10.0), 0.0);
    }
}
