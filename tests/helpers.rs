//! Test helper utilities for generating synthetic wideband signals

#![allow(dead_code)]

use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};

use channelizer::{ChannelizerConfig, SampleSource};
use num_complex::Complex;

/// Complex tone at an absolute `frequency` for a source tuned to
/// `center_frequency`
///
/// # Arguments
/// * `frequency` - Tone frequency in Hz
/// * `center_frequency` - Source center frequency in Hz
/// * `sample_rate` - Sample rate in Hz
/// * `num_samples` - Number of samples to generate
pub fn tone(frequency: f64, center_frequency: u64, sample_rate: u32, num_samples: usize) -> Vec<Complex<f32>> {
    let step = 2.0 * PI * (frequency - center_frequency as f64) / sample_rate as f64;
    (0..num_samples)
        .map(|n| Complex::from_polar(1.0, ((step * n as f64) % (2.0 * PI)) as f32))
        .collect()
}

/// Complex tone for the source described by `config`
pub fn config_tone(config: &ChannelizerConfig, frequency: f64, num_samples: usize) -> Vec<Complex<f32>> {
    tone(frequency, config.center_frequency, config.sample_rate(), num_samples)
}

/// Complex sine wave as interleaved I/Q bytes (format: Cu8)
pub fn generate_sine_wave_cu8(frequency: f64, sample_rate: u32, num_samples: usize) -> Vec<u8> {
    tone(frequency, 0, sample_rate, num_samples)
        .iter()
        .flat_map(|s| [((s.re + 1.0) * 127.5) as u8, ((s.im + 1.0) * 127.5) as u8])
        .collect()
}

/// Complex samples as interleaved I/Q bytes (format: Cf32, little-endian)
pub fn to_cf32_bytes(samples: &[Complex<f32>]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|s| {
            let mut bytes = [0u8; 8];
            bytes[..4].copy_from_slice(&s.re.to_le_bytes());
            bytes[4..].copy_from_slice(&s.im.to_le_bytes());
            bytes
        })
        .collect()
}

/// Sample source counting stream start and stop requests
pub struct CountingSource {
    pub center_frequency: u64,
    pub sample_rate: u32,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl CountingSource {
    pub fn new(center_frequency: u64, sample_rate: u32) -> Self {
        Self {
            center_frequency,
            sample_rate,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl SampleSource for CountingSource {
    fn center_frequency(&self) -> u64 {
        self.center_frequency
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start_sample_stream(&self) -> channelizer::Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_sample_stream(&self) -> channelizer::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_sine_wave_cu8_length() {
        let samples = generate_sine_wave_cu8(1000.0, 96000, 100);
        assert_eq!(samples.len(), 200); // 100 samples * 2 bytes per sample
    }

    #[test]
    fn test_tone_unit_amplitude() {
        for s in tone(100_010_000.0, 100_000_000, 125_000, 64) {
            assert!((s.norm() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_to_cf32_bytes_length() {
        let samples = vec![Complex::new(0.5f32, -0.5); 10];
        assert_eq!(to_cf32_bytes(&samples).len(), 80);
    }
}
