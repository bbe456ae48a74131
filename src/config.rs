//! Channelizer configuration
//!
//! [`Settings`] carries the construction-time knobs of a channel manager and
//! can be loaded from JSON. [`ChannelizerConfig`] is the filter bank geometry
//! derived from the source (center frequency, sample rate) and the settings.
//! [`TunerChannel`] is what a consumer asks for: a center frequency and a
//! bandwidth.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::iqread::expanduser;

/// Construction-time settings for a channel manager.
///
/// # Example
/// ```
/// use channelizer::Settings;
///
/// let settings = Settings::from_json(r#"{ "channel_bandwidth": 25000 }"#).unwrap();
/// assert_eq!(settings.channel_bandwidth, 25_000);
/// assert_eq!(settings.taps_per_bin, 17);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Width of one filter bank bin in Hz
    pub channel_bandwidth: u32,
    /// Output rate of a bin relative to its bandwidth (only 2.0 is supported)
    pub oversampling: f64,
    /// Prototype filter length per bin
    pub taps_per_bin: usize,
    /// Period of the channel drain task in milliseconds
    pub drain_interval_ms: u64,
    /// Number of samples per buffer delivered downstream
    pub samples_per_buffer: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            channel_bandwidth: 12_500,
            oversampling: 2.0,
            taps_per_bin: 17,
            drain_interval_ms: 100,
            samples_per_buffer: 2048,
        }
    }
}

impl Settings {
    /// Parse settings from a JSON document; missing fields take their default
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::configuration(format!("invalid settings: {e}")))
    }

    /// Load settings from a JSON file (a leading `~` is expanded)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = expanduser(path.as_ref().to_path_buf());
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

/// Filter bank geometry.
///
/// Bin `i` spans `[min + i·bw, min + (i+1)·bw]` where `min` is the lowest
/// frequency covered by the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelizerConfig {
    pub center_frequency: u64,
    pub bin_count: usize,
    pub bin_bandwidth: u32,
    pub oversampling: f64,
}

impl ChannelizerConfig {
    pub fn new(
        center_frequency: u64,
        bin_count: usize,
        bin_bandwidth: u32,
        oversampling: f64,
    ) -> Self {
        Self {
            center_frequency,
            bin_count,
            bin_bandwidth,
            oversampling,
        }
    }

    /// Derive the geometry for a source, validating that a 2×-oversampled
    /// filter bank can be built on it.
    pub fn from_source(center_frequency: u64, sample_rate: u32, settings: &Settings) -> Result<Self> {
        let bandwidth = settings.channel_bandwidth;
        if bandwidth == 0 {
            return Err(Error::configuration("channel bandwidth must be greater than 0"));
        }
        if sample_rate == 0 || sample_rate % bandwidth != 0 {
            return Err(Error::configuration(format!(
                "sample rate {sample_rate} Hz is not an integer multiple of the channel bandwidth {bandwidth} Hz"
            )));
        }
        let bin_count = (sample_rate / bandwidth) as usize;
        if bin_count < 2 || bin_count % 2 != 0 {
            return Err(Error::configuration(format!(
                "sample rate {sample_rate} Hz yields {bin_count} bins, an even number of at least 2 is required"
            )));
        }
        if settings.oversampling != 2.0 {
            return Err(Error::configuration(format!(
                "oversampling {} is not supported, only 2.0 is",
                settings.oversampling
            )));
        }
        Ok(Self::new(center_frequency, bin_count, bandwidth, settings.oversampling))
    }

    pub fn sample_rate(&self) -> u32 {
        self.bin_count as u32 * self.bin_bandwidth
    }

    /// Sample rate of each bin output
    pub fn channel_sample_rate(&self) -> f64 {
        self.bin_bandwidth as f64 * self.oversampling
    }

    pub fn minimum_frequency(&self) -> i64 {
        self.center_frequency as i64 - self.sample_rate() as i64 / 2
    }

    pub fn maximum_frequency(&self) -> i64 {
        self.minimum_frequency() + self.sample_rate() as i64
    }

    pub fn bin_minimum_frequency(&self, bin: usize) -> i64 {
        self.minimum_frequency() + bin as i64 * self.bin_bandwidth as i64
    }

    pub fn bin_maximum_frequency(&self, bin: usize) -> i64 {
        self.bin_minimum_frequency(bin) + self.bin_bandwidth as i64
    }

    pub fn bin_center_frequency(&self, bin: usize) -> f64 {
        self.bin_minimum_frequency(bin) as f64 + self.bin_bandwidth as f64 / 2.0
    }
}

/// A channel requested by a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TunerChannel {
    pub frequency: u64,
    pub bandwidth: u32,
}

impl TunerChannel {
    pub fn new(frequency: u64, bandwidth: u32) -> Self {
        Self {
            frequency,
            bandwidth,
        }
    }

    pub fn minimum_frequency(&self) -> i64 {
        self.frequency as i64 - (self.bandwidth / 2) as i64
    }

    pub fn maximum_frequency(&self) -> i64 {
        self.minimum_frequency() + self.bandwidth as i64
    }
}

impl std::fmt::Display for TunerChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz ({} Hz wide)", self.frequency, self.bandwidth)
    }
}
