//! Frequency to bin index mapping
//!
//! Maps a requested channel onto the ascending list of filter bank bins that
//! have to be combined to synthesize it. A bin qualifies when its span
//! intersects the request; a request that only touches a bin at its edge does
//! not pull that bin in.

use crate::config::{ChannelizerConfig, TunerChannel};
use crate::error::{Error, Result};

/// Bins resolved for a channel request, with the configuration they were
/// resolved under.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDescriptor {
    bins: Vec<usize>,
    center_frequency: f64,
    config: ChannelizerConfig,
}

impl ChannelDescriptor {
    /// Ascending bin indices (one or two)
    pub fn bins(&self) -> &[usize] {
        &self.bins
    }

    /// Frequency that sits at DC of the synthesized bins: the bin center for
    /// a single bin, the shared edge for two adjacent bins.
    pub fn center_frequency(&self) -> f64 {
        self.center_frequency
    }

    pub fn config(&self) -> &ChannelizerConfig {
        &self.config
    }

    pub fn is_valid_for(&self, config: &ChannelizerConfig) -> bool {
        self.config == *config
    }
}

/// Resolve `request` against `config`.
///
/// # Example
/// ```
/// use channelizer::{ChannelizerConfig, TunerChannel, mapper};
///
/// let config = ChannelizerConfig::new(100_062_500, 10, 12_500, 2.0);
/// let descriptor = mapper::map(&config, &TunerChannel::new(100_006_250, 12_500)).unwrap();
/// assert_eq!(descriptor.bins(), &[0]);
/// ```
pub fn map(config: &ChannelizerConfig, request: &TunerChannel) -> Result<ChannelDescriptor> {
    let bins = bin_indices(config, request)?;
    let center_frequency = match bins.as_slice() {
        [bin] => config.bin_center_frequency(*bin),
        [lower, _] => config.bin_maximum_frequency(*lower) as f64,
        _ => return Err(Error::UnsupportedChannel { bins }),
    };
    Ok(ChannelDescriptor {
        bins,
        center_frequency,
        config: *config,
    })
}

/// All bins intersecting `request`, without the cardinality check.
pub fn bin_indices(config: &ChannelizerConfig, request: &TunerChannel) -> Result<Vec<usize>> {
    let minimum = config.minimum_frequency();
    let maximum = config.maximum_frequency();
    let requested_min = request.minimum_frequency();
    let requested_max = request.maximum_frequency();

    if requested_min < minimum || requested_max > maximum {
        return Err(Error::OutOfRange {
            requested_min,
            requested_max,
            available_min: minimum,
            available_max: maximum,
        });
    }
    if requested_max <= requested_min {
        return Err(Error::UnsupportedChannel { bins: Vec::new() });
    }

    let bandwidth = config.bin_bandwidth as i64;
    let start = ((requested_min - minimum) / bandwidth) as usize;
    let end = (((requested_max - minimum) / bandwidth) as usize).min(config.bin_count - 1);

    let bins = (start..=end)
        .filter(|&bin| {
            let bin_min = config.bin_minimum_frequency(bin);
            let bin_max = config.bin_maximum_frequency(bin);
            let inside = bin_min <= requested_min && requested_max <= bin_max;
            let overlaps_top = bin_min <= requested_min && requested_min < bin_max;
            let overlaps_bottom = requested_min < bin_min && bin_min < requested_max;
            inside || overlaps_top || overlaps_bottom
        })
        .collect();
    Ok(bins)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn golden() -> ChannelizerConfig {
        ChannelizerConfig::new(100_062_500, 10, 12_500, 2.0)
    }

    #[test]
    fn test_golden_request() {
        let descriptor = map(&golden(), &TunerChannel::new(100_006_250, 12_500)).unwrap();
        assert_eq!(descriptor.bins(), &[0]);
        assert_eq!(descriptor.center_frequency(), 100_006_250.0);
        assert!(descriptor.is_valid_for(&golden()));
    }

    #[test]
    fn test_every_bin_center_maps_to_its_bin() {
        let config = golden();
        for bin in 0..config.bin_count {
            let frequency = config.bin_center_frequency(bin) as u64;
            let descriptor = map(&config, &TunerChannel::new(frequency, 6_250)).unwrap();
            assert_eq!(descriptor.bins(), &[bin]);
        }
    }

    #[test]
    fn test_straddle_maps_to_adjacent_bins() {
        let config = golden();
        // centered on the edge between bins 3 and 4
        let edge = config.bin_maximum_frequency(3) as u64;
        let descriptor = map(&config, &TunerChannel::new(edge, 12_500)).unwrap();
        assert_eq!(descriptor.bins(), &[3, 4]);
        assert_eq!(descriptor.center_frequency(), edge as f64);
    }

    #[test]
    fn test_small_offset_straddle() {
        let config = golden();
        let descriptor = map(&config, &TunerChannel::new(100_012_000, 5_000)).unwrap();
        assert_eq!(descriptor.bins(), &[0, 1]);
    }

    #[test]
    fn test_out_of_range() {
        let config = golden();
        let below = map(&config, &TunerChannel::new(100_000_000, 12_500)).unwrap_err();
        assert!(matches!(below, Error::OutOfRange { .. }));
        let above = map(&config, &TunerChannel::new(100_125_000, 2)).unwrap_err();
        assert!(matches!(above, Error::OutOfRange { .. }));
    }

    #[test]
    fn test_edges_of_coverage_are_accepted() {
        let config = golden();
        let last = map(&config, &TunerChannel::new(100_118_750, 12_500)).unwrap();
        assert_eq!(last.bins(), &[9]);
    }

    #[test]
    fn test_three_bins_unsupported() {
        let config = golden();
        let err = map(&config, &TunerChannel::new(100_031_250, 25_000)).unwrap_err();
        match err {
            Error::UnsupportedChannel { bins } => assert_eq!(bins, vec![1, 2, 3]),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_zero_bandwidth_unsupported() {
        let err = map(&golden(), &TunerChannel::new(100_050_000, 0)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedChannel { ref bins } if bins.is_empty()));
    }

    #[test]
    fn test_descriptor_invalid_after_retune() {
        let descriptor = map(&golden(), &TunerChannel::new(100_006_250, 12_500)).unwrap();
        let retuned = ChannelizerConfig::new(100_100_000, 10, 12_500, 2.0);
        assert!(!descriptor.is_valid_for(&retuned));
    }
}
