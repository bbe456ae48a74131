//! Channel output processors
//!
//! An output processor turns filter bank blocks into the baseband stream of
//! one channel: it picks its bin (or combines two adjacent bins), mixes the
//! requested frequency down to DC, and hands out fixed-size buffers.

use std::f64::consts::PI;

use num_complex::Complex;

use crate::channelizer::engine::ResultBatch;
use crate::config::{Settings, TunerChannel};
use crate::dsp::{DspBlock, Rotate};
use crate::error::{Error, Result};
use crate::mapper::ChannelDescriptor;

/// Output processor selected by the number of bins a channel spans.
pub enum OutputProcessor {
    OneBin(OneBinProcessor),
    TwoBin(TwoBinProcessor),
}

impl OutputProcessor {
    /// Build the processor matching the descriptor's bin count.
    ///
    /// # Example
    /// ```
    /// use channelizer::{ChannelizerConfig, OutputProcessor, Settings, TunerChannel, mapper};
    ///
    /// let config = ChannelizerConfig::new(100_062_500, 10, 12_500, 2.0);
    /// let request = TunerChannel::new(100_012_500, 12_500);
    /// let descriptor = mapper::map(&config, &request).unwrap();
    /// let processor = OutputProcessor::new(&descriptor, &request, &Settings::default()).unwrap();
    /// assert!(matches!(processor, OutputProcessor::TwoBin(_)));
    /// ```
    pub fn new(
        descriptor: &ChannelDescriptor,
        request: &TunerChannel,
        settings: &Settings,
    ) -> Result<Self> {
        let mixer = Mixer::new(descriptor, request, settings.samples_per_buffer);
        match *descriptor.bins() {
            [bin] => Ok(OutputProcessor::OneBin(OneBinProcessor { bin, mixer })),
            [lower, upper] if upper == lower + 1 => Ok(OutputProcessor::TwoBin(TwoBinProcessor {
                lower,
                phase_reference: settings.taps_per_bin as u64,
                mixer,
            })),
            _ => Err(Error::UnsupportedChannel {
                bins: descriptor.bins().to_vec(),
            }),
        }
    }

    /// Number of bins combined by this processor
    pub fn bin_count(&self) -> usize {
        match self {
            OutputProcessor::OneBin(_) => 1,
            OutputProcessor::TwoBin(_) => 2,
        }
    }

    pub fn bins(&self) -> Vec<usize> {
        match self {
            OutputProcessor::OneBin(p) => vec![p.bin],
            OutputProcessor::TwoBin(p) => vec![p.lower, p.lower + 1],
        }
    }

    /// Process every block of `batch`, appending output samples.
    ///
    /// # Errors
    ///
    /// [`Error::Processing`] when a block is too short for the processor's
    /// bins; the blocks of the batch are then all dropped.
    pub fn process(&mut self, batch: &ResultBatch) -> Result<()> {
        let samples = match self {
            OutputProcessor::OneBin(p) => p.extract(batch)?,
            OutputProcessor::TwoBin(p) => p.extract(batch)?,
        };
        self.mixer_mut().push(&samples);
        Ok(())
    }

    /// Retarget the processor to new bins with the same cardinality.
    pub fn set_bins(&mut self, descriptor: &ChannelDescriptor, request: &TunerChannel) -> Result<()> {
        match (&mut *self, descriptor.bins()) {
            (OutputProcessor::OneBin(p), &[bin]) => p.bin = bin,
            (OutputProcessor::TwoBin(p), &[lower, upper]) if upper == lower + 1 => p.lower = lower,
            (_, bins) => {
                return Err(Error::UnsupportedChannel {
                    bins: bins.to_vec(),
                });
            }
        }
        self.mixer_mut().retune(descriptor, request);
        Ok(())
    }

    pub fn set_frequency_correction(&mut self, correction: i64) {
        self.mixer_mut().set_correction(correction);
    }

    pub fn frequency_correction(&self) -> i64 {
        self.mixer().correction
    }

    /// Frequency shift applied by the mixer in Hz
    pub fn frequency_offset(&self) -> f64 {
        self.mixer().offset + self.mixer().correction as f64
    }

    /// Full buffers accumulated so far
    pub fn take_ready(&mut self) -> Vec<Vec<Complex<f32>>> {
        self.mixer_mut().take_ready()
    }

    /// Everything accumulated so far, if anything
    pub fn flush(&mut self) -> Option<Vec<Complex<f32>>> {
        let pending = std::mem::take(&mut self.mixer_mut().pending);
        (!pending.is_empty()).then_some(pending)
    }

    pub fn discard(&mut self) {
        self.mixer_mut().pending.clear();
    }

    pub fn pending_samples(&self) -> usize {
        self.mixer().pending.len()
    }

    fn mixer(&self) -> &Mixer {
        match self {
            OutputProcessor::OneBin(p) => &p.mixer,
            OutputProcessor::TwoBin(p) => &p.mixer,
        }
    }

    fn mixer_mut(&mut self) -> &mut Mixer {
        match self {
            OutputProcessor::OneBin(p) => &mut p.mixer,
            OutputProcessor::TwoBin(p) => &mut p.mixer,
        }
    }
}

/// Channel contained in a single bin.
pub struct OneBinProcessor {
    bin: usize,
    mixer: Mixer,
}

impl OneBinProcessor {
    fn extract(&self, batch: &ResultBatch) -> Result<Vec<Complex<f32>>> {
        batch
            .blocks
            .iter()
            .map(|block| {
                block
                    .get(self.bin)
                    .copied()
                    .ok_or_else(|| stale_block(block.len(), self.bin))
            })
            .collect()
    }
}

// e^{-jπq/2}
const QUARTER_TURNS: [Complex<f32>; 4] = [
    Complex::new(1.0, 0.0),
    Complex::new(0.0, -1.0),
    Complex::new(-1.0, 0.0),
    Complex::new(0.0, 1.0),
];

/// Channel straddling the edge between bins `lower` and `lower + 1`.
///
/// Both bins are shifted by half a bin towards their shared edge and summed.
/// The prototype is 6 dB down at the bin edges, so the two halves add back to
/// unity gain across the edge. The shift rotates a quarter turn per block; it
/// is referenced to the block index offset by the prototype delay so the two
/// halves stay in phase.
pub struct TwoBinProcessor {
    lower: usize,
    phase_reference: u64,
    mixer: Mixer,
}

impl TwoBinProcessor {
    fn extract(&self, batch: &ResultBatch) -> Result<Vec<Complex<f32>>> {
        let upper = self.lower + 1;
        let reference = 4 - self.phase_reference % 4;
        batch
            .indexed_blocks()
            .map(|(index, block)| {
                if block.len() <= upper {
                    return Err(stale_block(block.len(), upper));
                }
                let quarter = ((index + reference) % 4) as usize;
                Ok(block[self.lower] * QUARTER_TURNS[quarter]
                    + block[upper] * QUARTER_TURNS[quarter].conj())
            })
            .collect()
    }
}

fn stale_block(length: usize, bin: usize) -> Error {
    Error::processing(format!("block of {length} bins has no bin {bin}"))
}

/// Final frequency translation and output buffering shared by both
/// processors.
struct Mixer {
    rotate: Rotate,
    /// Synthesized center minus requested frequency
    offset: f64,
    correction: i64,
    sample_rate: f64,
    pending: Vec<Complex<f32>>,
    samples_per_buffer: usize,
}

impl Mixer {
    fn new(descriptor: &ChannelDescriptor, request: &TunerChannel, samples_per_buffer: usize) -> Self {
        let mut mixer = Self {
            rotate: Rotate::new(0.0),
            offset: 0.0,
            correction: 0,
            sample_rate: descriptor.config().channel_sample_rate(),
            pending: Vec::new(),
            samples_per_buffer: samples_per_buffer.max(1),
        };
        mixer.retune(descriptor, request);
        mixer
    }

    fn retune(&mut self, descriptor: &ChannelDescriptor, request: &TunerChannel) {
        self.offset = descriptor.center_frequency() - request.frequency as f64;
        self.sample_rate = descriptor.config().channel_sample_rate();
        self.update_angle();
    }

    fn set_correction(&mut self, correction: i64) {
        self.correction = correction;
        self.update_angle();
    }

    fn update_angle(&mut self) {
        let shift = self.offset + self.correction as f64;
        self.rotate
            .set_angle((2.0 * PI * shift / self.sample_rate) as f32);
    }

    fn push(&mut self, samples: &[Complex<f32>]) {
        let mixed = self.rotate.process(samples);
        self.pending.extend(mixed);
    }

    fn take_ready(&mut self) -> Vec<Vec<Complex<f32>>> {
        let ready = self.pending.len() / self.samples_per_buffer * self.samples_per_buffer;
        if ready == 0 {
            return Vec::new();
        }
        let rest = self.pending.split_off(ready);
        let full = std::mem::replace(&mut self.pending, rest);
        full.chunks(self.samples_per_buffer)
            .map(<[Complex<f32>]>::to_vec)
            .collect()
    }
}
