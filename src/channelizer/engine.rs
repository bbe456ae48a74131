//! 2×-oversampled polyphase filter bank.
//!
//! The engine splits the source band into `M` evenly spaced bins, each
//! `sample_rate / M` wide, and produces one block of `M` bin samples every
//! `M / 2` input samples, so each bin is sampled at twice its bandwidth.
//!
//! Input samples are written in reverse order into the columns of a
//! `[tap_count][M]` grid. Halfway through a column (the mid-point cycle) the
//! lower half of the grid is convolved with the upper half of the arms against
//! the previous column, and the upper half with the lower arms against the
//! current column; once the column is full (the top-of-block cycle) every slot
//! is convolved with its own arm. The convolved slots feed an inverse FFT that
//! separates the bins.
//!
//! Block `m` is the output produced after `m × M/2` input samples since the
//! last reinitialization; bin `i` of every block holds the baseband signal of
//! mapper bin `i`, centered on that bin's center frequency.

use std::f32::consts::PI;
use std::sync::Arc;

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use tracing::debug;

use crate::channelizer::ChannelId;
use crate::config::ChannelizerConfig;
use crate::dsp::filters::{DEFAULT_ATTENUATION_DB, PrototypeFilter};
use crate::error::{Error, Result};

/// Blocks produced by one call to [`PolyphaseChannelizer::receive`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResultBatch {
    /// Block index of `blocks[0]`
    pub first_block: u64,
    pub blocks: Vec<Vec<Complex<f32>>>,
}

impl ResultBatch {
    pub fn new(first_block: u64, blocks: Vec<Vec<Complex<f32>>>) -> Self {
        Self {
            first_block,
            blocks,
        }
    }

    /// Blocks paired with their absolute block index
    pub fn indexed_blocks(&self) -> impl Iterator<Item = (u64, &[Complex<f32>])> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(n, block)| (self.first_block + n as u64, block.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Receiver of filter bank output, called on the producer thread.
pub trait ResultConsumer: Send + Sync {
    fn receive_results(&self, batch: Arc<ResultBatch>);
}

pub struct PolyphaseChannelizer {
    config: ChannelizerConfig,
    taps_per_bin: usize,
    /// Arm coefficients, oldest tap first
    coefficients: Vec<Vec<f32>>,
    /// Input sample grid, `[column][slot]`
    samples: Vec<Vec<Complex<f32>>>,
    /// `index_map[pointer][tap]`: grid column convolved with `tap`
    index_map: Vec<Vec<usize>>,
    column: usize,
    row: usize,
    /// Half-bin derotation phasors, indexed by sample count mod 2M
    derotation: Vec<Complex<f32>>,
    derotation_index: usize,
    block_count: u64,
    fft: Arc<dyn Fft<f32>>,
    fft_buffer: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    consumers: Vec<(ChannelId, Arc<dyn ResultConsumer>)>,
    reinit_count: u64,
}

impl PolyphaseChannelizer {
    /// Build a filter bank for `config` with `taps_per_bin` prototype taps
    /// per arm.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for an odd or too small bin count or an
    /// oversampling other than 2, [`Error::FilterDesign`] when the prototype
    /// cannot be designed.
    pub fn new(config: ChannelizerConfig, taps_per_bin: usize) -> Result<Self> {
        let mut engine = Self {
            config,
            taps_per_bin,
            coefficients: Vec::new(),
            samples: Vec::new(),
            index_map: Vec::new(),
            column: 0,
            row: 0,
            derotation: Vec::new(),
            derotation_index: 0,
            block_count: 0,
            fft: FftPlanner::new().plan_fft_inverse(1),
            fft_buffer: Vec::new(),
            fft_scratch: Vec::new(),
            consumers: Vec::new(),
            reinit_count: 0,
        };
        engine.init(config)?;
        Ok(engine)
    }

    fn init(&mut self, config: ChannelizerConfig) -> Result<()> {
        let bins = config.bin_count;
        if bins < 2 || bins % 2 != 0 {
            return Err(Error::configuration(format!(
                "filter bank needs an even number of bins, got {bins}"
            )));
        }
        if config.oversampling != 2.0 {
            return Err(Error::configuration(format!(
                "oversampling {} is not supported",
                config.oversampling
            )));
        }

        let prototype = PrototypeFilter::new(bins, self.taps_per_bin, DEFAULT_ATTENUATION_DB)?;
        let fir = prototype.coefficients();
        let tap_count = fir.len().div_ceil(bins);

        // arm p, tap t holds h[p + M·(K-1-t)]; taps past the end of the
        // prototype are zero
        self.coefficients = (0..bins)
            .map(|arm| {
                (0..tap_count)
                    .map(|tap| {
                        fir.get(arm + bins * (tap_count - 1 - tap))
                            .copied()
                            .unwrap_or(0.0)
                    })
                    .collect()
            })
            .collect();
        self.index_map = (0..tap_count)
            .map(|pointer| (0..tap_count).map(|tap| (pointer + tap) % tap_count).collect())
            .collect();
        self.samples = vec![vec![Complex::new(0.0, 0.0); bins]; tap_count];
        self.derotation = (0..2 * bins)
            .map(|n| Complex::from_polar(1.0, -PI * n as f32 / bins as f32))
            .collect();

        let fft = FftPlanner::new().plan_fft_inverse(bins);
        self.fft_scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        self.fft_buffer = vec![Complex::new(0.0, 0.0); bins];
        self.fft = fft;

        self.column = 0;
        self.row = 0;
        self.derotation_index = 0;
        self.block_count = 0;
        self.config = config;

        debug!(
            "Polyphase filter bank: {} bins of {} Hz, {} taps per arm",
            bins, config.bin_bandwidth, tap_count
        );
        Ok(())
    }

    /// Reallocate every buffer for a new configuration. Registered consumers
    /// are kept.
    pub fn reinitialize(&mut self, config: ChannelizerConfig) -> Result<()> {
        self.init(config)?;
        self.reinit_count += 1;
        Ok(())
    }

    pub fn config(&self) -> &ChannelizerConfig {
        &self.config
    }

    pub fn bin_count(&self) -> usize {
        self.config.bin_count
    }

    pub fn tap_count(&self) -> usize {
        self.samples.len()
    }

    pub fn reinit_count(&self) -> u64 {
        self.reinit_count
    }

    /// Index of the last block produced since the last reinitialization
    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    pub fn add_consumer(&mut self, id: ChannelId, consumer: Arc<dyn ResultConsumer>) {
        if !self.consumers.iter().any(|(existing, _)| *existing == id) {
            self.consumers.push((id, consumer));
        }
    }

    pub fn remove_consumer(&mut self, id: ChannelId) -> bool {
        let before = self.consumers.len();
        self.consumers.retain(|(existing, _)| *existing != id);
        self.consumers.len() != before
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Process interleaved I/Q floats; a trailing unpaired value is ignored.
    pub fn receive_interleaved(&mut self, samples: &[f32]) {
        let samples: Vec<Complex<f32>> = samples
            .chunks_exact(2)
            .map(|iq| Complex::new(iq[0], iq[1]))
            .collect();
        self.receive(&samples);
    }

    /// Filter `samples` and dispatch the resulting blocks to every consumer.
    pub fn receive(&mut self, samples: &[Complex<f32>]) {
        let blocks = self.filter(samples);
        if blocks.is_empty() || self.consumers.is_empty() {
            return;
        }
        let first_block = self.block_count + 1 - blocks.len() as u64;
        let batch = Arc::new(ResultBatch::new(first_block, blocks));
        for (_, consumer) in &self.consumers {
            consumer.receive_results(batch.clone());
        }
    }

    /// Filter `samples` and return the produced blocks.
    pub fn filter(&mut self, samples: &[Complex<f32>]) -> Vec<Vec<Complex<f32>>> {
        let bins = self.config.bin_count;
        let half = bins / 2;
        let mut blocks = Vec::with_capacity(samples.len() / half + 1);

        for &sample in samples {
            let derotated = sample * self.derotation[self.derotation_index];
            self.derotation_index = (self.derotation_index + 1) % self.derotation.len();

            self.samples[self.column][bins - 1 - self.row] = derotated;
            self.row += 1;

            if self.row == half {
                blocks.push(self.mid_point_cycle());
            } else if self.row == bins {
                blocks.push(self.top_of_block_cycle());
                self.column = (self.column + 1) % self.samples.len();
                self.row = 0;
            }
        }
        blocks
    }

    fn mid_point_cycle(&mut self) -> Vec<Complex<f32>> {
        let bins = self.config.bin_count;
        let half = bins / 2;
        let pointer = (self.column + 1) % self.samples.len();
        let previous = self.column;
        for slot in 0..bins {
            let (arm, columns) = if slot < half {
                (slot + half, previous)
            } else {
                ((slot + half) % bins, pointer)
            };
            self.fft_buffer[(slot + 1) % bins] = self.convolve(slot, arm, columns);
        }
        self.transform()
    }

    fn top_of_block_cycle(&mut self) -> Vec<Complex<f32>> {
        let bins = self.config.bin_count;
        let pointer = (self.column + 1) % self.samples.len();
        for slot in 0..bins {
            self.fft_buffer[(slot + 1) % bins] = self.convolve(slot, slot, pointer);
        }
        self.transform()
    }

    fn convolve(&self, slot: usize, arm: usize, pointer: usize) -> Complex<f32> {
        self.coefficients[arm]
            .iter()
            .zip(&self.index_map[pointer])
            .fold(Complex::new(0.0, 0.0), |acc, (&coefficient, &column)| {
                acc + self.samples[column][slot] * coefficient
            })
    }

    fn transform(&mut self) -> Vec<Complex<f32>> {
        self.fft
            .process_with_scratch(&mut self.fft_buffer, &mut self.fft_scratch);
        self.block_count += 1;
        let mut block = self.fft_buffer.clone();
        // fft bin k carries mapper bin k + M/2
        block.rotate_left(self.config.bin_count / 2);
        block
    }
}
