//! Digital Signal Processing (DSP) module.
//!
//! Building blocks shared by the filter bank and the channel output
//! processors.
//!
//! # Modules
//! - `filters`: Prototype filter design for the polyphase filter bank.
//! - `rotate`: Frequency translation of complex samples.
//!
//! # Traits
//! - [`DspBlock`]: A trait representing a generic DSP processing block that
//!   operates on slices of complex samples.
use num_complex::Complex;

pub mod filters;
pub mod rotate;

pub use rotate::Rotate;

pub trait DspBlock {
    fn process(&mut self, data: &[Complex<f32>]) -> Vec<Complex<f32>>;
}
