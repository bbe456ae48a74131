//! Error handling for the channelizer library
//!
//! A single error type covers configuration problems detected when a manager
//! is attached to a source, channel requests that cannot be served, prototype
//! filter design failures, faults while processing result blocks, and I/O.

use std::io;

use thiserror::Error;

/// A specialized Result type for channelizer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for channelizer operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations, network, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Source sample rate, bin count or oversampling cannot drive a filter bank
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Requested channel is not fully contained in the source bandwidth
    #[error(
        "Requested channel [{requested_min}, {requested_max}] Hz is outside of the available range [{available_min}, {available_max}] Hz"
    )]
    OutOfRange {
        requested_min: i64,
        requested_max: i64,
        available_min: i64,
        available_max: i64,
    },

    /// Requested channel maps to a number of bins that cannot be synthesized
    #[error("Unsupported channel request: maps to bins {bins:?}, only 1 or 2 bins are supported")]
    UnsupportedChannel { bins: Vec<usize> },

    /// Prototype filter could not be designed
    #[error("Filter design error: {0}")]
    FilterDesign(String),

    /// Result block could not be processed by an output processor
    #[error("Processing error: {0}")]
    Processing(String),
}

impl Error {
    /// Create a configuration error with a custom message
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a filter design error with a custom message
    pub fn filter_design<S: Into<String>>(msg: S) -> Self {
        Error::FilterDesign(msg.into())
    }

    /// Create a processing error with a custom message
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Error::Processing(msg.into())
    }

    /// True for errors caused by the channel request itself, as opposed to
    /// the state of the source or the filter bank.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Error::OutOfRange { .. } | Error::UnsupportedChannel { .. }
        )
    }
}
