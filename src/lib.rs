#![doc = include_str!("../readme.md")]

use std::str::FromStr;

pub mod channelizer;
pub mod config;
pub mod dsp;
pub mod error;
pub mod event;
pub mod iqread;
pub mod mapper;
pub mod source;

pub use channelizer::channel::{ActiveChannel, ChannelRequest, ChannelState, RequestHandler};
pub use channelizer::engine::{PolyphaseChannelizer, ResultBatch, ResultConsumer};
pub use channelizer::manager::ChannelManager;
pub use channelizer::output::OutputProcessor;
pub use channelizer::scheduler::{ScheduledTask, Scheduler};
pub use config::{ChannelizerConfig, Settings, TunerChannel};
pub use error::{Error, Result};
pub use event::{Listener, SourceEvent};
pub use mapper::ChannelDescriptor;
pub use source::{FileSource, SampleSource};

/**
 * I/Q Data Format
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IqFormat {
    /// Complex unsigned 8-bit (Cu8)
    Cu8,
    /// Complex signed 8-bit (Cs8)
    Cs8,
    /// Complex signed 16-bit (Cs16)
    Cs16,
    /// Complex 32-bit float (Cf32)
    Cf32,
}

impl FromStr for IqFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cu8" => Ok(IqFormat::Cu8),
            "cs8" => Ok(IqFormat::Cs8),
            "cs16" => Ok(IqFormat::Cs16),
            "cf32" => Ok(IqFormat::Cf32),
            other => Err(Error::configuration(format!("unknown IQ format {other:?}"))),
        }
    }
}

impl std::fmt::Display for IqFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IqFormat::Cu8 => "cu8",
            IqFormat::Cs8 => "cs8",
            IqFormat::Cs16 => "cs16",
            IqFormat::Cf32 => "cf32",
        };
        f.write_str(name)
    }
}
