//! Wideband sample sources
//!
//! The channel manager only needs to know where a source is tuned, how fast
//! it samples, and how to switch its sample stream on and off. Samples
//! themselves are pushed into the manager by whoever owns the source.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::IqFormat;
use crate::error::Result;
use crate::iqread::{IqAsyncRead, IqRead, expanduser};

/// A tuner, SDR or recording delivering complex baseband samples.
pub trait SampleSource: Send + Sync {
    /// Tuned center frequency in Hz
    fn center_frequency(&self) -> u64;

    /// Sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Called when the first channel starts
    fn start_sample_stream(&self) -> Result<()>;

    /// Called when the last channel stops
    fn stop_sample_stream(&self) -> Result<()>;
}

/**
 * IQ recording used as a sample source
 */
pub struct FileSource {
    path: PathBuf,
    iq_format: IqFormat,
    center_frequency: u64,
    sample_rate: u32,
    streaming: AtomicBool,
}

impl FileSource {
    pub fn new<P: AsRef<Path>>(
        path: P,
        center_frequency: u64,
        sample_rate: u32,
        iq_format: IqFormat,
    ) -> Self {
        Self {
            path: expanduser(path.as_ref().to_path_buf()),
            iq_format,
            center_frequency,
            sample_rate,
            streaming: AtomicBool::new(false),
        }
    }

    /// True between the first channel start and the last channel stop
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Open the recording for synchronous reading
    pub fn open(&self, chunk_size: usize) -> Result<IqRead<std::io::BufReader<std::fs::File>>> {
        Ok(IqRead::from_file(&self.path, chunk_size, self.iq_format)?)
    }

    /// Open the recording as an asynchronous stream
    pub async fn open_async(
        &self,
        chunk_size: usize,
    ) -> Result<IqAsyncRead<tokio::io::BufReader<tokio::fs::File>>> {
        Ok(IqAsyncRead::from_file(&self.path, chunk_size, self.iq_format).await?)
    }
}

impl SampleSource for FileSource {
    fn center_frequency(&self) -> u64 {
        self.center_frequency
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start_sample_stream(&self) -> Result<()> {
        info!("Starting sample stream from {}", self.path.display());
        self.streaming.store(true, Ordering::Release);
        Ok(())
    }

    fn stop_sample_stream(&self) -> Result<()> {
        info!("Stopping sample stream from {}", self.path.display());
        self.streaming.store(false, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_source_streaming_flag() {
        let source = FileSource::new("/tmp/none.cf32", 100_000_000, 250_000, IqFormat::Cf32);
        assert_eq!(source.center_frequency(), 100_000_000);
        assert_eq!(source.sample_rate(), 250_000);
        assert!(!source.is_streaming());
        source.start_sample_stream().unwrap();
        assert!(source.is_streaming());
        source.stop_sample_stream().unwrap();
        assert!(!source.is_streaming());
    }

    #[test]
    fn test_file_source_missing_file() {
        let source = FileSource::new("/tmp/does_not_exist.cf32", 0, 1, IqFormat::Cf32);
        assert!(matches!(source.open(16), Err(crate::Error::Io(_))));
    }
}
