//! I/Q Data Reading Module
//!
//! Reads complex samples from IQ recordings or standard input, in any of the
//! supported [`IqFormat`]s, either as a blocking iterator or as an
//! asynchronous stream. Both yield chunks of `chunk_size` samples.
use std::io::Read;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use num_complex::Complex;
use tokio::io::AsyncBufRead;

use crate::IqFormat;

/**
 * I/Q Reader Configuration
 */
pub struct IqConfig {
    pub iq_format: IqFormat,
    pub chunk_size: usize,
}

impl IqConfig {
    pub fn new(chunk_size: usize, iq_format: IqFormat) -> Self {
        Self {
            iq_format,
            chunk_size,
        }
    }
}

/**
 * Synchronous I/Q Reader
 */
pub struct IqRead<R: Read> {
    config: IqConfig,
    reader: R,
}

impl IqRead<std::io::BufReader<std::fs::File>> {
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        chunk_size: usize,
        iq_format: IqFormat,
    ) -> Result<Self, std::io::Error> {
        let path = expanduser(path.as_ref().to_path_buf());
        let file = std::fs::File::open(path)?;
        Ok(Self::new(std::io::BufReader::new(file), chunk_size, iq_format))
    }
}

impl<R: Read> IqRead<R> {
    pub fn new(reader: R, chunk_size: usize, iq_format: IqFormat) -> Self {
        let config = IqConfig::new(chunk_size, iq_format);
        Self { config, reader }
    }

    fn read_samples(&mut self) -> Result<Vec<Complex<f32>>, std::io::Error> {
        let bytes_per_sample = self.config.iq_format.bytes_per_sample();
        let mut buffer = vec![0u8; self.config.chunk_size * bytes_per_sample];
        self.reader.read_exact(&mut buffer)?;
        Ok(convert_bytes_to_complex(self.config.iq_format, &buffer))
    }
}

impl<R: Read> Iterator for IqRead<R> {
    type Item = Result<Vec<Complex<f32>>, std::io::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_samples() {
            Ok(samples) => Some(Ok(samples)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/**
 * Asynchronous I/Q Reader
 */
pub struct IqAsyncRead<R: tokio::io::AsyncBufRead + Unpin> {
    config: IqConfig,
    reader: R,
    // bytes of the current chunk kept across `Poll::Pending`
    buffer: Vec<u8>,
    filled: usize,
}

impl<R: AsyncBufRead + Unpin> IqAsyncRead<R> {
    pub fn new(reader: R, chunk_size: usize, iq_format: IqFormat) -> Self {
        let config = IqConfig::new(chunk_size, iq_format);
        let buffer = vec![0u8; chunk_size * iq_format.bytes_per_sample()];
        Self {
            config,
            reader,
            buffer,
            filled: 0,
        }
    }
}

impl IqAsyncRead<tokio::io::BufReader<tokio::fs::File>> {
    pub async fn from_file<P: AsRef<Path>>(
        path: P,
        chunk_size: usize,
        iq_format: IqFormat,
    ) -> Result<Self, std::io::Error> {
        let path = expanduser(path.as_ref().to_path_buf());
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(tokio::io::BufReader::new(file), chunk_size, iq_format))
    }
}

impl IqAsyncRead<tokio::io::BufReader<tokio::io::Stdin>> {
    pub fn from_stdin(chunk_size: usize, iq_format: IqFormat) -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()), chunk_size, iq_format)
    }
}

impl<R: AsyncBufRead + Unpin + Send + 'static> Stream for IqAsyncRead<R> {
    type Item = Result<Vec<Complex<f32>>, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let bytes_per_sample = this.config.iq_format.bytes_per_sample();

        while this.filled < this.buffer.len() {
            let mut read_buf = tokio::io::ReadBuf::new(&mut this.buffer[this.filled..]);
            match Pin::new(&mut this.reader).poll_read(cx, &mut read_buf) {
                Poll::Ready(Ok(())) => {
                    let filled = read_buf.filled().len();
                    if filled == 0 {
                        break;
                    }
                    this.filled += filled;
                }
                Poll::Ready(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e))),
                Poll::Pending => return Poll::Pending,
            }
        }

        // drop a trailing partial sample
        let total_read = this.filled - this.filled % bytes_per_sample;
        this.filled = 0;
        if total_read == 0 {
            Poll::Ready(None)
        } else {
            let samples =
                convert_bytes_to_complex(this.config.iq_format, &this.buffer[..total_read]);
            Poll::Ready(Some(Ok(samples)))
        }
    }
}

impl IqFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            IqFormat::Cu8 | IqFormat::Cs8 => 2,
            IqFormat::Cs16 => 4,
            IqFormat::Cf32 => 8,
        }
    }
}

pub fn convert_bytes_to_complex(format: IqFormat, buffer: &[u8]) -> Vec<Complex<f32>> {
    match format {
        IqFormat::Cu8 => buffer
            .chunks_exact(2)
            .map(|c| Complex::new((c[0] as f32 - 127.5) / 128.0, (c[1] as f32 - 127.5) / 128.0))
            .collect(),
        IqFormat::Cs8 => buffer
            .chunks_exact(2)
            .map(|c| Complex::new((c[0] as i8) as f32 / 128.0, (c[1] as i8) as f32 / 128.0))
            .collect(),
        IqFormat::Cs16 => buffer
            .chunks_exact(4)
            .map(|c| {
                Complex::new(
                    i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0,
                    i16::from_le_bytes([c[2], c[3]]) as f32 / 32768.0,
                )
            })
            .collect(),
        IqFormat::Cf32 => buffer
            .chunks_exact(8)
            .map(|c| {
                Complex::new(
                    f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                    f32::from_le_bytes([c[4], c[5], c[6], c[7]]),
                )
            })
            .collect(),
    }
}

pub(crate) fn expanduser(path: PathBuf) -> PathBuf {
    if let Some(stripped) = path.to_str().and_then(|p| p.strip_prefix("~"))
        && let Some(home_dir) = dirs::home_dir()
    {
        return home_dir.join(stripped.trim_start_matches('/'));
    }
    path
}
