//! Split an IQ recording into narrowband channels
//!
//! Every requested channel is written to its own file as interleaved
//! little-endian `f32` I/Q (cf32) at twice the channel bandwidth.
//!
//! # Usage Examples
//!
//! ## Two channels from an RTL-SDR recording
//! ```bash
//! channelize --file capture.cu8 --format cu8 -c 100.0625M -s 125k \
//!     --channel 100.00625M --channel 100.05M -o out
//! ```
//!
//! ## Custom settings
//! ```bash
//! channelize --file capture.cf32 -c 162M -s 250k --settings settings.json --channel 162.025M -vv
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use clap::{ArgAction, Parser};
use futures::StreamExt;
use num_complex::Complex;
use tracing::{debug, info, warn};

use channelizer::{ChannelManager, Error, FileSource, IqFormat, SampleSource, Settings, TunerChannel};

#[derive(Debug, Clone, Copy)]
struct Frequency(u64);

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(stripped) = s.strip_suffix('M') {
            let val: f64 = stripped.trim().parse().map_err(|_| "Invalid MHz value")?;
            Ok(Frequency((val * 1_000_000.0).round() as u64))
        } else if let Some(stripped) = s.strip_suffix('k') {
            let val: f64 = stripped.trim().parse().map_err(|_| "Invalid kHz value")?;
            Ok(Frequency((val * 1_000.0).round() as u64))
        } else {
            let val: u64 = s.parse().map_err(|_| "Invalid Hz value")?;
            Ok(Frequency(val))
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Split an IQ recording into narrowband channels", long_about = None)]
struct Args {
    /// Input IQ file
    #[arg(short, long)]
    file: PathBuf,

    /// IQ format of the input file (cu8, cs8, cs16, cf32)
    #[arg(long, default_value = "cu8", value_parser = IqFormat::from_str)]
    format: IqFormat,

    /// Center frequency of the recording in Hz (accepts k/M suffix, e.g. 100.0625M)
    #[arg(short, long, value_parser = Frequency::from_str)]
    center_freq: Frequency,

    /// Sample rate of the recording in Hz (accepts k/M suffix)
    #[arg(short, long, value_parser = Frequency::from_str)]
    sample_rate: Frequency,

    /// Channel center frequency, repeat for several channels
    #[arg(long = "channel", value_parser = Frequency::from_str, required = true)]
    channels: Vec<Frequency>,

    /// Channel bandwidth in Hz (defaults to the bin bandwidth)
    #[arg(short, long)]
    bandwidth: Option<u32>,

    /// JSON settings file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Samples read per chunk
    #[arg(long, default_value_t = 16_384)]
    chunk_size: usize,

    /// Verbosity level (-v=info, -vv=debug, -vvv=trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

type Writer = Arc<Mutex<BufWriter<File>>>;

#[tokio::main]
async fn main() -> channelizer::Result<()> {
    let args = Args::parse();

    // 0 = WARN (quiet), 1 = INFO, 2 = DEBUG, 3+ = TRACE
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let _ = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .try_init();

    let settings = match &args.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let bandwidth = args.bandwidth.unwrap_or(settings.channel_bandwidth);
    let sample_rate = u32::try_from(args.sample_rate.0)
        .map_err(|_| Error::configuration("sample rate does not fit in 32 bits"))?;

    let source = Arc::new(FileSource::new(
        &args.file,
        args.center_freq.0,
        sample_rate,
        args.format,
    ));
    let manager = ChannelManager::new(source.clone(), settings, tokio::runtime::Handle::current())?;
    std::fs::create_dir_all(&args.output)?;

    let mut outputs = Vec::new();
    for frequency in &args.channels {
        let request = TunerChannel::new(frequency.0, bandwidth);
        let Some(channel) = manager.get_channel(request) else {
            warn!("Skipping channel {}", request);
            continue;
        };
        let path = args.output.join(format!("channel_{}.cf32", frequency.0));
        let writer: Writer = Arc::new(Mutex::new(BufWriter::new(File::create(&path)?)));
        let sink = writer.clone();
        channel.add_sample_listener(Arc::new(move |buffer: Vec<Complex<f32>>| {
            let mut sink = sink.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = sink.write_all(&to_cf32_bytes(&buffer)) {
                warn!("Cannot write channel output: {}", e);
            }
        }));
        info!(
            "Channel {} -> {} at {} Hz",
            request,
            path.display(),
            channel.sample_rate()
        );
        channel.start();
        outputs.push((channel, writer));
    }
    if outputs.is_empty() {
        return Err(Error::configuration("none of the requested channels can be provided"));
    }
    debug!("{}", manager.state_description());

    let mut stream = source.open_async(args.chunk_size).await?;
    let mut total = 0usize;
    while let Some(chunk) = stream.next().await {
        if !source.is_streaming() {
            break;
        }
        let chunk = chunk?;
        total += chunk.len();
        manager.receive(&chunk);
        tokio::task::yield_now().await;
    }
    info!(
        "Read {} samples ({:.1} s)",
        total,
        total as f64 / source.sample_rate() as f64
    );

    for (channel, writer) in outputs {
        channel.flush();
        channel.stop();
        writer.lock().unwrap_or_else(|e| e.into_inner()).flush()?;
    }
    Ok(())
}

fn to_cf32_bytes(samples: &[Complex<f32>]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 8);
    for sample in samples {
        bytes.extend_from_slice(&sample.re.to_le_bytes());
        bytes.extend_from_slice(&sample.im.to_le_bytes());
    }
    bytes
}
