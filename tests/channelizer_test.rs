//! End-to-end tests of the channel manager on synthetic signals

mod helpers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use channelizer::{
    ChannelManager, ChannelState, ChannelizerConfig, Settings, SourceEvent, TunerChannel, mapper,
};
use helpers::CountingSource;
use num_complex::Complex;

const CENTER: u64 = 100_062_500;
const RATE: u32 = 125_000;

fn manager(settings: Settings) -> (ChannelManager, Arc<CountingSource>) {
    let source = Arc::new(CountingSource::new(CENTER, RATE));
    let manager = ChannelManager::new(source.clone(), settings, tokio::runtime::Handle::current())
        .expect("valid configuration");
    (manager, source)
}

fn collect(channel: &channelizer::ActiveChannel) -> Arc<Mutex<Vec<Complex<f32>>>> {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = collected.clone();
    channel.add_sample_listener(Arc::new(move |buffer: Vec<Complex<f32>>| {
        sink.lock().unwrap().extend(buffer);
    }));
    collected
}

#[test]
fn test_golden_mapping() {
    let config = ChannelizerConfig::new(100_062_500, 10, 12_500, 2.0);
    assert_eq!(config.minimum_frequency(), 100_000_000);
    assert_eq!(config.maximum_frequency(), 100_125_000);
    let descriptor = mapper::map(&config, &TunerChannel::new(100_006_250, 12_500)).unwrap();
    assert_eq!(descriptor.bins(), &[0]);
}

#[test]
fn test_rejects_unusable_sources() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let odd = Arc::new(CountingSource::new(CENTER, 112_500));
    assert!(ChannelManager::new(odd, Settings::default(), runtime.handle().clone()).is_err());
    let fractional = Arc::new(CountingSource::new(CENTER, 120_000));
    assert!(
        ChannelManager::new(fractional, Settings::default(), runtime.handle().clone()).is_err()
    );
}

#[tokio::test]
async fn test_tone_delivered_at_dc() {
    let (manager, source) = manager(Settings {
        samples_per_buffer: 256,
        ..Settings::default()
    });
    let request = TunerChannel::new(100_056_250, 12_500);
    let channel = manager.get_channel(request).expect("channel in range");
    let collected = collect(&channel);
    channel.start();
    assert_eq!(source.starts(), 1);

    let config = manager.config();
    manager.receive(&helpers::config_tone(&config, 100_057_000.0, RATE as usize / 10));
    channel.flush();

    let samples = collected.lock().unwrap();
    assert_eq!(samples.len(), RATE as usize / 10 / 5);
    // 750 Hz above the requested frequency at 25 kHz: 0.03 cycles per sample
    let expected = 2.0 * std::f32::consts::PI * 750.0 / 25_000.0;
    for pair in samples[100..].windows(2) {
        assert!((pair[0].norm() - 1.0).abs() < 0.01);
        let step = (pair[1] * pair[0].conj()).arg();
        assert!((step - expected).abs() < 0.01, "phase step {step}");
    }
}

#[tokio::test]
async fn test_adjacent_channel_is_rejected() {
    let (manager, _) = manager(Settings {
        samples_per_buffer: 256,
        ..Settings::default()
    });
    let channel = manager
        .get_channel(TunerChannel::new(100_031_250, 12_500))
        .expect("channel in range");
    let collected = collect(&channel);
    channel.start();

    let config = manager.config();
    // tone two bins away
    manager.receive(&helpers::config_tone(&config, 100_056_250.0, RATE as usize / 10));
    channel.flush();

    let samples = collected.lock().unwrap();
    let power: f32 =
        samples[100..].iter().map(|s| s.norm_sqr()).sum::<f32>() / (samples.len() - 100) as f32;
    assert!(power < 1e-6, "leakage power {power}");
}

#[tokio::test]
async fn test_sample_rate_change_with_two_channels() {
    let (manager, source) = manager(Settings::default());
    let corrections = Arc::new(AtomicUsize::new(0));
    let mut channels = Vec::new();
    for frequency in [100_006_250, 100_050_000] {
        let channel = manager
            .get_channel(TunerChannel::new(frequency, 12_500))
            .expect("channel in range");
        let counter = corrections.clone();
        channel.add_event_listener(Arc::new(move |event: SourceEvent| {
            if event == SourceEvent::FrequencyCorrectionChange(0) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));
        channel.set_frequency_correction(0);
        channel.start();
        channels.push(channel);
    }
    corrections.store(0, Ordering::SeqCst);
    assert_eq!(source.starts(), 1);

    manager.receive(&helpers::tone(100_020_000.0, CENTER, RATE, 4_000));
    assert!(channels.iter().all(|c| c.queued_batches() > 0));

    manager
        .process_source_event(SourceEvent::SampleRateChange(250_000))
        .unwrap();

    assert_eq!(manager.reinit_count(), 1);
    assert_eq!(corrections.load(Ordering::SeqCst), 2);
    assert!(channels.iter().all(|c| c.queued_batches() == 0));
    assert!(channels.iter().all(|c| c.state() == ChannelState::Running));
    assert_eq!(manager.config().bin_count, 20);
    assert!(
        channels
            .iter()
            .all(|c| c.descriptor().is_valid_for(&manager.config()))
    );
    assert_eq!(source.stops(), 0);
}

#[tokio::test]
async fn test_start_stop_idempotent_through_manager() {
    let (manager, source) = manager(Settings::default());
    let channel = manager
        .get_channel(TunerChannel::new(100_106_250, 12_500))
        .expect("channel in range");

    channel.start();
    channel.start();
    assert_eq!(manager.channel_count(), 1);
    channel.stop();
    channel.stop();
    assert_eq!(manager.channel_count(), 0);
    assert_eq!((source.starts(), source.stops()), (1, 1));

    // a channel stopped before it ever started releases nothing
    let unused = manager
        .get_channel(TunerChannel::new(100_106_250, 12_500))
        .expect("channel in range");
    unused.stop();
    assert_eq!(unused.state(), ChannelState::Stopped);
    assert_eq!((source.starts(), source.stops()), (1, 1));
}

#[tokio::test]
async fn test_two_bin_channel_through_manager() {
    let (manager, _) = manager(Settings {
        samples_per_buffer: 128,
        ..Settings::default()
    });
    let edge = 100_050_000;
    let channel = manager
        .get_channel(TunerChannel::new(edge, 12_500))
        .expect("channel in range");
    assert_eq!(channel.bins(), vec![3, 4]);
    let collected = collect(&channel);
    channel.start();

    let config = manager.config();
    manager.receive(&helpers::config_tone(&config, edge as f64 + 3_125.0, RATE as usize / 10));
    channel.flush();

    let samples = collected.lock().unwrap();
    let expected = 2.0 * std::f32::consts::PI * 3_125.0 / 25_000.0;
    for pair in samples[100..].windows(2) {
        assert!((pair[0].norm() - 1.0).abs() < 0.05);
        let step = (pair[1] * pair[0].conj()).arg();
        assert!((step - expected).abs() < 0.02, "phase step {step}");
    }
}
