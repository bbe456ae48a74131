//! Channel lifecycle management
//!
//! A [`ChannelManager`] owns the filter bank of one sample source. It resolves
//! channel requests into [`ActiveChannel`]s, registers running channels with
//! the filter bank, switches the source's sample stream on with the first
//! running channel and off with the last, and keeps every channel consistent
//! when the source is retuned or changes sample rate.
//!
//! Locks are always taken in the same order: channel run state, channel list,
//! filter bank, channel output. Channel listeners are never called with any
//! of these held.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use num_complex::Complex;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::channelizer::channel::{ActiveChannel, ChannelRequest, RequestHandler, lock};
use crate::channelizer::engine::PolyphaseChannelizer;
use crate::channelizer::scheduler::Scheduler;
use crate::config::{ChannelizerConfig, Settings, TunerChannel};
use crate::error::Result;
use crate::event::{Listener, SourceEvent, broadcast};
use crate::mapper;
use crate::source::SampleSource;

#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    source: Arc<dyn SampleSource>,
    settings: Settings,
    scheduler: Scheduler,
    channels: Mutex<Vec<Arc<ActiveChannel>>>,
    engine: Mutex<PolyphaseChannelizer>,
    next_id: AtomicU64,
    listeners: Mutex<Vec<Listener<SourceEvent>>>,
}

impl ChannelManager {
    /// Attach a manager to `source`. Drain tasks run on `runtime`.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Configuration`] when the source sample rate is not an
    /// even multiple of the channel bandwidth or the oversampling is not 2.
    pub fn new(source: Arc<dyn SampleSource>, settings: Settings, runtime: Handle) -> Result<Self> {
        let config = ChannelizerConfig::from_source(
            source.center_frequency(),
            source.sample_rate(),
            &settings,
        )?;
        let engine = PolyphaseChannelizer::new(config, settings.taps_per_bin)?;
        info!(
            "Channel manager: {} bins of {} Hz around {} Hz",
            config.bin_count, config.bin_bandwidth, config.center_frequency
        );
        Ok(Self {
            inner: Arc::new(ManagerInner {
                source,
                scheduler: Scheduler::new(runtime, settings.drain_interval()),
                settings,
                channels: Mutex::new(Vec::new()),
                engine: Mutex::new(engine),
                next_id: AtomicU64::new(1),
                listeners: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Build a channel for `tuner_channel`, or `None` when the source cannot
    /// provide it. The channel does nothing until started.
    pub fn get_channel(&self, tuner_channel: TunerChannel) -> Option<Arc<ActiveChannel>> {
        let config = *lock(&self.inner.engine).config();
        let descriptor = match mapper::map(&config, &tuner_channel) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                info!("Cannot provide channel {}: {}", tuner_channel, e);
                return None;
            }
        };

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let manager: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        let requests: RequestHandler = Arc::new(move |request: ChannelRequest| {
            match manager.upgrade() {
                Some(manager) => manager.handle_request(request),
                None => Ok(()),
            }
        });

        match ActiveChannel::new(
            id,
            tuner_channel,
            descriptor,
            self.inner.settings.clone(),
            self.inner.scheduler.clone(),
            requests,
        ) {
            Ok(channel) => {
                debug!("Channel {} created for {}", id, tuner_channel);
                Some(Arc::new(channel))
            }
            Err(e) => {
                info!("Cannot provide channel {}: {}", tuner_channel, e);
                None
            }
        }
    }

    /// Push wideband samples through the filter bank.
    pub fn receive(&self, samples: &[Complex<f32>]) {
        lock(&self.inner.engine).receive(samples);
    }

    /// Push interleaved I/Q floats through the filter bank.
    pub fn receive_interleaved(&self, samples: &[f32]) {
        lock(&self.inner.engine).receive_interleaved(samples);
    }

    /// React to a change of the source's tuning or sample rate.
    ///
    /// The filter bank is reinitialized once and every running channel is
    /// retargeted. Channels the new configuration cannot provide are sent
    /// [`SourceEvent::SampleStreamStopped`] and stopped. A sample rate the
    /// filter bank cannot work with stops every channel and is reported as an
    /// error.
    pub fn process_source_event(&self, event: SourceEvent) -> Result<()> {
        let current = *lock(&self.inner.engine).config();
        let config = match event {
            SourceEvent::FrequencyChange(frequency) => {
                if frequency == current.center_frequency {
                    return Ok(());
                }
                ChannelizerConfig {
                    center_frequency: frequency,
                    ..current
                }
            }
            SourceEvent::SampleRateChange(rate) => {
                if rate == current.sample_rate() {
                    return Ok(());
                }
                match ChannelizerConfig::from_source(
                    current.center_frequency,
                    rate,
                    &self.inner.settings,
                ) {
                    Ok(config) => config,
                    Err(e) => {
                        error!("Sample rate change to {} Hz: {}", rate, e);
                        self.inner.stop_channels(self.inner.snapshot());
                        return Err(e);
                    }
                }
            }
            other => {
                debug!("Ignoring source event {:?}", other);
                return Ok(());
            }
        };
        self.inner.apply(config)
    }

    /// Stop every running channel
    pub fn stop_all_channels(&self) {
        let channels = self.inner.snapshot();
        for channel in channels {
            channel.stop();
        }
    }

    /// Receive [`SourceEvent::ChannelCountChange`] notifications
    pub fn add_event_listener(&self, listener: Listener<SourceEvent>) {
        lock(&self.inner.listeners).push(listener);
    }

    pub fn channel_count(&self) -> usize {
        lock(&self.inner.channels).len()
    }

    /// Requests of the running channels, sorted by frequency
    pub fn tuner_channels(&self) -> Vec<TunerChannel> {
        let mut tuner_channels: Vec<TunerChannel> = lock(&self.inner.channels)
            .iter()
            .map(|channel| *channel.tuner_channel())
            .collect();
        tuner_channels.sort();
        tuner_channels
    }

    pub fn config(&self) -> ChannelizerConfig {
        *lock(&self.inner.engine).config()
    }

    pub fn reinit_count(&self) -> u64 {
        lock(&self.inner.engine).reinit_count()
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Human readable summary of the filter bank and its channels
    pub fn state_description(&self) -> String {
        let channels = self.inner.snapshot();
        let config = self.config();
        let mut description = String::new();
        let _ = writeln!(
            description,
            "Polyphase channelizer: center {} Hz, {} bins of {} Hz, range [{}, {}] Hz",
            config.center_frequency,
            config.bin_count,
            config.bin_bandwidth,
            config.minimum_frequency(),
            config.maximum_frequency()
        );
        let _ = writeln!(description, "Running channels: {}", channels.len());
        for channel in channels {
            let _ = writeln!(
                description,
                "  #{} {} bins {:?} correction {} Hz",
                channel.id(),
                channel.tuner_channel(),
                channel.bins(),
                channel.frequency_correction()
            );
        }
        description
    }
}

impl ManagerInner {
    fn snapshot(&self) -> Vec<Arc<ActiveChannel>> {
        lock(&self.channels).clone()
    }

    fn handle_request(&self, request: ChannelRequest) -> Result<()> {
        match request {
            ChannelRequest::Start(channel) => self.register(channel),
            ChannelRequest::Stop(channel) => {
                self.unregister(&channel);
                Ok(())
            }
        }
    }

    /// Fails when the channel was created before a retune and the current
    /// geometry can no longer provide it; nothing is registered then.
    fn register(&self, channel: Arc<ActiveChannel>) -> Result<()> {
        let count = {
            let mut channels = lock(&self.channels);
            if channels.iter().any(|c| c.id() == channel.id()) {
                return Ok(());
            }
            let mut engine = lock(&self.engine);
            if !channel.descriptor().is_valid_for(engine.config()) {
                // created before the last retune
                let descriptor = mapper::map(engine.config(), channel.tuner_channel())?;
                channel.retarget(descriptor)?;
            }
            engine.add_consumer(channel.id(), channel.clone());
            channels.push(channel.clone());
            channels.len()
        };
        info!("Channel {} started at {}", channel.id(), channel.tuner_channel());

        if count == 1
            && let Err(e) = self.source.start_sample_stream()
        {
            error!("Cannot start sample stream: {}", e);
        }
        self.broadcast(SourceEvent::ChannelCountChange(count));
        Ok(())
    }

    fn unregister(&self, channel: &Arc<ActiveChannel>) {
        let count = {
            let mut channels = lock(&self.channels);
            let Some(position) = channels.iter().position(|c| c.id() == channel.id()) else {
                return;
            };
            channels.remove(position);
            lock(&self.engine).remove_consumer(channel.id());
            channels.len()
        };
        info!("Channel {} stopped", channel.id());

        if count == 0
            && let Err(e) = self.source.stop_sample_stream()
        {
            error!("Cannot stop sample stream: {}", e);
        }
        self.broadcast(SourceEvent::ChannelCountChange(count));
    }

    fn apply(&self, config: ChannelizerConfig) -> Result<()> {
        let (retargeted, unavailable) = {
            let channels = lock(&self.channels);
            let mut engine = lock(&self.engine);
            engine.reinitialize(config)?;
            info!(
                "Filter bank reinitialized: {} bins around {} Hz",
                config.bin_count, config.center_frequency
            );

            let mut retargeted = Vec::new();
            let mut unavailable = Vec::new();
            for channel in channels.iter() {
                let outcome = mapper::map(&config, channel.tuner_channel())
                    .and_then(|descriptor| channel.retarget(descriptor));
                match outcome {
                    Ok(()) => retargeted.push(channel.clone()),
                    Err(e) => {
                        info!("Channel {} can no longer be provided: {}", channel.id(), e);
                        engine.remove_consumer(channel.id());
                        unavailable.push(channel.clone());
                    }
                }
            }
            (retargeted, unavailable)
        };
        for channel in retargeted {
            channel.send_queued_events();
        }
        self.stop_channels(unavailable);
        Ok(())
    }

    fn stop_channels(&self, channels: Vec<Arc<ActiveChannel>>) {
        for channel in channels {
            channel.notify(SourceEvent::SampleStreamStopped);
            channel.stop();
        }
    }

    fn broadcast(&self, event: SourceEvent) {
        let listeners = lock(&self.listeners).clone();
        broadcast(&listeners, event);
    }
}
