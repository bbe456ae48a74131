//! Channel output adapter
//!
//! An [`ActiveChannel`] sits between the filter bank and one consumer. The
//! filter bank enqueues result batches from the producer thread without
//! blocking; a periodic drain task runs them through the channel's output
//! processor and delivers full buffers downstream. The output processor can be
//! replaced at any time without losing or duplicating samples.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crossbeam::channel::{Receiver, Sender, unbounded};
use num_complex::Complex;
use tracing::{debug, warn};

use crate::channelizer::ChannelId;
use crate::channelizer::engine::{ResultBatch, ResultConsumer};
use crate::channelizer::output::OutputProcessor;
use crate::channelizer::scheduler::{ScheduledTask, Scheduler};
use crate::config::{Settings, TunerChannel};
use crate::error::Result;
use crate::event::{Listener, SourceEvent, broadcast};
use crate::mapper::ChannelDescriptor;

/// Requests sent upstream by a channel to whoever feeds it.
#[derive(Clone)]
pub enum ChannelRequest {
    Start(Arc<ActiveChannel>),
    Stop(Arc<ActiveChannel>),
}

/// Upstream side of a channel. A start request may be refused, in which case
/// the channel stops instead of running.
pub type RequestHandler = Arc<dyn Fn(ChannelRequest) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Created,
    Running,
    Stopped,
}

struct RunState {
    state: ChannelState,
    task: Option<ScheduledTask>,
}

struct Output {
    processor: OutputProcessor,
    descriptor: ChannelDescriptor,
    correction: i64,
    /// Buffers left by replaced processors, delivered before anything newer
    carried: Vec<Vec<Complex<f32>>>,
}

impl Output {
    fn take_buffers(&mut self, flush: bool) -> Vec<Vec<Complex<f32>>> {
        let mut buffers = std::mem::take(&mut self.carried);
        buffers.extend(self.processor.take_ready());
        if flush && let Some(residual) = self.processor.flush() {
            buffers.push(residual);
        }
        buffers
    }

    fn retire(&mut self, previous: &mut OutputProcessor) {
        self.carried.extend(previous.take_ready());
        if let Some(residual) = previous.flush() {
            self.carried.push(residual);
        }
    }
}

pub struct ActiveChannel {
    id: ChannelId,
    tuner_channel: TunerChannel,
    settings: Settings,
    queue: Sender<Arc<ResultBatch>>,
    pending: Receiver<Arc<ResultBatch>>,
    output: Mutex<Output>,
    // held while buffers go downstream, keeps concurrent drains in order
    delivery: Mutex<()>,
    run: Mutex<RunState>,
    scheduler: Scheduler,
    request_handler: RequestHandler,
    sample_listeners: Mutex<Vec<Listener<Vec<Complex<f32>>>>>,
    event_listeners: Mutex<Vec<Listener<SourceEvent>>>,
    /// Events raised while upstream locks were held
    queued_events: Mutex<Vec<SourceEvent>>,
}

impl ActiveChannel {
    pub fn new(
        id: ChannelId,
        tuner_channel: TunerChannel,
        descriptor: ChannelDescriptor,
        settings: Settings,
        scheduler: Scheduler,
        request_handler: RequestHandler,
    ) -> Result<Self> {
        let processor = OutputProcessor::new(&descriptor, &tuner_channel, &settings)?;
        let (queue, pending) = unbounded();
        Ok(Self {
            id,
            tuner_channel,
            settings,
            queue,
            pending,
            output: Mutex::new(Output {
                processor,
                descriptor,
                correction: 0,
                carried: Vec::new(),
            }),
            delivery: Mutex::new(()),
            run: Mutex::new(RunState {
                state: ChannelState::Created,
                task: None,
            }),
            scheduler,
            request_handler,
            sample_listeners: Mutex::new(Vec::new()),
            event_listeners: Mutex::new(Vec::new()),
            queued_events: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn tuner_channel(&self) -> &TunerChannel {
        &self.tuner_channel
    }

    pub fn state(&self) -> ChannelState {
        lock(&self.run).state
    }

    pub fn descriptor(&self) -> ChannelDescriptor {
        lock(&self.output).descriptor.clone()
    }

    pub fn bins(&self) -> Vec<usize> {
        lock(&self.output).processor.bins()
    }

    pub fn frequency_correction(&self) -> i64 {
        lock(&self.output).correction
    }

    /// Output sample rate in Hz
    pub fn sample_rate(&self) -> f64 {
        lock(&self.output).descriptor.config().channel_sample_rate()
    }

    /// Result batches waiting for the next drain
    pub fn queued_batches(&self) -> usize {
        self.pending.len()
    }

    pub fn add_sample_listener(&self, listener: Listener<Vec<Complex<f32>>>) {
        lock(&self.sample_listeners).push(listener);
    }

    pub fn add_event_listener(&self, listener: Listener<SourceEvent>) {
        lock(&self.event_listeners).push(listener);
    }

    /// Ask upstream for samples and start draining. Starting a running
    /// channel does nothing. When upstream refuses, the channel is stopped
    /// and its event listeners get [`SourceEvent::SampleStreamStopped`].
    pub fn start(self: &Arc<Self>) {
        {
            let mut run = lock(&self.run);
            if run.state == ChannelState::Running {
                return;
            }
            debug!("Starting channel {} at {}", self.id, self.tuner_channel);
            match (self.request_handler)(ChannelRequest::Start(self.clone())) {
                Ok(()) => {
                    run.state = ChannelState::Running;
                    let channel: Weak<ActiveChannel> = Arc::downgrade(self);
                    run.task = Some(self.scheduler.schedule(move || {
                        if let Some(channel) = channel.upgrade() {
                            channel.process_results();
                        }
                    }));
                }
                Err(e) => {
                    warn!("Channel {} cannot start: {}", self.id, e);
                    run.state = ChannelState::Stopped;
                    self.discard();
                    self.queue_event(SourceEvent::SampleStreamStopped);
                }
            }
        }
        self.send_queued_events();
    }

    /// Release upstream samples, stop draining and drop everything not yet
    /// delivered. Stopping a stopped channel does nothing.
    pub fn stop(self: &Arc<Self>) {
        let mut run = lock(&self.run);
        if run.state == ChannelState::Stopped {
            return;
        }
        run.state = ChannelState::Stopped;
        debug!("Stopping channel {} at {}", self.id, self.tuner_channel);
        if let Some(task) = run.task.take() {
            task.cancel();
        }
        if let Err(e) = (self.request_handler)(ChannelRequest::Stop(self.clone())) {
            warn!("Channel {}: {}", self.id, e);
        }
        self.discard();
    }

    /// Drain queued batches through the output processor and deliver every
    /// full buffer downstream.
    pub fn process_results(&self) {
        self.drain(false);
    }

    /// Drain, then deliver the partial buffer as well.
    pub fn flush(&self) {
        self.drain(true);
    }

    // Listeners run without the output lock, so they may call back into
    // the channel, except to drain it.
    fn drain(&self, flush: bool) {
        let _delivery = lock(&self.delivery);
        let buffers = {
            let mut output = lock(&self.output);
            while let Ok(batch) = self.pending.try_recv() {
                if let Err(e) = output.processor.process(&batch) {
                    warn!("Channel {}: {}", self.id, e);
                }
            }
            output.take_buffers(flush)
        };
        let listeners = lock(&self.sample_listeners).clone();
        for buffer in buffers {
            broadcast(&listeners, buffer);
        }
    }

    /// Install `processor` and deliver whatever the outgoing one still
    /// holds, ahead of anything the new one produces. The current frequency
    /// correction carries over. Returns the outgoing processor.
    ///
    /// Must not be called from a sample listener of this channel.
    pub fn replace_processor(&self, mut processor: OutputProcessor) -> OutputProcessor {
        let previous = {
            let mut output = lock(&self.output);
            processor.set_frequency_correction(output.correction);
            let mut previous = std::mem::replace(&mut output.processor, processor);
            output.retire(&mut previous);
            previous
        };
        self.drain(false);
        previous
    }

    /// Retarget the channel after an upstream configuration change. Queued
    /// batches belong to the previous configuration and are dropped; the
    /// frequency correction is reset and listeners are told so.
    pub fn reconfigure(&self, descriptor: ChannelDescriptor) -> Result<()> {
        let outcome = self.retarget(descriptor);
        self.send_queued_events();
        outcome
    }

    /// [`Self::reconfigure`] for callers holding upstream locks: the
    /// correction reset is queued until [`Self::send_queued_events`].
    pub(crate) fn retarget(&self, descriptor: ChannelDescriptor) -> Result<()> {
        let mut output = lock(&self.output);
        self.clear_queue();

        if output.processor.bin_count() == descriptor.bins().len() {
            output
                .processor
                .set_bins(&descriptor, &self.tuner_channel)?;
        } else {
            let processor = OutputProcessor::new(&descriptor, &self.tuner_channel, &self.settings)?;
            let mut previous = std::mem::replace(&mut output.processor, processor);
            output.retire(&mut previous);
        }
        debug!(
            "Channel {} reconfigured to bins {:?}",
            self.id,
            descriptor.bins()
        );
        output.descriptor = descriptor;
        output.correction = 0;
        output.processor.set_frequency_correction(0);
        self.queue_event(SourceEvent::FrequencyCorrectionChange(0));
        Ok(())
    }

    /// Apply a correction requested downstream. Safe to call from a sample
    /// or event listener.
    pub fn set_frequency_correction(&self, correction: i64) {
        {
            let mut output = lock(&self.output);
            output.correction = correction;
            output.processor.set_frequency_correction(correction);
        }
        self.notify(SourceEvent::FrequencyCorrectionChange(correction));
    }

    /// Send `event` to the downstream event listeners
    pub fn notify(&self, event: SourceEvent) {
        let listeners = lock(&self.event_listeners).clone();
        broadcast(&listeners, event);
    }

    pub(crate) fn queue_event(&self, event: SourceEvent) {
        lock(&self.queued_events).push(event);
    }

    /// Send the events queued while locks were held, oldest first
    pub(crate) fn send_queued_events(&self) {
        let events = std::mem::take(&mut *lock(&self.queued_events));
        for event in events {
            self.notify(event);
        }
    }

    fn discard(&self) {
        let mut output = lock(&self.output);
        self.clear_queue();
        output.carried.clear();
        output.processor.discard();
    }

    fn clear_queue(&self) {
        while self.pending.try_recv().is_ok() {}
    }
}

impl ResultConsumer for ActiveChannel {
    fn receive_results(&self, batch: Arc<ResultBatch>) {
        // the receiving end lives as long as the sender
        let _ = self.queue.send(batch);
    }
}

impl std::fmt::Debug for ActiveChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveChannel")
            .field("id", &self.id)
            .field("tuner_channel", &self.tuner_channel)
            .field("state", &self.state())
            .finish()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
