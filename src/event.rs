//! Notifications exchanged between a sample source, the channel manager and
//! channel consumers.

use std::sync::Arc;

/// Callback registered by a consumer of notifications or sample buffers
pub type Listener<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Source state changes, forwarded downstream to channel consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEvent {
    /// Tuner center frequency changed (Hz)
    FrequencyChange(u64),
    /// Source sample rate changed (Hz)
    SampleRateChange(u32),
    /// Frequency correction applied to a channel changed (Hz)
    FrequencyCorrectionChange(i64),
    /// Number of running channels changed
    ChannelCountChange(usize),
    /// The channel was stopped because the source can no longer provide it
    SampleStreamStopped,
}

pub(crate) fn broadcast<T: Clone>(listeners: &[Listener<T>], value: T) {
    for listener in listeners {
        listener(value.clone());
    }
}
