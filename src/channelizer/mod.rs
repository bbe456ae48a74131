//! Polyphase channelizer
//!
//! - [`engine`]: the 2×-oversampled polyphase filter bank
//! - [`output`]: one-bin and two-bin channel synthesis
//! - [`channel`]: per-channel queueing, draining and hot-swap
//! - [`manager`]: channel lifecycle on top of one sample source
//! - [`scheduler`]: periodic drain tasks

pub mod channel;
pub mod engine;
pub mod manager;
pub mod output;
pub mod scheduler;

/// Identifier of a channel within its manager
pub type ChannelId = u64;
