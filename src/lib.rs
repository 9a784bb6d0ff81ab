//! # Channel Jukebox
//!
//! Per-voice-channel playback queues for a Discord audio bot.
//!
//! The [`audio::engine::QueueEngine`] owns one playback state per voice
//! channel: a FIFO queue, the current track, a loop flag and the voice
//! connection. Channels run concurrently and independently; when playback
//! ends or is interrupted the channel's resources are torn down.
//!
//! - [`audio`] - queue engine, connection manager, player and songbird adapter
//! - [`sources`] - media resolution through `yt-dlp`, with caching
//! - [`bot`] - slash commands that drive the engine

pub mod audio;
pub mod bot;
pub mod cache;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
