//! # Audio Module
//!
//! Per-channel playback queues and their voice connection lifecycle.
//!
//! ## Architecture
//!
//! ### [`engine`] - Queue Engine
//! - Maps each voice channel to its [`state::ChannelPlayback`]
//! - Enqueue, skip, loop, snapshot and teardown as per-channel atomic operations
//! - Advances the queue when the player reports a track went idle
//!
//! ### [`connection`] - Connection Manager
//! - Opens, reuses and destroys voice connections with a readiness timeout
//! - [`connection::VoiceTransport`] / [`connection::VoiceLink`] abstract the platform
//!
//! ### [`player`] - Player
//! - At most one active playback per channel
//! - Every playback ends with exactly one [`player::PlayerEvent`]
//!
//! ### [`songbird_link`] - Songbird adapter
//! - Production transport over songbird's `Call`
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use channel_jukebox::audio::{
//!     connection::VoiceChannel,
//!     engine::{EngineConfig, QueueEngine},
//!     track::Track,
//! };
//! # use std::sync::Arc;
//! # use channel_jukebox::audio::connection::VoiceTransport;
//! # use channel_jukebox::sources::MediaResolver;
//!
//! # async fn example(
//! #     transport: Arc<dyn VoiceTransport>,
//! #     resolver: Arc<dyn MediaResolver>,
//! # ) -> anyhow::Result<()> {
//! let engine = QueueEngine::new(transport, resolver, EngineConfig::default());
//! let channel = VoiceChannel::new(123456789u64, 987654321u64);
//!
//! let meta = engine.get_info("never gonna give you up").await?;
//! engine.add_to_queue(channel, vec![Track::from(meta)]).await?;
//! engine.toggle_loop(channel.channel_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod engine;
pub mod player;
pub mod songbird_link;
pub mod state;
pub mod track;

#[cfg(test)]
pub mod testing;
