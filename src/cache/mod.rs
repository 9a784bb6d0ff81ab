//! # Cache Module
//!
//! Bounded, TTL-aware LRU cache used to memoise media lookups.
//!
//! Resolving a query through `yt-dlp` takes seconds; the same query is
//! usually requested again while a queue is being built. The cache keeps
//! the resolved [`TrackMetadata`] keyed by the normalised query.
//!
//! ## Configuration
//!
//! ```env
//! RESOLVER_CACHE_SIZE=256         # Maximum number of entries
//! RESOLVER_CACHE_TTL_SECS=3600    # Time-to-live in seconds
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use channel_jukebox::cache::MetadataCache;
//! use channel_jukebox::sources::TrackMetadata;
//! use std::time::Duration;
//!
//! # fn example() {
//! let cache = MetadataCache::new(100).with_ttl(Duration::from_secs(3600));
//!
//! cache.insert(
//!     "never gonna give you up".to_string(),
//!     TrackMetadata {
//!         title: "Never Gonna Give You Up".to_string(),
//!         playable_url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
//!         duration: Some(Duration::from_secs(213)),
//!         display_url: None,
//!         playlist_url: None,
//!     },
//! );
//!
//! if let Some(cached) = cache.get(&"never gonna give you up".to_string()) {
//!     println!("Found cached track: {}", cached.title);
//! }
//! # }
//! ```

pub mod lru_cache;

pub use lru_cache::{CacheMetrics, LRUCache};

use tracing::info;

use crate::sources::TrackMetadata;

/// Cache de metadata resuelta, indexada por consulta normalizada.
pub type MetadataCache = LRUCache<String, TrackMetadata>;

impl MetadataCache {
    /// Quita las entradas vencidas. Pensado para una tarea periódica.
    pub fn cleanup_old_entries(&self) {
        let removed = self.cleanup_expired();
        if removed > 0 {
            info!("🧹 Cache cleanup: removed {} expired entries", removed);
        }
    }
}
