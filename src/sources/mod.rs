//! Media resolution: turns a search term or URL into playable metadata.
//!
//! The engine only sees the [`MediaResolver`] contract. The production
//! resolver shells out to `yt-dlp` ([`YtDlpResolver`]) and is wrapped in a
//! [`CachedResolver`] so repeated lookups are served from memory.

pub mod ytdlp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::{cache::MetadataCache, error::EngineResult};

pub use ytdlp::YtDlpResolver;

/// Resultado de resolver una consulta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    /// URL que el transporte sabe reproducir
    pub playable_url: String,
    pub duration: Option<Duration>,
    /// Enlace para mostrar al usuario
    pub display_url: Option<String>,
    /// Playlist de la que vino el enlace, si traía una
    #[serde(default)]
    pub playlist_url: Option<String>,
}

/// Contrato del resolvedor de medios
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Falla con `EngineError::Resolution` si no hay coincidencias o el
    /// servicio de origen falla.
    async fn resolve(&self, query: &str) -> EngineResult<TrackMetadata>;
}

/// Memoriza las resoluciones exitosas de otro resolvedor
pub struct CachedResolver<R> {
    inner: R,
    cache: MetadataCache,
}

impl<R: MediaResolver> CachedResolver<R> {
    pub fn new(inner: R, cache: MetadataCache) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    fn cache_key(query: &str) -> String {
        query.trim().to_lowercase()
    }
}

#[async_trait]
impl<R: MediaResolver> MediaResolver for CachedResolver<R> {
    async fn resolve(&self, query: &str) -> EngineResult<TrackMetadata> {
        let key = Self::cache_key(query);

        if let Some(hit) = self.cache.get(&key) {
            debug!("💾 Cache hit: {}", key);
            return Ok(hit);
        }

        let metadata = self.inner.resolve(query).await?;
        self.cache.insert(key, metadata.clone());
        Ok(metadata)
    }
}
