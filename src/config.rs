use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serenity::model::id::GuildId;
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::{audio::engine::EngineConfig, cache::MetadataCache};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub output_volume: f32,
    pub connection_timeout_secs: u64,
    pub max_queue_size: usize,

    // Resolución de medios
    pub resolver_cache_size: usize,
    pub resolver_cache_ttl_secs: u64,
    pub resolve_timeout_secs: u64,

    // Despedida
    pub farewell_guild_id: Option<u64>,
    pub farewell_chime_path: Option<PathBuf>,
}

/// Lee `key` del entorno o usa `default`
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val
            .trim()
            .parse()
            .with_context(|| format!("{key} inválido: {val}")),
        _ => Ok(default),
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID no definido")?
                .parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            output_volume: env_or("OUTPUT_VOLUME", defaults.output_volume)?,
            connection_timeout_secs: env_or(
                "CONNECTION_TIMEOUT_SECS",
                defaults.connection_timeout_secs,
            )?,
            max_queue_size: env_or("MAX_QUEUE_SIZE", defaults.max_queue_size)?,

            // Resolución
            resolver_cache_size: env_or("RESOLVER_CACHE_SIZE", defaults.resolver_cache_size)?,
            resolver_cache_ttl_secs: env_or(
                "RESOLVER_CACHE_TTL_SECS",
                defaults.resolver_cache_ttl_secs,
            )?,
            resolve_timeout_secs: env_or("RESOLVE_TIMEOUT_SECS", defaults.resolve_timeout_secs)?,

            // Despedida
            farewell_guild_id: std::env::var("FAREWELL_GUILD_ID")
                .ok()
                .and_then(|s| s.parse().ok()),
            farewell_chime_path: std::env::var("FAREWELL_CHIME_PATH").ok().map(PathBuf::from),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Timeouts, queue and cache sizes must be greater than 0
    /// - Farewell guild and chime path go together
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.output_volume) {
            anyhow::bail!(
                "Output volume must be between 0.0 and 2.0, got: {}",
                self.output_volume
            );
        }

        if self.connection_timeout_secs == 0 {
            anyhow::bail!("Connection timeout must be greater than 0");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.resolver_cache_size == 0 {
            anyhow::bail!("Resolver cache size must be greater than 0");
        }

        if self.resolve_timeout_secs == 0 {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.farewell_guild_id.is_some() != self.farewell_chime_path.is_some() {
            anyhow::bail!("FAREWELL_GUILD_ID and FAREWELL_CHIME_PATH must be set together");
        }

        Ok(())
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            output_volume: self.output_volume,
            connection_timeout: Duration::from_secs(self.connection_timeout_secs),
            max_queue_size: self.max_queue_size,
        }
    }

    pub fn resolver_cache(&self) -> MetadataCache {
        MetadataCache::new(self.resolver_cache_size)
            .with_ttl(Duration::from_secs(self.resolver_cache_ttl_secs))
    }

    /// Ruta del chime si `guild_id` es la guild de despedida
    pub fn farewell_chime_for(&self, guild_id: GuildId) -> Option<PathBuf> {
        match (self.farewell_guild_id, &self.farewell_chime_path) {
            (Some(farewell), Some(path)) if farewell == guild_id.get() => Some(path.clone()),
            _ => None,
        }
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {} connect timeout\n  \
            Limits: {} queue\n  \
            Resolver: {} cached, {} ttl, {} timeout\n  \
            Farewell: {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.output_volume * 100.0) as u32,
            humantime::format_duration(Duration::from_secs(self.connection_timeout_secs)),
            self.max_queue_size,
            self.resolver_cache_size,
            humantime::format_duration(Duration::from_secs(self.resolver_cache_ttl_secs)),
            humantime::format_duration(self.resolve_timeout()),
            self.farewell_guild_id
                .map_or("off".to_string(), |id| format!("guild {id}")),
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Audio defaults
            output_volume: 0.25,
            connection_timeout_secs: 30,
            max_queue_size: 1000,

            // Resolver defaults
            resolver_cache_size: 256,
            resolver_cache_ttl_secs: 3600, // 1 hora
            resolve_timeout_secs: 30,

            farewell_guild_id: None,
            farewell_chime_path: None,
        }
    }
}
