//! # Bot Module
//!
//! Thin Discord command layer that drives the [`QueueEngine`].
//!
//! - Slash command registration (global or per-guild)
//! - Interaction dispatch: each command acts on the invoker's voice channel
//! - Cleanup when the bot is disconnected from a voice channel externally
//! - Periodic cache maintenance

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use songbird::Songbird;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{audio::engine::QueueEngine, cache::MetadataCache, config::Config};

/// Manejador de eventos de Discord
pub struct JukeboxBot {
    config: Arc<Config>,
    engine: QueueEngine,
    /// Cache del resolvedor, para la limpieza periódica
    cache: MetadataCache,
    songbird: Arc<Songbird>,
}

impl JukeboxBot {
    pub fn new(
        config: Config,
        engine: QueueEngine,
        cache: MetadataCache,
        songbird: Arc<Songbird>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            cache,
            songbird,
        }
    }

    pub fn engine(&self) -> &QueueEngine {
        &self.engine
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers slash commands with Discord.
    ///
    /// Per-guild when `GUILD_ID` is set (fast propagation while developing),
    /// global otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::from(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Sigue conectado a `channel` según songbird
    async fn still_in_channel(&self, guild_id: GuildId, channel: serenity::all::ChannelId) -> bool {
        let Some(call) = self.songbird.get(guild_id) else {
            return false;
        };
        let current = call.lock().await.current_channel();
        current.is_some_and(|id| id.0.get() == channel.get())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        let cache = self.cache.clone();
        tokio::spawn(async move {
            maintenance_tasks(cache).await;
        });
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Limpia el estado del canal si al bot lo sacaron de la llamada
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || new.channel_id.is_some() {
            return;
        }

        let (Some(guild_id), Some(channel_id)) = (
            new.guild_id,
            old.and_then(|state| state.channel_id),
        ) else {
            return;
        };

        // El propio desmontaje del motor también genera este evento
        if self.still_in_channel(guild_id, channel_id).await {
            debug!("Evento de voz viejo para {}, ignorado", channel_id);
            return;
        }

        info!("🔌 Bot desconectado de {} en guild {}", channel_id, guild_id);
        self.engine.disconnect_and_cleanup(channel_id).await;
    }
}

/// Tareas periódicas: limpieza de la cache del resolvedor
async fn maintenance_tasks(cache: MetadataCache) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600)); // Cada hora

    loop {
        interval.tick().await;

        cache.cleanup_old_entries();

        let metrics = cache.metrics();
        info!(
            "🧹 Tareas de mantenimiento completadas ({} entradas, {:.0}% hits)",
            cache.len(),
            metrics.hit_rate() * 100.0
        );
    }
}
