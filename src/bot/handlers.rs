use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{connection::VoiceChannel, track::Track},
    bot::JukeboxBot,
    error::EngineError,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    // Todos los comandos actúan sobre el canal de voz de quien los invoca
    let Some(channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return respond_embed(
            ctx,
            &command,
            embeds::create_error_embed("Sin canal de voz", "Debes estar en un canal de voz"),
        )
        .await;
    };
    let channel = VoiceChannel::new(guild_id, channel_id);

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, channel).await,
        "skip" => handle_skip(ctx, &command, bot, channel).await,
        "loop" => handle_loop(ctx, &command, bot, channel).await,
        "queue" => handle_queue(ctx, &command, bot, channel).await,
        "stop" => handle_stop(ctx, &command, bot, channel).await,
        "join" => handle_join(ctx, &command, bot, channel).await,
        "leave" => handle_leave(ctx, &command, bot, channel).await,
        _ => respond(ctx, &command, "❌ Comando no reconocido").await,
    }
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    channel: VoiceChannel,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let engine = bot.engine();
    let outcome = async {
        let track = Track::from(engine.get_info(query).await?);
        let starts_now = engine
            .get_audio_queue(channel.channel_id)
            .await
            .current
            .is_none_or(|current| current.is_ambient());
        engine.add_to_queue(channel, vec![track.clone()]).await?;
        Ok::<_, EngineError>((track, starts_now))
    }
    .await;

    let embed = match outcome {
        Ok((track, starts_now)) => embeds::create_track_added_embed(&track, starts_now),
        Err(e) => {
            warn!("⚠️ /play falló en {}: {}", channel, e);
            embeds::create_error_embed("No se pudo reproducir", &error_message(&e))
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    channel: VoiceChannel,
) -> Result<()> {
    let content = match bot.engine().skip_current_song(channel.channel_id).await {
        Ok(Some(title)) => format!("⏭️ Saltado. Ahora suena **{}**", title),
        Ok(None) => "⏭️ Saltado. No quedan canciones en la cola".to_string(),
        Err(e) => format!("❌ {}", error_message(&e)),
    };

    respond(ctx, command, &content).await
}

async fn handle_loop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    channel: VoiceChannel,
) -> Result<()> {
    let content = match bot.engine().toggle_loop(channel.channel_id).await {
        Ok(true) => "🔁 Loop activado".to_string(),
        Ok(false) => "➡️ Loop desactivado".to_string(),
        Err(e) => format!("❌ {}", error_message(&e)),
    };

    respond(ctx, command, &content).await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    channel: VoiceChannel,
) -> Result<()> {
    let snapshot = bot.engine().get_audio_queue(channel.channel_id).await;

    respond_embed(ctx, command, embeds::create_queue_embed(&snapshot)).await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    channel: VoiceChannel,
) -> Result<()> {
    bot.engine().disconnect_and_cleanup(channel.channel_id).await;

    respond(ctx, command, "⏹️ Reproducción detenida y cola vaciada").await
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    channel: VoiceChannel,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let embed = match bot.engine().add_to_queue(channel, vec![Track::ambient()]).await {
        Ok(()) => embeds::create_success_embed(
            "Conectado",
            &format!("Me quedo en <#{}> hasta que haya música", channel.channel_id),
        ),
        Err(e) => embeds::create_error_embed("No se pudo conectar", &error_message(&e)),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    channel: VoiceChannel,
) -> Result<()> {
    let engine = bot.engine();
    engine.disconnect_and_cleanup(channel.channel_id).await;

    // En la guild de despedida suena el chime y la cola vacía desconecta sola
    if let Some(path) = bot.config().farewell_chime_for(channel.guild_id) {
        if let Err(e) = engine
            .add_to_queue(channel, vec![Track::farewell_chime(path)])
            .await
        {
            warn!("⚠️ No se pudo reproducir la despedida en {}: {}", channel, e);
        }
    }

    respond(ctx, command, "👋 Desconectado del canal de voz").await
}

/// Texto para el usuario a partir de un error del motor
pub fn error_message(err: &EngineError) -> String {
    match err {
        EngineError::ConnectionTimeout(_) | EngineError::Connection(_) => {
            "No pude conectarme al canal de voz. Revisa mis permisos".to_string()
        }
        EngineError::Resolution(_) => "No encontré nada para esa búsqueda".to_string(),
        EngineError::NotPlaying => "No hay nada sonando en tu canal".to_string(),
        EngineError::QueueFull { limit } => {
            format!("La cola está llena (máximo {} canciones)", limit)
        }
    }
}

async fn respond(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content),
            ),
        )
        .await?;

    Ok(())
}

async fn respond_embed(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;

    Ok(())
}

/// Canal de voz donde está el usuario, según la caché de la guild
fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn queue_full_mentions_the_limit() {
        assert_eq!(
            error_message(&EngineError::QueueFull { limit: 1000 }),
            "La cola está llena (máximo 1000 canciones)"
        );
    }

    #[test]
    fn connection_failures_share_a_message() {
        assert_eq!(
            error_message(&EngineError::ConnectionTimeout(Duration::from_secs(30))),
            error_message(&EngineError::Connection("refused".to_string()))
        );
    }
}
