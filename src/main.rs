use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::{sync::Arc, time::Duration};
use tracing::{error, info};

use channel_jukebox::{
    audio::{engine::QueueEngine, songbird_link::SongbirdTransport},
    bot::JukeboxBot,
    config::Config,
    sources::{CachedResolver, YtDlpResolver},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("channel_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Channel Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Resolución de medios con cache
    let cache = config.resolver_cache();
    let resolver = YtDlpResolver::new(config.resolve_timeout());
    if let Err(e) = resolver.verify().await {
        error!("❌ yt-dlp no disponible, /play va a fallar: {:?}", e);
    }
    let resolver = Arc::new(CachedResolver::new(resolver, cache.clone()));

    // Voz
    let songbird = Songbird::serenity();
    let transport = Arc::new(SongbirdTransport::new(songbird.clone(), reqwest::Client::new()));
    let engine = QueueEngine::new(transport, resolver, config.engine());

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = JukeboxBot::new(config.clone(), engine.clone(), cache, songbird.clone());

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");

        if tokio::time::timeout(Duration::from_secs(10), engine.shutdown())
            .await
            .is_err()
        {
            error!("⏰ No se pudieron liberar todos los canales a tiempo");
        }
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    YtDlpResolver::new(Duration::from_secs(10)).verify().await?;
    println!("OK");
    Ok(())
}
