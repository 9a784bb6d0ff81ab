use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        player::{EventSink, PlayRequest},
        state::ConnectionStatus,
    },
    error::{EngineError, EngineResult, TransportError},
};

/// Canal de voz destino. El registro del motor se indexa por `channel_id`;
/// el `guild_id` hace falta para abrir la llamada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceChannel {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

impl VoiceChannel {
    pub fn new(guild_id: impl Into<GuildId>, channel_id: impl Into<ChannelId>) -> Self {
        Self {
            guild_id: guild_id.into(),
            channel_id: channel_id.into(),
        }
    }
}

impl fmt::Display for VoiceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (guild {})", self.channel_id, self.guild_id)
    }
}

/// Primitiva de conexión de la plataforma de voz
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Abre un enlace hacia el canal. Puede devolver antes de que esté listo.
    async fn connect(&self, channel: VoiceChannel) -> Result<Arc<dyn VoiceLink>, TransportError>;

    /// Libera cualquier enlace a medio abrir para el canal
    async fn release(&self, channel: VoiceChannel);
}

/// Enlace de voz abierto: la llamada sobre la que suena el audio
#[async_trait]
pub trait VoiceLink: Send + Sync {
    async fn is_connected(&self) -> bool;

    /// Resuelve cuando el transporte reporta la conexión lista
    async fn wait_ready(&self) -> Result<(), TransportError>;

    /// Envía los eventos terminales de cada track a `sink`, reemplazando
    /// cualquier suscripción anterior.
    async fn subscribe(&self, sink: EventSink);

    /// Reproduce reemplazando lo que estuviera sonando
    async fn play(&self, request: PlayRequest) -> Result<(), TransportError>;

    async fn stop(&self);

    async fn disconnect(&self);
}

/// Conexión de un canal, propiedad exclusiva de su estado de reproducción
pub struct Connection {
    channel: VoiceChannel,
    link: Arc<dyn VoiceLink>,
    destroyed: AtomicBool,
}

impl Connection {
    fn new(channel: VoiceChannel, link: Arc<dyn VoiceLink>) -> Self {
        Self {
            channel,
            link,
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn link(&self) -> &Arc<dyn VoiceLink> {
        &self.link
    }

    /// Compara identidad del enlace, no su contenido
    pub fn is_link(&self, other: &Arc<dyn VoiceLink>) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.link) as *const (),
            Arc::as_ptr(other) as *const (),
        )
    }

    pub async fn status(&self) -> ConnectionStatus {
        if self.destroyed.load(Ordering::Acquire) {
            ConnectionStatus::Destroyed
        } else if self.link.is_connected().await {
            ConnectionStatus::Ready
        } else {
            ConnectionStatus::Disconnected
        }
    }

    /// Desconecta y libera el enlace. Idempotente.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            debug!("Conexión de {} ya destruida", self.channel);
            return;
        }

        self.link.disconnect().await;
        info!("👋 Desconectado del canal de voz {}", self.channel);
    }
}

/// Abre, reutiliza y destruye conexiones de voz. Es el único componente que
/// toca el transporte.
pub struct ConnectionManager {
    transport: Arc<dyn VoiceTransport>,
    ready_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn VoiceTransport>, ready_timeout: Duration) -> Self {
        Self {
            transport,
            ready_timeout,
        }
    }

    /// Devuelve `existing` si sigue viva; si no, la destruye y abre otra
    /// esperando como mucho `ready_timeout` a que quede lista.
    pub async fn ensure_connection(
        &self,
        channel: VoiceChannel,
        existing: Option<Connection>,
    ) -> EngineResult<Connection> {
        if let Some(connection) = existing {
            match connection.status().await {
                ConnectionStatus::Disconnected | ConnectionStatus::Destroyed => {
                    debug!("Conexión obsoleta en {}, reconectando", channel);
                    connection.destroy().await;
                }
                _ => return Ok(connection),
            }
        }

        self.open(channel).await
    }

    async fn open(&self, channel: VoiceChannel) -> EngineResult<Connection> {
        info!("🔊 Conectando al canal de voz {}", channel);

        let attempt = async {
            let link = self.transport.connect(channel).await?;
            link.wait_ready().await?;
            Ok::<_, TransportError>(link)
        };

        match timeout(self.ready_timeout, attempt).await {
            Ok(Ok(link)) => {
                info!("✅ Conexión lista en {}", channel);
                Ok(Connection::new(channel, link))
            }
            Ok(Err(e)) => {
                warn!("❌ El transporte rechazó la conexión a {}: {}", channel, e);
                self.transport.release(channel).await;
                Err(e.into())
            }
            Err(_) => {
                warn!(
                    "⏰ La conexión a {} no estuvo lista en {}",
                    channel,
                    humantime::format_duration(self.ready_timeout)
                );
                self.transport.release(channel).await;
                Err(EngineError::ConnectionTimeout(self.ready_timeout))
            }
        }
    }
}
