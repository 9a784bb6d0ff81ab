use std::{fmt, sync::Arc};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    audio::{
        connection::{Connection, VoiceLink},
        track::{PlaybackSource, Track},
    },
    error::TransportError,
};

/// Identifica una llamada a [`Player::play`]. Los eventos terminales la
/// llevan para que cada reproducción avance la cola una sola vez.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackId(pub u64);

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    Finished,
    /// El stream falló; para la cola cuenta igual que `Finished`
    Failed(String),
}

/// "El reproductor quedó inactivo": fin natural, stop forzado o error
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEvent {
    pub playback: PlaybackId,
    pub outcome: PlaybackOutcome,
}

pub type EventSink = mpsc::UnboundedSender<PlayerEvent>;
pub type EventStream = mpsc::UnboundedReceiver<PlayerEvent>;

/// Lo que el enlace de voz necesita para empezar a sonar
#[derive(Debug, Clone, PartialEq)]
pub struct PlayRequest {
    pub playback: PlaybackId,
    pub title: String,
    pub source: PlaybackSource,
    pub volume: f32,
}

#[derive(Debug, Clone, Copy)]
struct ActivePlayback {
    id: PlaybackId,
    silent: bool,
}

/// Reproductor de un canal: a lo sumo una reproducción activa a la vez
pub struct Player {
    link: Arc<dyn VoiceLink>,
    sink: EventSink,
    volume: f32,
    active: Option<ActivePlayback>,
}

impl Player {
    /// Reutiliza `existing` si ya está ligado a la conexión; si no, crea un
    /// reproductor nuevo y suscribe el enlace al `sink` del canal.
    pub async fn ensure(
        existing: Option<Player>,
        connection: &Connection,
        sink: &EventSink,
        volume: f32,
    ) -> Player {
        if let Some(player) = existing {
            if connection.is_link(&player.link) {
                return player;
            }
            debug!("Conexión nueva, reemplazando reproductor");
        }

        connection.link().subscribe(sink.clone()).await;

        Player {
            link: connection.link().clone(),
            sink: sink.clone(),
            volume,
            active: None,
        }
    }

    /// Empieza a reproducir `track`, pisando lo que estuviera sonando
    pub async fn play(&mut self, track: &Track, playback: PlaybackId) -> Result<(), TransportError> {
        let source = track
            .source()
            .ok_or_else(|| TransportError::Unplayable(track.title().to_string()))?;

        if let Some(previous) = self.active.take() {
            if previous.silent {
                self.notify(previous.id);
            }
        }

        let silent = source == PlaybackSource::Silence;
        if silent {
            info!("🔇 Manteniendo la llamada en silencio: {}", track.title());
        } else {
            self.link
                .play(PlayRequest {
                    playback,
                    title: track.title().to_string(),
                    source,
                    volume: self.volume,
                })
                .await?;
        }

        self.active = Some(ActivePlayback {
            id: playback,
            silent,
        });
        Ok(())
    }

    /// Corta la reproducción. Dispara el mismo evento que un final natural.
    pub async fn stop(&mut self) {
        match self.active.take() {
            Some(ActivePlayback { id, silent: true }) => self.notify(id),
            Some(_) => self.link.stop().await,
            None => debug!("stop sin reproducción activa"),
        }
    }

    /// Registra que la reproducción terminó. Devuelve `false` si el evento
    /// no corresponde a la reproducción activa.
    pub fn mark_idle(&mut self, playback: PlaybackId) -> bool {
        match self.active {
            Some(active) if active.id == playback => {
                self.active = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_playback(&self) -> Option<PlaybackId> {
        self.active.map(|active| active.id)
    }

    fn notify(&self, playback: PlaybackId) {
        let event = PlayerEvent {
            playback,
            outcome: PlaybackOutcome::Finished,
        };
        if self.sink.send(event).is_err() {
            debug!("Nadie escucha los eventos del reproductor");
        }
    }
}
