use chrono::{DateTime, Utc};
use std::{collections::VecDeque, sync::Arc};
use tracing::info;

use crate::audio::{
    connection::{Connection, VoiceChannel},
    player::{EventSink, PlaybackId, Player},
    track::Track,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Ready,
    Destroyed,
}

/// Vista de solo lectura de la cola de un canal
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueSnapshot {
    pub current: Option<Arc<Track>>,
    pub resources_metadatas: Vec<Arc<Track>>,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.resources_metadatas.is_empty()
    }

    pub fn titles(&self) -> Vec<String> {
        self.resources_metadatas
            .iter()
            .map(|track| track.title().to_string())
            .collect()
    }
}

/// Estado de reproducción de un canal de voz. Solo el motor lo muta, y
/// siempre con el lock del canal tomado.
pub struct ChannelPlayback {
    channel: VoiceChannel,
    pub(crate) connection_status: ConnectionStatus,
    current: Option<Arc<Track>>,
    current_playback: Option<PlaybackId>,
    queue: VecDeque<Arc<Track>>,
    looping: bool,
    started_at: Option<DateTime<Utc>>,
    pub(crate) connection: Option<Connection>,
    pub(crate) player: Option<Player>,
    events: EventSink,
}

impl ChannelPlayback {
    pub fn new(channel: VoiceChannel, events: EventSink) -> Self {
        Self {
            channel,
            connection_status: ConnectionStatus::Disconnected,
            current: None,
            current_playback: None,
            queue: VecDeque::new(),
            looping: false,
            started_at: None,
            connection: None,
            player: None,
            events,
        }
    }

    pub fn channel(&self) -> VoiceChannel {
        self.channel
    }

    /// Estado de la conexión: el del enlace si hay uno, si no el último
    /// registrado (sin conectar, conectando o destruida).
    pub async fn connection_status(&self) -> ConnectionStatus {
        match &self.connection {
            Some(connection) => connection.status().await,
            None => self.connection_status,
        }
    }

    pub fn current(&self) -> Option<&Arc<Track>> {
        self.current.as_ref()
    }

    pub fn current_playback(&self) -> Option<PlaybackId> {
        self.current_playback
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    /// Sin track actual ni pendientes
    pub fn is_vacant(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }

    /// Agrega al final, respetando el orden de llegada
    pub fn enqueue(&mut self, tracks: impl IntoIterator<Item = Arc<Track>>) {
        for track in tracks {
            info!("➕ Agregado a la cola de {}: {}", self.channel, track.title());
            self.queue.push_back(track);
        }
    }

    /// Cierra el track actual. Con loop activo vuelve al final de la cola;
    /// los tracks ambient nunca se repiten.
    pub fn finish_current(&mut self) -> Option<Arc<Track>> {
        let finished = self.current.take()?;
        self.current_playback = None;

        if self.looping && !finished.is_ambient() {
            info!("🔁 Track agregado al final por loop: {}", finished.title());
            self.queue.push_back(finished.clone());
        }

        Some(finished)
    }

    /// Descarta el track actual sin pasar por el loop
    pub fn discard_current(&mut self) -> Option<Arc<Track>> {
        self.current_playback = None;
        self.current.take()
    }

    /// Devuelve el track actual al frente de la cola para volver a
    /// empezarlo. Un ambient se descarta.
    pub fn requeue_current(&mut self) -> Option<Arc<Track>> {
        self.current_playback = None;
        let track = self.current.take()?;
        if !track.is_ambient() {
            self.queue.push_front(track.clone());
        }
        Some(track)
    }

    /// Mueve el frente de la cola a `current` (FIFO)
    pub fn promote_next(&mut self) -> Option<Arc<Track>> {
        let next = self.queue.pop_front()?;
        self.current = Some(next.clone());
        Some(next)
    }

    pub fn mark_started(&mut self, playback: PlaybackId) {
        self.current_playback = Some(playback);
        self.started_at = Some(Utc::now());
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.looping = !self.looping;
        if self.looping {
            info!("🔁 Loop activado en {}", self.channel);
        } else {
            info!("➡️ Loop desactivado en {}", self.channel);
        }
        self.looping
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            current: self.current.clone(),
            resources_metadatas: self.queue.iter().cloned().collect(),
        }
    }
}
