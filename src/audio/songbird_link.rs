//! Voice transport backed by songbird.
//!
//! One [`SongbirdLink`] wraps the guild's `Call`. Terminal track events
//! (`End`, `Error`) are translated into [`PlayerEvent`]s by a global
//! handler registered once per link.

use async_trait::async_trait;
use parking_lot::Mutex;
use songbird::{
    input::{File, HttpRequest, Input, YoutubeDl},
    tracks::{PlayMode, Track as SongbirdTrack, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        connection::{VoiceChannel, VoiceLink, VoiceTransport},
        player::{EventSink, PlayRequest, PlaybackId, PlaybackOutcome, PlayerEvent},
        track::PlaybackSource,
    },
    error::TransportError,
    sources::YtDlpResolver,
};

/// Abre llamadas a través del manager de songbird
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self { manager, http }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(&self, channel: VoiceChannel) -> Result<Arc<dyn VoiceLink>, TransportError> {
        let call = self
            .manager
            .join(channel.guild_id, channel.channel_id)
            .await
            .map_err(|e| TransportError::Refused(e.to_string()))?;

        let shared = Arc::new(LinkShared::default());
        {
            let mut handler = call.lock().await;
            // Una sola llamada por guild: se descartan handlers de enlaces previos
            handler.remove_all_global_events();
            handler.add_global_event(
                Event::Track(TrackEvent::End),
                TrackIdleNotifier {
                    shared: shared.clone(),
                },
            );
            handler.add_global_event(
                Event::Track(TrackEvent::Error),
                TrackIdleNotifier {
                    shared: shared.clone(),
                },
            );
        }

        Ok(Arc::new(SongbirdLink {
            channel,
            manager: self.manager.clone(),
            call,
            http: self.http.clone(),
            shared,
        }))
    }

    async fn release(&self, channel: VoiceChannel) {
        if let Err(e) = self.manager.remove(channel.guild_id).await {
            debug!("Nada que liberar en {}: {}", channel, e);
        }
    }
}

/// Estado compartido entre el enlace y su notificador de eventos
#[derive(Default)]
struct LinkShared {
    sink: Mutex<Option<EventSink>>,
    handles: Mutex<Vec<(TrackHandle, PlaybackId)>>,
}

impl LinkShared {
    /// Saca el handle del registro; cada reproducción se reporta una vez
    fn take_playback(&self, handle: &TrackHandle) -> Option<PlaybackId> {
        let mut handles = self.handles.lock();
        let index = handles
            .iter()
            .position(|(known, _)| known.uuid() == handle.uuid())?;
        Some(handles.swap_remove(index).1)
    }

    fn emit(&self, event: PlayerEvent) {
        if let Some(sink) = self.sink.lock().as_ref() {
            if sink.send(event).is_err() {
                debug!("Nadie escucha los eventos del enlace");
            }
        }
    }
}

pub struct SongbirdLink {
    channel: VoiceChannel,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    http: reqwest::Client,
    shared: Arc<LinkShared>,
}

impl SongbirdLink {
    fn input_for(&self, source: &PlaybackSource) -> Result<Input, TransportError> {
        match source {
            PlaybackSource::Remote(url) if YtDlpResolver::is_youtube_url(url) => {
                Ok(YoutubeDl::new(self.http.clone(), url.clone()).into())
            }
            PlaybackSource::Remote(url) => Ok(HttpRequest::new(self.http.clone(), url.clone()).into()),
            PlaybackSource::Local(path) => {
                if !path.exists() {
                    return Err(TransportError::Input(format!(
                        "file not found: {}",
                        path.display()
                    )));
                }
                Ok(File::new(path.clone()).into())
            }
            PlaybackSource::Silence => Err(TransportError::Unplayable(
                "silence is not sent over the link".to_string(),
            )),
        }
    }
}

#[async_trait]
impl VoiceLink for SongbirdLink {
    async fn is_connected(&self) -> bool {
        self.call.lock().await.current_connection().is_some()
    }

    async fn wait_ready(&self) -> Result<(), TransportError> {
        // `Songbird::join` resuelve cuando el handshake terminó
        if self.is_connected().await {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }

    async fn subscribe(&self, sink: EventSink) {
        *self.shared.sink.lock() = Some(sink);
    }

    async fn play(&self, request: PlayRequest) -> Result<(), TransportError> {
        let input = self.input_for(&request.source)?;
        // Arranca en pausa para registrar el handle antes del primer evento
        let track = SongbirdTrack::new(input).volume(request.volume).pause();

        let handle = self.call.lock().await.play_only(track);
        self.shared
            .handles
            .lock()
            .push((handle.clone(), request.playback));

        if let Err(e) = handle.play() {
            self.shared.take_playback(&handle);
            return Err(TransportError::Input(e.to_string()));
        }

        debug!("▶️ {} → {} ({})", request.title, self.channel, request.playback);
        Ok(())
    }

    async fn stop(&self) {
        self.call.lock().await.stop();
    }

    async fn disconnect(&self) {
        {
            let mut call = self.call.lock().await;
            call.stop();
            call.remove_all_global_events();
        }
        self.shared.sink.lock().take();
        self.shared.handles.lock().clear();

        if let Err(e) = self.manager.remove(self.channel.guild_id).await {
            warn!("⚠️ Error al salir de {}: {}", self.channel, e);
        } else {
            info!("👋 Llamada de voz cerrada en {}", self.channel);
        }
    }
}

/// Traduce `End` / `Error` de songbird en eventos del reproductor
struct TrackIdleNotifier {
    shared: Arc<LinkShared>,
}

#[async_trait]
impl VoiceEventHandler for TrackIdleNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(track_list) = ctx {
            for (state, handle) in *track_list {
                let Some(playback) = self.shared.take_playback(handle) else {
                    continue;
                };

                let outcome = match &state.playing {
                    PlayMode::Errored(e) => PlaybackOutcome::Failed(format!("{e:?}")),
                    _ => PlaybackOutcome::Finished,
                };
                self.shared.emit(PlayerEvent { playback, outcome });
            }
        }

        None
    }
}
