use dashmap::DashMap;
use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        connection::{ConnectionManager, VoiceChannel, VoiceTransport},
        player::{EventStream, PlaybackId, PlaybackOutcome, Player, PlayerEvent},
        state::{ChannelPlayback, ConnectionStatus, QueueSnapshot},
        track::Track,
    },
    error::{EngineError, EngineResult, TransportError},
    sources::{MediaResolver, TrackMetadata},
};

/// Parámetros del motor
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Volumen fijo de salida (0.0 - 2.0)
    pub output_volume: f32,
    pub connection_timeout: Duration,
    /// Máximo de tracks pendientes por canal
    pub max_queue_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_volume: 0.25,
            connection_timeout: Duration::from_secs(30),
            max_queue_size: 1000,
        }
    }
}

type Slot = Arc<Mutex<Option<ChannelPlayback>>>;
type SlotGuard = OwnedMutexGuard<Option<ChannelPlayback>>;

/// Resultado de intentar dejar algo sonando
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Playing,
    /// Nada actual ni pendiente: hay que liberar el canal
    Drained,
}

/// Motor de colas: mapea canal de voz → estado de reproducción.
///
/// Cada canal tiene su propio lock; las operaciones sobre un canal se
/// serializan entre sí y nunca bloquean a otros canales. Es barato de
/// clonar y todas las copias comparten el mismo registro.
#[derive(Clone)]
pub struct QueueEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    channels: DashMap<ChannelId, Slot>,
    /// Canal que ocupa la llamada de cada guild (una sola por guild)
    guilds: DashMap<GuildId, ChannelId>,
    guild_locks: DashMap<GuildId, Arc<Mutex<()>>>,
    connections: ConnectionManager,
    resolver: Arc<dyn MediaResolver>,
    config: EngineConfig,
    next_playback: AtomicU64,
}

impl QueueEngine {
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        resolver: Arc<dyn MediaResolver>,
        config: EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                channels: DashMap::new(),
                guilds: DashMap::new(),
                guild_locks: DashMap::new(),
                connections: ConnectionManager::new(transport, config.connection_timeout),
                resolver,
                config,
                next_playback: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Resuelve metadata sin tocar ningún canal
    pub async fn get_info(&self, query: &str) -> EngineResult<TrackMetadata> {
        info!("🔍 Resolviendo: {}", query);
        self.inner.resolver.resolve(query).await
    }

    /// Agrega tracks a la cola del canal, conectando si hace falta. Si no
    /// hay nada sonando, el primero empieza de inmediato.
    pub async fn add_to_queue(
        &self,
        channel: VoiceChannel,
        tracks: impl Into<Vec<Track>>,
    ) -> EngineResult<()> {
        let tracks: Vec<Arc<Track>> = tracks.into().into_iter().map(Arc::new).collect();
        if tracks.is_empty() {
            debug!("Nada que agregar en {}", channel);
            return Ok(());
        }

        // Las altas de una guild se serializan: comparten una sola llamada
        let guild_lock = self
            .inner
            .guild_locks
            .entry(channel.guild_id)
            .or_default()
            .clone();
        let _guild_guard = guild_lock.lock_owned().await;

        let (slot, mut guard) = self.lock_or_create(channel).await;

        let result = match guard.as_mut() {
            Some(state) => self.admit(state, tracks).await,
            None => Ok(Flow::Playing),
        };

        match result {
            Ok(Flow::Playing) => Ok(()),
            Ok(Flow::Drained) => {
                self.teardown(channel.channel_id, &slot, &mut guard).await;
                Ok(())
            }
            Err(err @ EngineError::QueueFull { .. }) => {
                if guard.as_ref().is_some_and(|state| state.is_vacant()) {
                    self.retire(channel.channel_id, &slot, &mut guard);
                }
                Err(err)
            }
            Err(err) => {
                // Sin conexión no se deja estado a medio crear
                self.teardown(channel.channel_id, &slot, &mut guard).await;
                Err(err)
            }
        }
    }

    /// Corta el track actual y avanza. Devuelve el título del nuevo actual.
    pub async fn skip_current_song(&self, channel_id: ChannelId) -> EngineResult<Option<String>> {
        let (slot, mut guard) = self
            .lock_existing(channel_id)
            .await
            .ok_or(EngineError::NotPlaying)?;

        let flow = match guard.as_mut() {
            Some(state) if state.player.is_some() && state.current().is_some() => {
                if let Some(track) = state.current() {
                    info!("⏭️ Saltando {} en {}", track.title(), state.channel());
                }
                if let Some(player) = state.player.as_mut() {
                    player.stop().await;
                }
                self.advance(state).await
            }
            _ => return Err(EngineError::NotPlaying),
        };

        match flow {
            Flow::Playing => Ok(guard
                .as_ref()
                .and_then(|state| state.current())
                .map(|track| track.title().to_string())),
            Flow::Drained => {
                self.teardown(channel_id, &slot, &mut guard).await;
                Ok(None)
            }
        }
    }

    pub async fn toggle_loop(&self, channel_id: ChannelId) -> EngineResult<bool> {
        let (_slot, mut guard) = self
            .lock_existing(channel_id)
            .await
            .ok_or(EngineError::NotPlaying)?;

        guard
            .as_mut()
            .map(|state| state.toggle_loop())
            .ok_or(EngineError::NotPlaying)
    }

    /// Copia de la cola para mostrarla; vacía si el canal no tiene estado
    pub async fn get_audio_queue(&self, channel_id: ChannelId) -> QueueSnapshot {
        match self.lock_existing(channel_id).await {
            Some((_slot, guard)) => guard
                .as_ref()
                .map(|state| state.snapshot())
                .unwrap_or_default(),
            None => QueueSnapshot::default(),
        }
    }

    /// Desmonta todo lo del canal. Seguro de llamar varias veces o sobre
    /// canales que nunca se usaron.
    pub async fn disconnect_and_cleanup(&self, channel_id: ChannelId) {
        match self.lock_existing(channel_id).await {
            Some((slot, mut guard)) => self.teardown(channel_id, &slot, &mut guard).await,
            None => debug!("Canal {} sin estado, nada que limpiar", channel_id),
        }
    }

    /// Estado de la conexión del canal; `None` si no tiene estado
    pub async fn connection_status(&self, channel_id: ChannelId) -> Option<ConnectionStatus> {
        let (_slot, guard) = self.lock_existing(channel_id).await?;
        match guard.as_ref() {
            Some(state) => Some(state.connection_status().await),
            None => None,
        }
    }

    pub fn active_channels(&self) -> Vec<ChannelId> {
        self.inner
            .channels
            .iter()
            .map(|entry| *entry.key())
            .collect()
    }

    /// Libera todos los canales (apagado ordenado)
    pub async fn shutdown(&self) {
        let channels = self.active_channels();
        info!("🛑 Liberando {} canales de voz", channels.len());
        join_all(
            channels
                .into_iter()
                .map(|channel_id| self.disconnect_and_cleanup(channel_id)),
        )
        .await;
    }

    // Funciones privadas

    async fn admit(&self, state: &mut ChannelPlayback, tracks: Vec<Arc<Track>>) -> EngineResult<Flow> {
        let preempts_ambient = state.current().is_some_and(|track| track.is_ambient());
        let starts_now = state.current().is_none() || preempts_ambient;
        let pending = state.queue_len() + tracks.len() - usize::from(starts_now);
        let limit = self.inner.config.max_queue_size;
        if pending > limit {
            warn!("🚫 Cola llena en {}: {} > {}", state.channel(), pending, limit);
            return Err(EngineError::QueueFull { limit });
        }

        let channel = state.channel();
        self.claim_guild(channel).await;

        let existing = state.connection.take();
        if existing.is_none() {
            state.connection_status = ConnectionStatus::Connecting;
        }
        let connection = match self
            .inner
            .connections
            .ensure_connection(channel, existing)
            .await
        {
            Ok(connection) => connection,
            Err(err) => {
                state.connection_status = ConnectionStatus::Disconnected;
                return Err(err);
            }
        };

        let player = Player::ensure(
            state.player.take(),
            &connection,
            state.events(),
            self.inner.config.output_volume,
        )
        .await;
        state.connection = Some(connection);
        state.connection_status = ConnectionStatus::Ready;

        // Un enlace nuevo no trae la reproducción del anterior
        let orphaned = state.current().is_some() && !player.is_active();
        state.player = Some(player);
        if orphaned {
            if let Some(track) = state.requeue_current() {
                warn!("🔄 Conexión reemplazada en {}, reiniciando {}", channel, track.title());
            }
        }

        state.enqueue(tracks);

        if state.current().is_none() {
            return Ok(self.start_next(state).await);
        }

        if preempts_ambient {
            info!("🎶 Llegó música, terminando el relleno en {}", channel);
            if let Some(player) = state.player.as_mut() {
                player.stop().await;
            }
            return Ok(self.advance(state).await);
        }

        Ok(Flow::Playing)
    }

    /// Paso de avance: cierra el actual (con loop) y arranca el siguiente
    async fn advance(&self, state: &mut ChannelPlayback) -> Flow {
        state.finish_current();
        self.start_next(state).await
    }

    async fn start_next(&self, state: &mut ChannelPlayback) -> Flow {
        while let Some(track) = state.promote_next() {
            let playback = PlaybackId(self.inner.next_playback.fetch_add(1, Ordering::Relaxed));

            let started = match state.player.as_mut() {
                Some(player) => player.play(&track, playback).await,
                None => Err(TransportError::Closed),
            };

            match started {
                Ok(()) => {
                    state.mark_started(playback);
                    info!(
                        "🎵 Reproduciendo: {} en {} ({})",
                        track.title(),
                        state.channel(),
                        playback
                    );
                    return Flow::Playing;
                }
                Err(e) => {
                    warn!("⚠️ No se pudo reproducir {}: {}", track.title(), e);
                    state.discard_current();
                }
            }
        }

        info!("📭 Cola vacía en {}", state.channel());
        Flow::Drained
    }

    async fn handle_player_event(&self, channel_id: ChannelId, event: PlayerEvent) {
        let Some((slot, mut guard)) = self.lock_existing(channel_id).await else {
            debug!("Evento {} para canal {} sin estado", event.playback, channel_id);
            return;
        };

        let flow = match guard.as_mut() {
            Some(state) if state.current_playback() == Some(event.playback) => {
                if let PlaybackOutcome::Failed(reason) = &event.outcome {
                    warn!(
                        "❌ Falló la reproducción {} en {}: {}",
                        event.playback,
                        state.channel(),
                        reason
                    );
                }
                if let Some(player) = state.player.as_mut() {
                    player.mark_idle(event.playback);
                }
                self.advance(state).await
            }
            _ => {
                debug!("Evento obsoleto {} en {}", event.playback, channel_id);
                return;
            }
        };

        if flow == Flow::Drained {
            self.teardown(channel_id, &slot, &mut guard).await;
        }
    }

    async fn pump_events(self, channel_id: ChannelId, mut stream: EventStream) {
        while let Some(event) = stream.recv().await {
            self.handle_player_event(channel_id, event).await;
        }
        debug!("Stream de eventos de {} cerrado", channel_id);
    }

    /// Registra `channel` como dueño de la llamada de su guild y desmonta
    /// el canal que la tenía antes. Requiere el lock de la guild; el
    /// orden es siempre guild → canal.
    async fn claim_guild(&self, channel: VoiceChannel) {
        let previous = self
            .inner
            .guilds
            .insert(channel.guild_id, channel.channel_id);

        if let Some(previous) = previous.filter(|id| *id != channel.channel_id) {
            info!(
                "🔀 La llamada de la guild {} pasa de {} a {}",
                channel.guild_id, previous, channel.channel_id
            );
            self.disconnect_and_cleanup(previous).await;
        }
    }

    fn new_slot(&self, channel: VoiceChannel) -> Slot {
        let (sink, stream) = mpsc::unbounded_channel();
        tokio::spawn(self.clone().pump_events(channel.channel_id, stream));
        Arc::new(Mutex::new(Some(ChannelPlayback::new(channel, sink))))
    }

    async fn lock_or_create(&self, channel: VoiceChannel) -> (Slot, SlotGuard) {
        loop {
            let slot = self
                .inner
                .channels
                .entry(channel.channel_id)
                .or_insert_with(|| self.new_slot(channel))
                .clone();

            let guard = slot.clone().lock_owned().await;
            if guard.is_some() {
                return (slot, guard);
            }
            // Se retiró mientras esperábamos el lock; va uno nuevo
        }
    }

    async fn lock_existing(&self, channel_id: ChannelId) -> Option<(Slot, SlotGuard)> {
        let slot = self.inner.channels.get(&channel_id)?.clone();
        let guard = slot.clone().lock_owned().await;
        guard.is_some().then_some((slot, guard))
    }

    /// Detiene el reproductor y destruye la conexión antes de retirar el
    /// slot, para que una reconexión del mismo canal espere al desmontaje.
    async fn teardown(&self, channel_id: ChannelId, slot: &Slot, guard: &mut SlotGuard) {
        if let Some(state) = guard.as_mut() {
            if let Some(mut player) = state.player.take() {
                player.stop().await;
            }
            if let Some(connection) = state.connection.take() {
                connection.destroy().await;
            }
            state.connection_status = ConnectionStatus::Destroyed;
        }

        if self.retire(channel_id, slot, guard).is_some() {
            info!("🧹 Estado del canal {} eliminado", channel_id);
        }
    }

    fn retire(
        &self,
        channel_id: ChannelId,
        slot: &Slot,
        guard: &mut SlotGuard,
    ) -> Option<ChannelPlayback> {
        let state = guard.take();
        if let Some(state) = &state {
            self.inner
                .guilds
                .remove_if(&state.channel().guild_id, |_, owner| *owner == channel_id);
        }
        let removed = self
            .inner
            .channels
            .remove_if(&channel_id, |_, current| Arc::ptr_eq(current, slot));
        if removed.is_none() && state.is_some() {
            error!("Slot de {} ya no estaba en el registro", channel_id);
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::testing::{eventually, FakeLink, FakeTransport},
        sources::MockMediaResolver,
    };
    use pretty_assertions::assert_eq;

    const C1: u64 = 101;
    const C2: u64 = 202;
    const SHARED_GUILD: u64 = 7;

    /// Cada canal en su propia guild
    fn channel(id: u64) -> VoiceChannel {
        VoiceChannel::new(id, id)
    }

    fn song(title: &str) -> Track {
        Track::new(title)
            .with_source_url(format!("https://cdn.example.com/{}.webm", title.replace(' ', "_")))
            .with_duration(Duration::from_secs(180))
    }

    fn engine_with(transport: Arc<FakeTransport>, config: EngineConfig) -> QueueEngine {
        QueueEngine::new(transport, Arc::new(MockMediaResolver::new()), config)
    }

    fn engine(transport: Arc<FakeTransport>) -> QueueEngine {
        engine_with(transport, EngineConfig::default())
    }

    fn link(transport: &FakeTransport, id: u64) -> Arc<FakeLink> {
        transport.link(ChannelId::new(id)).expect("link opened")
    }

    async fn current_title(engine: &QueueEngine, id: u64) -> Option<String> {
        engine
            .get_audio_queue(ChannelId::new(id))
            .await
            .current
            .map(|t| t.title().to_string())
    }

    async fn queued_titles(engine: &QueueEngine, id: u64) -> Vec<String> {
        engine.get_audio_queue(ChannelId::new(id)).await.titles()
    }

    /// Completa el track actual y espera a que el motor avance
    async fn complete_and_wait(engine: &QueueEngine, transport: &FakeTransport, id: u64) {
        let link = link(transport, id);
        let finished = link.complete().expect("something playing");
        eventually(|| async {
            let snapshot = engine.get_audio_queue(ChannelId::new(id)).await;
            snapshot.current.is_none() || link.active() != Some(finished) && link.active().is_some()
        })
        .await;
    }

    #[tokio::test]
    async fn plays_in_fifo_order_across_calls() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());

        engine
            .add_to_queue(channel(C1), vec![song("a"), song("b")])
            .await
            .unwrap();
        engine.add_to_queue(channel(C1), vec![song("c")]).await.unwrap();

        assert_eq!(current_title(&engine, C1).await, Some("a".to_string()));
        assert_eq!(queued_titles(&engine, C1).await, vec!["b", "c"]);

        complete_and_wait(&engine, &transport, C1).await;
        complete_and_wait(&engine, &transport, C1).await;

        assert_eq!(link(&transport, C1).played_titles(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn current_matches_player_activity() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());

        engine.add_to_queue(channel(C1), vec![song("a")]).await.unwrap();

        let link = link(&transport, C1);
        assert!(link.active().is_some());
        assert_eq!(current_title(&engine, C1).await, Some("a".to_string()));
        assert_eq!(link.played_titles().len(), 1);
    }

    #[tokio::test]
    async fn loop_re_enqueues_at_the_back() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());
        let c1 = ChannelId::new(C1);

        engine
            .add_to_queue(channel(C1), vec![song("a"), song("b"), song("c")])
            .await
            .unwrap();
        assert!(engine.toggle_loop(c1).await.unwrap());

        complete_and_wait(&engine, &transport, C1).await;

        assert_eq!(current_title(&engine, C1).await, Some("b".to_string()));
        assert_eq!(queued_titles(&engine, C1).await, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn empty_queue_tears_channel_down_once() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());
        let c1 = ChannelId::new(C1);

        engine.add_to_queue(channel(C1), vec![song("a")]).await.unwrap();
        let link = link(&transport, C1);
        link.complete();

        eventually(|| async { engine.active_channels().is_empty() }).await;

        assert!(engine.get_audio_queue(c1).await.is_empty());
        assert_eq!(engine.toggle_loop(c1).await, Err(EngineError::NotPlaying));
        assert_eq!(link.disconnects(), 1);

        engine.disconnect_and_cleanup(c1).await;
        assert_eq!(link.disconnects(), 1);
    }

    #[tokio::test]
    async fn skip_returns_next_title() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());
        let c1 = ChannelId::new(C1);

        engine
            .add_to_queue(channel(C1), vec![song("a"), song("b")])
            .await
            .unwrap();

        assert_eq!(engine.skip_current_song(c1).await, Ok(Some("b".to_string())));
        assert_eq!(current_title(&engine, C1).await, Some("b".to_string()));
        assert!(queued_titles(&engine, C1).await.is_empty());
        assert_eq!(link(&transport, C1).stops(), 1);

        // El eco del stop no debe avanzar otra vez
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(current_title(&engine, C1).await, Some("b".to_string()));
        assert_eq!(link(&transport, C1).played_titles(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn skip_last_track_tears_down() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());
        let c1 = ChannelId::new(C1);

        engine.add_to_queue(channel(C1), vec![song("a")]).await.unwrap();

        assert_eq!(engine.skip_current_song(c1).await, Ok(None));
        assert!(engine.active_channels().is_empty());
        assert_eq!(link(&transport, C1).disconnects(), 1);
    }

    #[tokio::test]
    async fn skip_on_unknown_channel_is_not_playing() {
        let engine = engine(FakeTransport::new());

        assert_eq!(
            engine.skip_current_song(ChannelId::new(C1)).await,
            Err(EngineError::NotPlaying)
        );
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());
        let c1 = ChannelId::new(C1);

        engine.disconnect_and_cleanup(c1).await;

        engine
            .add_to_queue(channel(C1), vec![song("a"), song("b")])
            .await
            .unwrap();
        engine.disconnect_and_cleanup(c1).await;
        engine.disconnect_and_cleanup(c1).await;

        let link = link(&transport, C1);
        assert_eq!(link.disconnects(), 1);
        assert!(engine.get_audio_queue(c1).await.is_empty());

        // Empieza de cero
        engine.add_to_queue(channel(C1), vec![song("c")]).await.unwrap();
        assert_eq!(transport.connects(), 2);
        assert_eq!(current_title(&engine, C1).await, Some("c".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn channels_are_isolated() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move {
                for title in ["x1", "x2", "x3"] {
                    engine.add_to_queue(channel(C1), vec![song(title)]).await.unwrap();
                }
                engine.toggle_loop(ChannelId::new(C1)).await.unwrap()
            })
        };
        let second = {
            let engine = engine.clone();
            tokio::spawn(async move {
                for title in ["y1", "y2"] {
                    engine.add_to_queue(channel(C2), vec![song(title)]).await.unwrap();
                }
                engine.skip_current_song(ChannelId::new(C2)).await.unwrap()
            })
        };

        assert!(first.await.unwrap());
        assert_eq!(second.await.unwrap(), Some("y2".to_string()));

        assert_eq!(current_title(&engine, C1).await, Some("x1".to_string()));
        assert_eq!(queued_titles(&engine, C1).await, vec!["x2", "x3"]);
        assert_eq!(current_title(&engine, C2).await, Some("y2".to_string()));
        assert!(queued_titles(&engine, C2).await.is_empty());

        engine.disconnect_and_cleanup(ChannelId::new(C2)).await;
        assert_eq!(current_title(&engine, C1).await, Some("x1".to_string()));
        assert_eq!(link(&transport, C1).disconnects(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_keep_every_track() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine
                        .add_to_queue(channel(C1), vec![song(&format!("t{i}"))])
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let snapshot = engine.get_audio_queue(ChannelId::new(C1)).await;
        assert!(snapshot.current.is_some());
        assert_eq!(snapshot.resources_metadatas.len(), 15);
        assert_eq!(transport.connects(), 1);
    }

    #[tokio::test]
    async fn connection_timeout_leaves_no_state() {
        let transport = FakeTransport::new();
        transport.hang_on_ready();
        let engine = engine_with(
            transport.clone(),
            EngineConfig {
                connection_timeout: Duration::from_millis(50),
                ..EngineConfig::default()
            },
        );

        let err = engine.add_to_queue(channel(C1), vec![song("a")]).await;

        assert_eq!(
            err,
            Err(EngineError::ConnectionTimeout(Duration::from_millis(50)))
        );
        assert_eq!(transport.releases(), 1);
        assert!(engine.active_channels().is_empty());
    }

    #[tokio::test]
    async fn refused_connection_leaves_no_state() {
        let transport = FakeTransport::new();
        transport.refuse_connections();
        let engine = engine(transport.clone());

        let err = engine.add_to_queue(channel(C1), vec![song("a")]).await;

        assert!(matches!(err, Err(EngineError::Connection(_))));
        assert!(engine.active_channels().is_empty());
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected() {
        let transport = FakeTransport::new();
        let engine = engine_with(
            transport.clone(),
            EngineConfig {
                max_queue_size: 2,
                ..EngineConfig::default()
            },
        );

        let err = engine
            .add_to_queue(channel(C1), vec![song("a"), song("b"), song("c"), song("d")])
            .await;

        assert_eq!(err, Err(EngineError::QueueFull { limit: 2 }));
        assert_eq!(transport.connects(), 0);
        assert!(engine.active_channels().is_empty());

        // Current + 2 pendientes sí entra
        engine
            .add_to_queue(channel(C1), vec![song("a"), song("b"), song("c")])
            .await
            .unwrap();
        assert_eq!(
            engine.add_to_queue(channel(C1), vec![song("d")]).await,
            Err(EngineError::QueueFull { limit: 2 })
        );
        assert_eq!(queued_titles(&engine, C1).await, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());

        engine.add_to_queue(channel(C1), Vec::<Track>::new()).await.unwrap();

        assert_eq!(transport.connects(), 0);
        assert!(engine.active_channels().is_empty());
    }

    #[tokio::test]
    async fn music_preempts_ambient_track() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());

        engine.add_to_queue(channel(C1), vec![Track::ambient()]).await.unwrap();
        assert!(engine
            .get_audio_queue(ChannelId::new(C1))
            .await
            .current
            .is_some_and(|t| t.is_ambient()));

        engine.add_to_queue(channel(C1), vec![song("a")]).await.unwrap();

        assert_eq!(current_title(&engine, C1).await, Some("a".to_string()));
        assert!(queued_titles(&engine, C1).await.is_empty());
        assert_eq!(link(&transport, C1).played_titles(), vec!["a"]);
    }

    #[tokio::test]
    async fn failed_playback_still_advances() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());

        engine
            .add_to_queue(channel(C1), vec![song("a"), song("b")])
            .await
            .unwrap();
        link(&transport, C1).fail("403 from upstream");

        eventually(|| async { current_title(&engine, C1).await.as_deref() == Some("b") }).await;
    }

    #[tokio::test]
    async fn unstartable_tracks_are_skipped() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());

        engine
            .add_to_queue(channel(C1), vec![Track::new("no source"), song("b")])
            .await
            .unwrap();

        assert_eq!(current_title(&engine, C1).await, Some("b".to_string()));

        link(&transport, C1).fail_plays();
        engine.add_to_queue(channel(C1), vec![song("c")]).await.unwrap();
        assert_eq!(engine.skip_current_song(ChannelId::new(C1)).await, Ok(None));
        assert!(engine.active_channels().is_empty());
    }

    #[tokio::test]
    async fn stale_events_are_ignored() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());

        engine
            .add_to_queue(channel(C1), vec![song("a"), song("b")])
            .await
            .unwrap();
        link(&transport, C1).emit(PlaybackId(9_999), PlaybackOutcome::Finished);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(current_title(&engine, C1).await, Some("a".to_string()));
    }

    #[tokio::test]
    async fn get_info_delegates_to_resolver() {
        let mut resolver = MockMediaResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|query| {
                Ok(TrackMetadata {
                    title: format!("{query} (Official Video)"),
                    playable_url: "https://cdn.example.com/song.webm".to_string(),
                    duration: Some(Duration::from_secs(200)),
                    display_url: None,
                    playlist_url: None,
                })
            });
        let engine = QueueEngine::new(
            FakeTransport::new(),
            Arc::new(resolver),
            EngineConfig::default(),
        );

        let meta = engine.get_info("never gonna").await.unwrap();

        assert_eq!(meta.title, "never gonna (Official Video)");
        assert!(engine.active_channels().is_empty());
    }

    #[tokio::test]
    async fn shutdown_releases_every_channel() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());

        engine.add_to_queue(channel(C1), vec![song("a")]).await.unwrap();
        engine.add_to_queue(channel(C2), vec![song("b")]).await.unwrap();

        engine.shutdown().await;

        assert!(engine.active_channels().is_empty());
        assert_eq!(link(&transport, C1).disconnects(), 1);
        assert_eq!(link(&transport, C2).disconnects(), 1);
    }

    #[tokio::test]
    async fn dropped_connection_restarts_current_track() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());
        let c1 = ChannelId::new(C1);

        engine.add_to_queue(channel(C1), vec![song("a")]).await.unwrap();
        let first = link(&transport, C1);
        assert_eq!(engine.connection_status(c1).await, Some(ConnectionStatus::Ready));

        first.drop_connection();
        assert_eq!(
            engine.connection_status(c1).await,
            Some(ConnectionStatus::Disconnected)
        );

        engine.add_to_queue(channel(C1), vec![song("b")]).await.unwrap();

        let second = link(&transport, C1);
        assert_eq!(transport.connects(), 2);
        assert_eq!(first.disconnects(), 1);
        assert!(second.active().is_some());
        assert_eq!(second.played_titles(), vec!["a"]);
        assert_eq!(current_title(&engine, C1).await, Some("a".to_string()));
        assert_eq!(queued_titles(&engine, C1).await, vec!["b"]);
        assert_eq!(engine.connection_status(c1).await, Some(ConnectionStatus::Ready));

        complete_and_wait(&engine, &transport, C1).await;
        assert_eq!(current_title(&engine, C1).await, Some("b".to_string()));
    }

    #[tokio::test]
    async fn reused_connection_keeps_playing() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());

        engine.add_to_queue(channel(C1), vec![song("a")]).await.unwrap();
        engine.add_to_queue(channel(C1), vec![song("b")]).await.unwrap();

        assert_eq!(transport.connects(), 1);
        assert_eq!(link(&transport, C1).played_titles(), vec!["a"]);
        assert_eq!(
            engine.connection_status(ChannelId::new(C1)).await,
            Some(ConnectionStatus::Ready)
        );
        assert_eq!(engine.connection_status(ChannelId::new(C2)).await, None);
    }

    #[tokio::test]
    async fn second_channel_takes_over_the_guild_call() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());
        let first = VoiceChannel::new(SHARED_GUILD, C1);
        let second = VoiceChannel::new(SHARED_GUILD, C2);

        engine.add_to_queue(first, vec![song("a")]).await.unwrap();
        engine.add_to_queue(second, vec![song("b")]).await.unwrap();

        assert_eq!(engine.active_channels(), vec![ChannelId::new(C2)]);
        assert_eq!(link(&transport, C1).disconnects(), 1);
        assert!(engine.get_audio_queue(ChannelId::new(C1)).await.is_empty());
        assert_eq!(current_title(&engine, C2).await, Some("b".to_string()));

        // Y de vuelta
        engine.add_to_queue(first, vec![song("c")]).await.unwrap();

        assert_eq!(engine.active_channels(), vec![ChannelId::new(C1)]);
        assert_eq!(link(&transport, C2).disconnects(), 1);
        assert_eq!(current_title(&engine, C1).await, Some("c".to_string()));
    }

    #[tokio::test]
    async fn rejected_batch_keeps_the_guild_owner() {
        let transport = FakeTransport::new();
        let engine = engine_with(
            transport.clone(),
            EngineConfig {
                max_queue_size: 1,
                ..EngineConfig::default()
            },
        );

        engine
            .add_to_queue(VoiceChannel::new(SHARED_GUILD, C1), vec![song("a")])
            .await
            .unwrap();
        let err = engine
            .add_to_queue(
                VoiceChannel::new(SHARED_GUILD, C2),
                vec![song("b"), song("c"), song("d")],
            )
            .await;

        assert_eq!(err, Err(EngineError::QueueFull { limit: 1 }));
        assert_eq!(engine.active_channels(), vec![ChannelId::new(C1)]);
        assert_eq!(link(&transport, C1).disconnects(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_in_one_guild_leave_one_owner() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());

        let tasks: Vec<_> = (0..12u64)
            .map(|i| {
                let engine = engine.clone();
                let target = if i % 2 == 0 { C1 } else { C2 };
                tokio::spawn(async move {
                    engine
                        .add_to_queue(
                            VoiceChannel::new(SHARED_GUILD, target),
                            vec![song(&format!("t{i}"))],
                        )
                        .await
                })
            })
            .collect();

        let finished = tokio::time::timeout(Duration::from_secs(5), futures::future::join_all(tasks))
            .await
            .expect("adds in one guild must not deadlock");
        for result in finished {
            result.unwrap().unwrap();
        }

        assert_eq!(engine.active_channels().len(), 1);
    }

    #[tokio::test]
    async fn end_to_end_loop_and_skip() {
        let transport = FakeTransport::new();
        let engine = engine(transport.clone());
        let c1 = ChannelId::new(C1);

        engine.add_to_queue(channel(C1), vec![song("Song A")]).await.unwrap();
        assert_eq!(current_title(&engine, C1).await, Some("Song A".to_string()));
        assert!(queued_titles(&engine, C1).await.is_empty());

        engine
            .add_to_queue(channel(C1), vec![Track::new("Song B").with_source_url("https://cdn.example.com/b.webm")])
            .await
            .unwrap();
        assert_eq!(current_title(&engine, C1).await, Some("Song A".to_string()));
        assert_eq!(queued_titles(&engine, C1).await, vec!["Song B"]);

        assert_eq!(engine.toggle_loop(c1).await, Ok(true));

        complete_and_wait(&engine, &transport, C1).await;
        assert_eq!(current_title(&engine, C1).await, Some("Song B".to_string()));
        assert_eq!(queued_titles(&engine, C1).await, vec!["Song A"]);

        assert_eq!(engine.skip_current_song(c1).await, Ok(Some("Song A".to_string())));
        assert_eq!(current_title(&engine, C1).await, Some("Song A".to_string()));
        assert_eq!(queued_titles(&engine, C1).await, vec!["Song B"]);
    }
}
