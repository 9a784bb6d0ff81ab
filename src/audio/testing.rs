//! In-memory voice transport used by the unit tests.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::ChannelId;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    audio::{
        connection::{VoiceChannel, VoiceLink, VoiceTransport},
        player::{EventSink, PlayRequest, PlaybackId, PlaybackOutcome, PlayerEvent},
    },
    error::TransportError,
};

pub struct FakeTransport {
    links: DashMap<ChannelId, Arc<FakeLink>>,
    connects: AtomicUsize,
    releases: AtomicUsize,
    refuse: AtomicBool,
    never_ready: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            links: DashMap::new(),
            connects: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
            never_ready: AtomicBool::new(false),
        })
    }

    pub fn refuse_connections(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn hang_on_ready(&self) {
        self.never_ready.store(true, Ordering::SeqCst);
    }

    /// Último enlace abierto para el canal
    pub fn link(&self, channel_id: ChannelId) -> Option<Arc<FakeLink>> {
        self.links.get(&channel_id).map(|link| link.clone())
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(&self, channel: VoiceChannel) -> Result<Arc<dyn VoiceLink>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Refused("missing Connect permission".to_string()));
        }

        let link = FakeLink::new(!self.never_ready.load(Ordering::SeqCst));
        self.links.insert(channel.channel_id, link.clone());
        Ok(link)
    }

    async fn release(&self, _channel: VoiceChannel) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeLink {
    ready: bool,
    connected: AtomicBool,
    sink: Mutex<Option<EventSink>>,
    subscriptions: AtomicUsize,
    requests: Mutex<Vec<PlayRequest>>,
    active: Mutex<Option<PlaybackId>>,
    fail_plays: AtomicBool,
    stops: AtomicUsize,
    disconnects: AtomicUsize,
}

impl FakeLink {
    pub fn new(ready: bool) -> Arc<Self> {
        Arc::new(Self {
            ready,
            connected: AtomicBool::new(false),
            sink: Mutex::new(None),
            subscriptions: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            active: Mutex::new(None),
            fail_plays: AtomicBool::new(false),
            stops: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        })
    }

    /// Simula el fin natural del track que está sonando
    pub fn complete(&self) -> Option<PlaybackId> {
        let playback = self.active.lock().take()?;
        self.emit(playback, PlaybackOutcome::Finished);
        Some(playback)
    }

    /// Simula un error de stream en el track que está sonando
    pub fn fail(&self, reason: &str) -> Option<PlaybackId> {
        let playback = self.active.lock().take()?;
        self.emit(playback, PlaybackOutcome::Failed(reason.to_string()));
        Some(playback)
    }

    /// Envía un evento arbitrario, p. ej. uno obsoleto
    pub fn emit(&self, playback: PlaybackId, outcome: PlaybackOutcome) {
        if let Some(sink) = self.sink.lock().as_ref() {
            let _ = sink.send(PlayerEvent { playback, outcome });
        }
    }

    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn fail_plays(&self) {
        self.fail_plays.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<PlayRequest> {
        self.requests.lock().clone()
    }

    pub fn played_titles(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.title.clone()).collect()
    }

    pub fn active(&self) -> Option<PlaybackId> {
        *self.active.lock()
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceLink for FakeLink {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn wait_ready(&self) -> Result<(), TransportError> {
        if !self.ready {
            std::future::pending::<()>().await;
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, sink: EventSink) {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock() = Some(sink);
    }

    async fn play(&self, request: PlayRequest) -> Result<(), TransportError> {
        if self.fail_plays.load(Ordering::SeqCst) {
            return Err(TransportError::Input("decoder exploded".to_string()));
        }

        let previous = self.active.lock().replace(request.playback);
        if let Some(previous) = previous {
            self.emit(previous, PlaybackOutcome::Finished);
        }
        self.requests.lock().push(request);
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        let stopped = self.active.lock().take();
        if let Some(playback) = stopped {
            self.emit(playback, PlaybackOutcome::Finished);
        }
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.active.lock().take();
        self.sink.lock().take();
    }
}

/// Reintenta `check` hasta que devuelva `true` o pasen dos segundos
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}
