use std::{path::PathBuf, time::Duration};

use crate::sources::TrackMetadata;

/// Título del track silencioso que mantiene la conexión abierta
pub const AMBIENT_TITLE: &str = "Hanging out";

/// Título del sonido de despedida
pub const FAREWELL_TITLE: &str = "Farewell";

/// De dónde sale el audio de un track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSource {
    /// No se envía audio; la llamada queda abierta en silencio
    Silence,
    Remote(String),
    Local(PathBuf),
}

/// Descripción inmutable de un elemento reproducible.
///
/// Se arma con los métodos `with_*` y a partir de ahí no cambia: el motor
/// solo mueve `Arc<Track>` entre `current` y la cola.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    title: String,
    source_url: Option<String>,
    duration: Option<Duration>,
    playlist_url: Option<String>,
    video_url: Option<String>,
    is_local_stream: bool,
    is_ambient: bool,
    is_farewell_chime: bool,
}

impl Track {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source_url: None,
            duration: None,
            playlist_url: None,
            video_url: None,
            is_local_stream: false,
            is_ambient: false,
            is_farewell_chime: false,
        }
    }

    /// Track de relleno sin fuente ni duración
    pub fn ambient() -> Self {
        Self {
            is_ambient: true,
            ..Self::new(AMBIENT_TITLE)
        }
    }

    /// Archivo local reproducido como stream
    pub fn local(title: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            source_url: Some(path.into().to_string_lossy().into_owned()),
            is_local_stream: true,
            ..Self::new(title)
        }
    }

    /// Sonido fijo de despedida
    pub fn farewell_chime(path: impl Into<PathBuf>) -> Self {
        Self {
            is_farewell_chime: true,
            ..Self::local(FAREWELL_TITLE, path)
        }
    }

    // Setters

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_playlist_url(mut self, url: impl Into<String>) -> Self {
        self.playlist_url = Some(url.into());
        self
    }

    pub fn with_video_url(mut self, url: impl Into<String>) -> Self {
        self.video_url = Some(url.into());
        self
    }

    // Getters

    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }
    /// `None` si la duración es desconocida o ilimitada (ambient)
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn playlist_url(&self) -> Option<&str> {
        self.playlist_url.as_deref()
    }
    pub fn video_url(&self) -> Option<&str> {
        self.video_url.as_deref()
    }
    pub fn is_local_stream(&self) -> bool {
        self.is_local_stream
    }
    pub fn is_ambient(&self) -> bool {
        self.is_ambient
    }
    pub fn is_farewell_chime(&self) -> bool {
        self.is_farewell_chime
    }

    /// Fuente de audio a reproducir, o `None` si el track no es reproducible
    pub fn source(&self) -> Option<PlaybackSource> {
        if self.is_ambient {
            return Some(PlaybackSource::Silence);
        }

        let url = self.source_url.as_ref()?;
        if self.is_local_stream || self.is_farewell_chime {
            Some(PlaybackSource::Local(PathBuf::from(url)))
        } else {
            Some(PlaybackSource::Remote(url.clone()))
        }
    }
}

impl From<TrackMetadata> for Track {
    fn from(meta: TrackMetadata) -> Self {
        let mut track = Track::new(meta.title).with_source_url(meta.playable_url);

        if let Some(duration) = meta.duration {
            track = track.with_duration(duration);
        }

        if let Some(display_url) = meta.display_url {
            track = track.with_video_url(display_url);
        }

        if let Some(playlist_url) = meta.playlist_url {
            track = track.with_playlist_url(playlist_url);
        }

        track
    }
}
