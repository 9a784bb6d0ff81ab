use std::time::Duration;
use thiserror::Error;

/// Errores que el motor de colas devuelve a quien lo llama.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// El transporte no quedó listo dentro del tiempo permitido
    #[error("Voice connection was not ready after {0:?}")]
    ConnectionTimeout(Duration),

    /// El transporte rechazó la conexión
    #[error("Voice connection failed: {0}")]
    Connection(String),

    /// El resolvedor no encontró nada o falló aguas arriba
    #[error("Could not resolve media: {0}")]
    Resolution(String),

    /// Operación sobre un canal sin estado de reproducción
    #[error("Nothing is playing in this channel")]
    NotPlaying,

    #[error("Queue is full (limit {limit} tracks)")]
    QueueFull { limit: usize },
}

/// Fallos del adaptador de voz (songbird o el fake de tests).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("transport refused the connection: {0}")]
    Refused(String),

    #[error("voice link is closed")]
    Closed,

    #[error("track '{0}' has no playable source")]
    Unplayable(String),

    #[error("could not build audio input: {0}")]
    Input(String),
}

impl From<TransportError> for EngineError {
    fn from(err: TransportError) -> Self {
        EngineError::Connection(err.to_string())
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
