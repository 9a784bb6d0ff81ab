use anyhow::Context;
use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{sync::LazyLock, time::Duration};
use tokio::{sync::Semaphore, time::timeout};
use tracing::{debug, error, info};

use super::{MediaResolver, TrackMetadata};
use crate::error::{EngineError, EngineResult};

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?v=|embed/|v/|shorts/)|youtu\.be/|music\.youtube\.com/)",
    )
    .unwrap_or_else(|e| panic!("invalid YouTube pattern: {e}"))
});

/// Lookups concurrentes contra yt-dlp
const MAX_CONCURRENT_LOOKUPS: usize = 3;

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: String,
    duration: Option<f64>,
    webpage_url: Option<String>,
    /// URL directa del stream; solo viene para fuentes que no son YouTube
    url: Option<String>,
    is_live: Option<bool>,
}

/// Resolvedor que consulta `yt-dlp --dump-json`
pub struct YtDlpResolver {
    binary: String,
    rate_limiter: Semaphore,
    lookup_timeout: Duration,
}

impl YtDlpResolver {
    pub fn new(lookup_timeout: Duration) -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            rate_limiter: Semaphore::new(MAX_CONCURRENT_LOOKUPS),
            lookup_timeout,
        }
    }

    /// Usa otro ejecutable (p. ej. una ruta absoluta)
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Verifica que yt-dlp esté disponible
    pub async fn verify(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("No se pudo ejecutar {}", self.binary))?;

        if !output.status.success() {
            error!("❌ yt-dlp no encontrado. Instala con: pip install yt-dlp");
            anyhow::bail!("{} --version falló", self.binary);
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("✅ yt-dlp versión: {}", version);
        Ok(version)
    }

    pub fn is_youtube_url(url: &str) -> bool {
        YOUTUBE_URL.is_match(url)
    }

    pub fn is_url(query: &str) -> bool {
        url::Url::parse(query)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false)
    }

    /// Argumento para yt-dlp: las búsquedas llevan el prefijo `ytsearch1:`
    fn target(query: &str) -> String {
        let query = query.trim();
        if Self::is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{query}")
        }
    }

    async fn dump_json(&self, target: &str) -> anyhow::Result<String> {
        let output = Command::new(&self.binary)
            .args([
                "--dump-json",
                "--no-playlist",
                "--skip-download",
                "--no-warnings",
                target,
            ])
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Toma la primera línea JSON de la salida de yt-dlp
fn parse_output(query: &str, stdout: &str) -> EngineResult<TrackMetadata> {
    let line = stdout
        .lines()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| EngineError::Resolution(format!("no results for '{query}'")))?;

    let info: YtDlpInfo = serde_json::from_str(line)
        .map_err(|e| EngineError::Resolution(format!("invalid yt-dlp output: {e}")))?;

    let display_url = info.webpage_url.clone();
    let playable_url = match info.webpage_url {
        Some(page) if YtDlpResolver::is_youtube_url(&page) => page,
        page => info
            .url
            .or(page)
            .ok_or_else(|| EngineError::Resolution(format!("'{}' has no playable url", info.title)))?,
    };

    let duration = match info.is_live {
        Some(true) => None,
        _ => info
            .duration
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64),
    };

    Ok(TrackMetadata {
        title: info.title,
        playable_url,
        duration,
        display_url,
        playlist_url: playlist_link(query),
    })
}

/// Enlace a la playlist si la consulta es un video de YouTube con `list=`.
/// Con `--no-playlist` solo se resuelve el video, pero se conserva el origen.
fn playlist_link(query: &str) -> Option<String> {
    let query = query.trim();
    if !YtDlpResolver::is_youtube_url(query) {
        return None;
    }

    let url = url::Url::parse(query).ok()?;
    let list = url
        .query_pairs()
        .find(|(key, value)| key == "list" && !value.is_empty())
        .map(|(_, value)| value.into_owned())?;

    let mut playlist = url::Url::parse("https://www.youtube.com/playlist").ok()?;
    playlist.query_pairs_mut().append_pair("list", &list);
    Some(playlist.into())
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> EngineResult<TrackMetadata> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| EngineError::Resolution(e.to_string()))?;

        let target = Self::target(query);
        debug!("📊 Obteniendo info de: {}", target);

        let stdout = match timeout(self.lookup_timeout, self.dump_json(&target)).await {
            Ok(Ok(stdout)) => stdout,
            Ok(Err(e)) => return Err(EngineError::Resolution(format!("{e:#}"))),
            Err(_) => {
                return Err(EngineError::Resolution(format!(
                    "yt-dlp did not answer within {}",
                    humantime::format_duration(self.lookup_timeout)
                )))
            }
        };

        let metadata = parse_output(query, &stdout)?;
        info!("✅ Resuelto '{}' → {}", query, metadata.title);
        Ok(metadata)
    }
}
