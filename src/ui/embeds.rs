use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{state::QueueSnapshot, track::Track};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Channel Jukebox";

/// Canciones listadas en el embed de la cola
const QUEUE_PREVIEW: usize = 10;

fn duration_label(track: &Track) -> String {
    match track.duration() {
        Some(duration) => format_duration(duration),
        None if track.is_ambient() => "♾️".to_string(),
        None => "🔴 En vivo".to_string(),
    }
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(track: &Track, starts_now: bool) -> CreateEmbed {
    let (title, footer) = if starts_now {
        ("🎵 Reproduciendo Ahora", STANDARD_FOOTER)
    } else {
        (
            "✅ Canción Agregada Exitosamente",
            "🎵 Se reproducirá automáticamente cuando termine la actual",
        )
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", track.title()))
        .color(if starts_now {
            colors::MUSIC_PURPLE
        } else {
            colors::SUCCESS_GREEN
        })
        .field("⏱️ Duración", duration_label(track), true);

    if let Some(url) = track.video_url() {
        embed = embed.url(url);
    }

    if let Some(playlist) = track.playlist_url() {
        embed = embed.field("📜 Playlist", format!("[Ver playlist]({playlist})"), true);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(footer))
}

/// Embed de la cola: el actual, los próximos y el total
pub fn create_queue_embed(snapshot: &QueueSnapshot) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now());

    if snapshot.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY);
    }

    let mut embed = embed;

    if let Some(current) = &snapshot.current {
        embed = embed.field(
            "▶️ Reproduciendo",
            format!("**{}** `[{}]`", current.title(), duration_label(current)),
            false,
        );
    }

    let upcoming = &snapshot.resources_metadatas;
    if !upcoming.is_empty() {
        let mut description = String::new();

        for (i, item) in upcoming.iter().take(QUEUE_PREVIEW).enumerate() {
            description.push_str(&format!(
                "**{}**. {} `[{}]`\n",
                i + 1,
                item.title(),
                duration_label(item)
            ));
        }

        if upcoming.len() > QUEUE_PREVIEW {
            description.push_str(&format!("… y {} más", upcoming.len() - QUEUE_PREVIEW));
        }

        embed = embed.field("Próximas canciones", description, false);
    }

    let total: Duration = upcoming.iter().filter_map(|track| track.duration()).sum();
    let mut info = format!("**Total:** {} en cola", upcoming.len());
    if total > Duration::ZERO {
        info.push_str(&format!(" • **Duración:** {}", format_duration(total)));
    }

    embed.field("Información", info, false)
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
