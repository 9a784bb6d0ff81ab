//! Discord embeds for command replies.

pub mod embeds;
