use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::events::ChannelInfo;

/// Discord guild snowflake
pub type CommunityId = u64;
pub type ChannelId = u64;
pub type UserId = u64;

/// Max characters of the channel name kept in `display_text`
const CHANNEL_LABEL_CHARS: usize = 15;

/// One remembered utterance (text or image) of a guild conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub is_in_thread: bool,
    #[serde(default)]
    pub is_image: bool,
    pub posted_at: DateTime<Utc>,
    /// Display identity, not an authentication identity
    pub author: String,
    pub channel_id: ChannelId,
    /// Human readable rendering used for transcript export
    pub display_text: String,
    /// Raw text, or `data:image/<ext>;base64,<bytes>` for images
    pub payload: String,
}

impl LogEntry {
    /// Text entry; `display_text` is rendered as
    /// `[MM-DD-YYYY HH:MM:SS] - @author on #[channel]: `text``
    pub fn text(
        posted_at: DateTime<Utc>,
        author: impl Into<String>,
        channel: &ChannelInfo,
        content: impl Into<String>,
    ) -> Self {
        let author = author.into();
        let payload = content.into();
        let display_text = format!(
            "[{}] - @{} on #[{}]: `{}`",
            posted_at.format("%m-%d-%Y %H:%M:%S"),
            author,
            channel_label(&channel.name),
            payload
        );

        Self {
            is_in_thread: channel.is_thread,
            is_image: false,
            posted_at,
            author,
            channel_id: channel.id,
            display_text,
            payload,
        }
    }

    /// Image entry; `source` is the local cache path the image was read from
    pub fn image(
        posted_at: DateTime<Utc>,
        author: impl Into<String>,
        channel: &ChannelInfo,
        source: impl Into<String>,
        data_uri: impl Into<String>,
    ) -> Self {
        Self {
            is_in_thread: channel.is_thread,
            is_image: true,
            posted_at,
            author: author.into(),
            channel_id: channel.id,
            display_text: source.into(),
            payload: data_uri.into(),
        }
    }

    /// Whether this entry was produced by the bot's own status replies
    pub fn is_system_notice(&self, system_prefix: &str) -> bool {
        !self.is_image && self.payload.starts_with(system_prefix)
    }
}

fn channel_label(name: &str) -> String {
    name.chars().take(CHANNEL_LABEL_CHARS).collect()
}

/// Per-guild state: listening flag plus the append-only log
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommunityState {
    pub listening: bool,
    pub log: Vec<LogEntry>,
}
