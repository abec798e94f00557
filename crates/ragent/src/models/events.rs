use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::log_entry::{ChannelId, CommunityId, UserId};

/// Discord epoch (2015-01-01T00:00:00Z) in milliseconds
const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

// ===== INBOUND EVENTS =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.starts_with("image"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    #[serde(default)]
    pub is_thread: bool,
}

/// A message posted in a guild channel, as forwarded by the platform adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: u64,
    pub community_id: CommunityId,
    pub channel: ChannelInfo,
    pub author: Author,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub mentions: Vec<Mention>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Replace raw `<@id>` / `<@!id>` mention tokens with `@name`
    pub fn resolve_mentions(&mut self) {
        for user in &self.mentions {
            let handle = format!("@{}", user.name);
            self.content = self
                .content
                .replace(&format!("<@{}>", user.id), &handle)
                .replace(&format!("<@!{}>", user.id), &handle);
        }
    }

    pub fn mentions_user(&self, user_id: UserId) -> bool {
        self.mentions.iter().any(|m| m.id == user_id)
    }

    pub fn image_urls(&self) -> Vec<String> {
        self.attachments
            .iter()
            .filter(|a| a.is_image())
            .map(|a| a.url.clone())
            .collect()
    }
}

/// A slash/prefix command invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInvocation {
    pub name: String,
    pub community_id: CommunityId,
    pub channel: ChannelInfo,
    pub invoker: Author,
    #[serde(default)]
    pub argument: Option<String>,
    /// Interaction snowflake, present for slash commands
    #[serde(default)]
    pub interaction_id: Option<u64>,
    /// Token used for deferred follow-up responses
    #[serde(default)]
    pub interaction_token: Option<String>,
}

impl CommandInvocation {
    /// When the command was issued, recovered from the interaction snowflake
    pub fn invoked_at(&self) -> DateTime<Utc> {
        self.interaction_id
            .and_then(snowflake_timestamp)
            .unwrap_or_else(Utc::now)
    }

    /// Slash commands answer through the interaction, prefix commands in-channel
    pub fn reply_target(&self) -> ReplyTarget {
        let mode = match &self.interaction_token {
            Some(token) => DeliveryMode::FollowUp {
                interaction_token: token.clone(),
            },
            None => DeliveryMode::ChannelPost,
        };
        ReplyTarget {
            channel_id: self.channel.id,
            mode,
        }
    }
}

/// Creation time encoded in a Discord snowflake
pub fn snowflake_timestamp(id: u64) -> Option<DateTime<Utc>> {
    let millis = (id >> 22) + DISCORD_EPOCH_MS;
    Utc.timestamp_millis_opt(i64::try_from(millis).ok()?).single()
}

// ===== OUTBOUND =====

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Plain message in the channel
    ChannelPost,
    /// Reply referencing an inbound message
    Reply { message_id: u64 },
    /// Follow-up of a deferred interaction response
    FollowUp { interaction_token: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTarget {
    pub channel_id: ChannelId,
    pub mode: DeliveryMode,
}

impl ReplyTarget {
    pub fn reply_to(message: &InboundMessage) -> Self {
        Self {
            channel_id: message.channel.id,
            mode: DeliveryMode::Reply {
                message_id: message.id,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel_id: ChannelId,
    pub mode: DeliveryMode,
    pub content: String,
}
