pub mod chat;
pub mod events;
pub mod log_entry;

pub use chat::{ChatMessage, ContentPart, MessageContent};
pub use events::{
    Attachment, Author, ChannelInfo, CommandInvocation, DeliveryMode, InboundMessage, Mention,
    OutboundMessage, ReplyTarget,
};
pub use log_entry::{ChannelId, CommunityId, CommunityState, LogEntry, UserId};
