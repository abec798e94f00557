use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::bot::Bot;
use crate::models::{ChannelId, CommandInvocation, CommunityId, InboundMessage, OutboundMessage};
use crate::services::commands::PublishedCatalog;
use crate::services::dispatcher::RecordingTransport;
use crate::utils::error::ApiError;

/// Messages the platform adapter must deliver, in order
#[derive(Debug, Serialize, Deserialize)]
pub struct RepliesResponse {
    pub replies: Vec<OutboundMessage>,
}

pub async fn message_event(
    State(bot): State<Arc<Bot>>,
    payload: Result<Json<InboundMessage>, JsonRejection>,
) -> Result<Json<RepliesResponse>, ApiError> {
    let Json(message) = payload?;
    debug!("Message {} in guild {}", message.id, message.community_id);

    let transport = RecordingTransport::new();
    bot.on_message(message, &transport).await;

    Ok(Json(RepliesResponse {
        replies: transport.into_messages(),
    }))
}

pub async fn command_event(
    State(bot): State<Arc<Bot>>,
    payload: Result<Json<CommandInvocation>, JsonRejection>,
) -> Result<Json<RepliesResponse>, ApiError> {
    let Json(invocation) = payload?;

    let transport = RecordingTransport::new();
    bot.on_command(invocation, &transport).await;

    Ok(Json(RepliesResponse {
        replies: transport.into_messages(),
    }))
}

pub async fn list_commands(State(bot): State<Arc<Bot>>) -> Json<PublishedCatalog> {
    Json(bot.registry().published())
}

#[derive(Debug, Deserialize)]
pub struct TranscriptQuery {
    pub channel_id: Option<ChannelId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptResponse {
    pub community_id: CommunityId,
    pub channel_id: Option<ChannelId>,
    pub lines: Vec<String>,
}

pub async fn transcript(
    State(bot): State<Arc<Bot>>,
    Path(community_id): Path<CommunityId>,
    Query(query): Query<TranscriptQuery>,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let store = bot.store();
    if store.list(community_id, None).is_empty() {
        return Err(ApiError::NotFound(format!(
            "Nothing remembered for guild {}",
            community_id
        )));
    }

    Ok(Json(TranscriptResponse {
        community_id,
        channel_id: query.channel_id,
        lines: store.transcript(community_id, query.channel_id),
    }))
}
