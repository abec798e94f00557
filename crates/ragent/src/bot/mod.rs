//! Command and message handlers
//!
//! Every entry point funnels its `Result<_, BotError>` through
//! [`Bot::settle`], the only place failures become user-visible replies.

mod commands;
mod messages;
pub mod replies;

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{BotConfig, Settings};
use crate::logging::{ActivityLog, ActivityLogger, ActivityType};
use crate::models::{ChannelId, CommunityId, LogEntry, ReplyTarget, UserId};
use crate::services::commands::CommandRegistry;
use crate::services::context_assembler::ContextAssembler;
use crate::services::dispatcher::{ChatTransport, ReplyDispatcher};
use crate::services::image_ingestor::ImageIngestor;
use crate::services::llm_service::LlmProvider;
use crate::services::recall_index::{RecallIndex, RecallRecord};
use crate::store::ConversationStore;
use crate::utils::error::{BotError, Surface};

/// Collaborators injected into the bot
pub struct BotDeps {
    pub store: Arc<dyn ConversationStore>,
    pub recall: Arc<dyn RecallIndex>,
    pub llm: Arc<dyn LlmProvider>,
    pub images: Arc<ImageIngestor>,
    pub registry: Arc<dyn CommandRegistry>,
    pub activity: ActivityLogger,
}

pub struct Bot {
    config: BotConfig,
    rag_system_prompt: String,
    last_n: usize,
    store: Arc<dyn ConversationStore>,
    recall: Arc<dyn RecallIndex>,
    llm: Arc<dyn LlmProvider>,
    images: Arc<ImageIngestor>,
    registry: Arc<dyn CommandRegistry>,
    assembler: ContextAssembler,
    dispatcher: ReplyDispatcher,
    activity: ActivityLogger,
}

/// Who and where, for journaling a settled outcome
struct Origin<'a> {
    community_id: CommunityId,
    channel_id: ChannelId,
    user_id: UserId,
    command: Option<&'a str>,
}

impl Bot {
    pub fn new(settings: &Settings, deps: BotDeps) -> Self {
        Self {
            config: settings.bot.clone(),
            rag_system_prompt: settings.prompts.rag_system_prompt.clone(),
            last_n: settings.context.last_n_messages,
            assembler: ContextAssembler::new(deps.store.clone(), settings),
            dispatcher: ReplyDispatcher::new(settings.transport.max_message_chars),
            store: deps.store,
            recall: deps.recall,
            llm: deps.llm,
            images: deps.images,
            registry: deps.registry,
            activity: deps.activity,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<dyn CommandRegistry> {
        &self.registry
    }

    /// Re-embed every remembered entry so recall covers state loaded from
    /// snapshots. Returns the number of entries handed to the index.
    pub async fn restore_recall(&self) -> usize {
        let mut restored = 0;
        for community_id in self.store.communities() {
            let entries = self.store.list(community_id, None);
            restored += entries.len();
            self.index(community_id, &entries).await;
        }
        info!("Recall restored from {} remembered entries", restored);
        restored
    }

    /// Drop everything remembered about a guild: local state first, then the
    /// recall index. Both are attempted; only the local failure is reported.
    pub async fn forget_community(&self, community_id: CommunityId) -> Result<(), BotError> {
        let local = self.store.clear(community_id);

        if let Err(e) = self.recall.delete_community(community_id).await {
            warn!("Recall cleanup for guild {} failed: {:#}", community_id, e);
            self.activity.log(
                ActivityLog::builder(community_id, 0, ActivityType::RecallError)
                    .error(format!("{:#}", e), "recall_delete")
                    .build(),
            );
        }

        local?;
        self.activity.log(
            ActivityLog::builder(community_id, 0, ActivityType::CommunityForgotten).build(),
        );
        Ok(())
    }

    /// Append to the log, then index. Indexing failures are logged and skipped;
    /// the log stays authoritative.
    async fn remember(
        &self,
        community_id: CommunityId,
        entries: Vec<LogEntry>,
    ) -> Result<(), BotError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.store.append_all(community_id, entries.clone())?;
        self.index(community_id, &entries).await;
        Ok(())
    }

    async fn index(&self, community_id: CommunityId, entries: &[LogEntry]) {
        let records = entries
            .iter()
            .map(|entry| RecallRecord::from_entry(community_id, entry))
            .collect();

        if let Err(e) = self.recall.index(records).await {
            warn!(
                "Indexing {} entries for guild {} failed: {:#}",
                entries.len(),
                community_id,
                e
            );
            self.activity.log(
                ActivityLog::builder(community_id, 0, ActivityType::RecallError)
                    .error(format!("{:#}", e), "recall_index")
                    .build(),
            );
        }
    }

    async fn say(
        &self,
        transport: &dyn ChatTransport,
        target: &ReplyTarget,
        text: &str,
    ) -> Result<usize, BotError> {
        self.dispatcher
            .send(transport, target, text)
            .await
            .map_err(BotError::Transport)
    }

    /// Turn the outcome of a handler into what the user sees
    async fn settle(
        &self,
        outcome: Result<(), BotError>,
        surface: Surface,
        origin: Origin<'_>,
        transport: &dyn ChatTransport,
        target: &ReplyTarget,
    ) {
        let err = match outcome {
            Ok(()) => return,
            Err(err) => err,
        };

        let mut log = ActivityLog::builder(origin.community_id, origin.user_id, activity_type_of(&err))
            .channel(origin.channel_id);
        if let Some(name) = origin.command {
            log = log.command(name);
        }

        if err.is_precondition() {
            debug!("Refused in guild {}: {}", origin.community_id, err);
            log = log.message(err.to_string());
        } else {
            error!(
                "Handler failed in guild {} channel {}: {:#}",
                origin.community_id, origin.channel_id, err
            );
            log = log.error(format!("{:#}", err), activity_type_of(&err).as_str());
        }
        self.activity.log(log.build());

        if let Err(e) = self.dispatcher.send(transport, target, err.reply_text(surface)).await {
            error!("Failed to deliver error reply: {:#}", e);
        }
    }
}

fn activity_type_of(err: &BotError) -> ActivityType {
    match err {
        BotError::NotListening | BotError::EmptyInput | BotError::EmptyKnowledgeBase => {
            ActivityType::PreconditionRefused
        }
        BotError::Store(_) => ActivityType::StoreError,
        BotError::Llm(_) => ActivityType::LlmError,
        BotError::Recall(_) => ActivityType::RecallError,
        BotError::Transport(_) => ActivityType::TransportError,
        BotError::Internal(_) => ActivityType::InternalError,
    }
}
