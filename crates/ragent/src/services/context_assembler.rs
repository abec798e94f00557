//! Prompt context for the rag and mention paths
//!
//! Short-term memory is the tail of the channel log; long-term memory comes
//! from the recall index, restricted by a [`RecallFilter`] and re-ranked by a
//! [`RecencyPolicy`]. The assembler only reads the store.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::sync::Arc;
use tracing::debug;

use super::recall_index::{RecallFilter, RecallHit, RecallRequest, RecencyPolicy};
use crate::config::Settings;
use crate::models::{ChannelId, ChatMessage, CommunityId, LogEntry};
use crate::store::ConversationStore;
use crate::utils::error::BotError;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([A-Z_]+)\}\}").expect("placeholder pattern"));

/// Everything needed to render the rag prompt once recall has answered
#[derive(Debug, Clone)]
pub struct PromptContext {
    /// Short-term buffer payloads, oldest first
    pub replies: Vec<String>,
    pub user_asking: String,
    pub bot_name: String,
    pub query: String,
    template: String,
    max_context_chars: usize,
}

impl PromptContext {
    /// Buffer plus the query itself
    pub fn embedding_seeds(&self) -> Vec<String> {
        let mut seeds = self.replies.clone();
        seeds.push(self.query.clone());
        seeds
    }

    /// Fill the template in one pass so substituted text is never re-expanded
    pub fn render(&self, hits: &[RecallHit]) -> String {
        let replies = self.replies.join("\n");
        let context = bounded_context(hits, self.max_context_chars);

        PLACEHOLDER
            .replace_all(&self.template, |caps: &Captures| match &caps[1] {
                "REPLIES" => replies.clone(),
                "USER_ASKING" => self.user_asking.clone(),
                "BOT_NAME" => self.bot_name.clone(),
                "CONTEXT" => context.clone(),
                "QUERY" => self.query.clone(),
                _ => caps[0].to_string(),
            })
            .into_owned()
    }
}

/// Recalled lines joined until `max_chars` would be exceeded; the first hit always fits
fn bounded_context(hits: &[RecallHit], max_chars: usize) -> String {
    let mut context = String::new();
    let mut used = 0;
    for hit in hits {
        let len = hit.record.text.chars().count() + 1;
        if used > 0 && used + len > max_chars {
            debug!("Context bound reached after {} chars", used);
            break;
        }
        context.push_str(&hit.record.text);
        context.push('\n');
        used += len;
    }
    context
}

#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub prompt: PromptContext,
    pub filter: RecallFilter,
    pub policy: RecencyPolicy,
}

impl AssembledContext {
    pub fn recall_request(&self) -> RecallRequest {
        RecallRequest {
            query: self.prompt.query.clone(),
            seeds: self.prompt.embedding_seeds(),
            filter: self.filter,
            policy: self.policy.clone(),
        }
    }
}

pub struct ContextAssembler {
    store: Arc<dyn ConversationStore>,
    bot_name: String,
    system_prefix: String,
    rag_template: String,
    chat_system_prompt: String,
    policy: RecencyPolicy,
    max_context_chars: usize,
}

impl ContextAssembler {
    pub fn new(store: Arc<dyn ConversationStore>, settings: &Settings) -> Self {
        Self {
            store,
            bot_name: settings.bot.name.clone(),
            system_prefix: settings.bot.system_prefix.clone(),
            rag_template: settings.prompts.rag_template.clone(),
            chat_system_prompt: settings.prompts.chat_system_prompt.clone(),
            policy: RecencyPolicy {
                top_k: settings.context.recall_top_k,
                date_field: settings.context.date_field.clone(),
            },
            max_context_chars: settings.context.max_context_chars,
        }
    }

    /// Short-term buffer, recall filter and recency policy for a rag query.
    ///
    /// Fails with [`BotError::EmptyKnowledgeBase`] when the guild has nothing
    /// remembered apart from the bot's own status notices.
    pub fn build(
        &self,
        community_id: CommunityId,
        channel_id: ChannelId,
        user_asking: &str,
        query: &str,
        last_n: usize,
    ) -> Result<AssembledContext, BotError> {
        let log = self.store.list(community_id, None);
        if !log.iter().any(|e| !e.is_system_notice(&self.system_prefix)) {
            return Err(BotError::EmptyKnowledgeBase);
        }

        let channel_log: Vec<&LogEntry> = log.iter().filter(|e| e.channel_id == channel_id).collect();
        let replies = short_term_buffer(&channel_log, last_n);
        debug!(
            "Assembled {} buffered replies for guild {} channel {}",
            replies.len(),
            community_id,
            channel_id
        );

        Ok(AssembledContext {
            prompt: PromptContext {
                replies,
                user_asking: user_asking.to_string(),
                bot_name: self.bot_name.clone(),
                query: query.to_string(),
                template: self.rag_template.clone(),
                max_context_chars: self.max_context_chars,
            },
            filter: RecallFilter::community(community_id),
            policy: self.policy.clone(),
        })
    }

    /// System message followed by the channel's last `last_n` entries as turns
    pub fn chat_history(
        &self,
        community_id: CommunityId,
        channel_id: ChannelId,
        last_n: usize,
    ) -> Vec<ChatMessage> {
        let log = self.store.list(community_id, Some(channel_id));
        let start = log.len().saturating_sub(last_n);

        let mut history = Vec::with_capacity(log.len() - start + 1);
        history.push(ChatMessage::system(self.chat_system_prompt.clone()));

        for entry in &log[start..] {
            let role = if entry.author == self.bot_name {
                "assistant"
            } else {
                "user"
            };
            let message = if entry.is_image {
                ChatMessage::image(role, entry.payload.clone())
            } else if role == "assistant" {
                ChatMessage::assistant(entry.payload.clone())
            } else {
                ChatMessage::user(entry.payload.clone())
            };
            history.push(message);
        }
        history
    }
}

/// Last `last_n` entries minus the newest, text only, oldest first
fn short_term_buffer(channel_log: &[&LogEntry], last_n: usize) -> Vec<String> {
    let start = channel_log.len().saturating_sub(last_n);
    let window = &channel_log[start..];
    let without_newest = &window[..window.len().saturating_sub(1)];

    without_newest
        .iter()
        .filter(|e| !e.is_image)
        .map(|e| e.payload.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelInfo, MessageContent};
    use crate::services::recall_index::RecallRecord;
    use crate::store::SnapshotStore;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn channel(id: ChannelId) -> ChannelInfo {
        ChannelInfo {
            id,
            name: "general".to_string(),
            is_thread: false,
        }
    }

    fn setup() -> (TempDir, Arc<SnapshotStore>, ContextAssembler) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SnapshotStore::open(dir.path()).unwrap());
        let assembler = ContextAssembler::new(store.clone(), &Settings::default());
        (dir, store, assembler)
    }

    fn say(store: &SnapshotStore, channel_id: ChannelId, author: &str, text: &str) {
        store
            .append(1, LogEntry::text(Utc::now(), author, &channel(channel_id), text))
            .unwrap();
    }

    #[test]
    fn test_empty_knowledge_base() {
        let (_dir, store, assembler) = setup();
        assert!(matches!(
            assembler.build(1, 7, "frank", "what?", 10),
            Err(BotError::EmptyKnowledgeBase)
        ));

        // Status notices alone do not count as knowledge
        say(&store, 7, "RAgent", "**RAgent SYS**: Listening to your messages now.");
        assert!(matches!(
            assembler.build(1, 7, "frank", "what?", 10),
            Err(BotError::EmptyKnowledgeBase)
        ));
    }

    #[test]
    fn test_buffer_drops_newest_and_other_channels() {
        let (_dir, store, assembler) = setup();
        for i in 0..6 {
            say(&store, 7, "gina", &format!("msg {}", i));
        }
        say(&store, 8, "gina", "elsewhere");

        let assembled = assembler.build(1, 7, "gina", "question", 4).unwrap();
        assert_eq!(assembled.prompt.replies, vec!["msg 2", "msg 3", "msg 4"]);
        assert_eq!(
            assembled.prompt.embedding_seeds(),
            vec!["msg 2", "msg 3", "msg 4", "question"]
        );
        assert_eq!(assembled.filter, RecallFilter::community(1));
        assert_eq!(assembled.policy.top_k, 8);
        assert_eq!(assembled.policy.date_field, "posted_at");

        let request = assembled.recall_request();
        assert_eq!(request.query, "question");
        assert_eq!(request.seeds.len(), 4);
    }

    #[test]
    fn test_buffer_skips_images() {
        let (_dir, store, assembler) = setup();
        say(&store, 7, "gina", "look at this");
        store
            .append(
                1,
                LogEntry::image(Utc::now(), "gina", &channel(7), "./images/x.png", "data:image/png;base64,AA"),
            )
            .unwrap();
        say(&store, 7, "gina", "newest");

        let assembled = assembler.build(1, 7, "gina", "q", 10).unwrap();
        assert_eq!(assembled.prompt.replies, vec!["look at this"]);
    }

    #[test]
    fn test_render_fills_placeholders_once() {
        let (_dir, store, assembler) = setup();
        say(&store, 7, "hank", "earlier");
        say(&store, 7, "hank", "now");

        let assembled = assembler.build(1, 7, "hank", "who said {{CONTEXT}}?", 10).unwrap();
        let hit = RecallHit {
            record: RecallRecord::from_entry(
                1,
                &LogEntry::text(Utc::now() - Duration::days(2), "ivy", &channel(7), "pizza on friday"),
            ),
            score: 0.9,
        };

        let prompt = assembled.prompt.render(&[hit]);
        assert!(prompt.contains("earlier"));
        assert!(prompt.contains("You are RAgent. hank is asking"));
        assert!(prompt.contains("@ivy on #[general]: `pizza on friday`"));
        assert!(prompt.contains("Question: who said {{CONTEXT}}?"));
        assert!(!prompt.contains("{{REPLIES}}"));
    }

    #[test]
    fn test_render_bounds_context() {
        let hits: Vec<RecallHit> = (0..5)
            .map(|i| RecallHit {
                record: RecallRecord::from_entry(
                    1,
                    &LogEntry::text(Utc::now(), "ivy", &channel(7), "x".repeat(100 + i)),
                ),
                score: 0.5,
            })
            .collect();

        let one = bounded_context(&hits, 10);
        assert_eq!(one.lines().count(), 1);
        let all = bounded_context(&hits, 100_000);
        assert_eq!(all.lines().count(), 5);
    }

    #[test]
    fn test_chat_history_roles() {
        let (_dir, store, assembler) = setup();
        say(&store, 7, "jade", "hi bot");
        say(&store, 7, "RAgent", "hello jade");
        store
            .append(
                1,
                LogEntry::image(Utc::now(), "jade", &channel(7), "./images/y.png", "data:image/png;base64,BB"),
            )
            .unwrap();
        say(&store, 8, "jade", "other channel");

        let history = assembler.chat_history(1, 7, 10);
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].role, "system");
        assert_eq!(history[1].role, "user");
        assert_eq!(history[2].role, "assistant");
        assert_eq!(history[2].as_text(), Some("hello jade"));
        assert!(matches!(history[3].content, MessageContent::Parts(_)));

        assert_eq!(assembler.chat_history(1, 7, 1).len(), 2);
    }
}
