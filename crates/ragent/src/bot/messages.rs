use std::time::Instant;
use tracing::debug;

use super::{Bot, Origin};
use crate::logging::{ActivityLog, ActivityType};
use crate::models::{CommandInvocation, InboundMessage, LogEntry, ReplyTarget};
use crate::services::dispatcher::ChatTransport;
use crate::utils::error::{BotError, Surface};

impl Bot {
    /// Entry point for every guild message
    pub async fn on_message(&self, mut message: InboundMessage, transport: &dyn ChatTransport) {
        message.resolve_mentions();

        if message.author.id == self.config.user_id {
            return;
        }

        if let Some(invocation) = self.parse_prefix_command(&message) {
            self.on_command(invocation, transport).await;
            return;
        }

        let target = ReplyTarget::reply_to(&message);
        let outcome = self.handle_message(&message, transport, &target).await;
        let origin = Origin {
            community_id: message.community_id,
            channel_id: message.channel.id,
            user_id: message.author.id,
            command: None,
        };
        self.settle(outcome, Surface::Mention, origin, transport, &target).await;
    }

    fn parse_prefix_command(&self, message: &InboundMessage) -> Option<CommandInvocation> {
        let rest = message.content.strip_prefix(self.config.command_prefix.as_str())?;
        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, Some(argument.trim())),
            None => (rest, None),
        };
        if name.is_empty() {
            return None;
        }

        Some(CommandInvocation {
            name: name.to_string(),
            community_id: message.community_id,
            channel: message.channel.clone(),
            invoker: message.author.clone(),
            argument: argument.filter(|a| !a.is_empty()).map(str::to_string),
            interaction_id: None,
            interaction_token: None,
        })
    }

    async fn handle_message(
        &self,
        message: &InboundMessage,
        transport: &dyn ChatTransport,
        target: &ReplyTarget,
    ) -> Result<(), BotError> {
        let community_id = message.community_id;
        let listening = self.store.is_listening(community_id);

        if listening {
            self.ingest(message).await?;
        }

        if !message.mentions_user(self.config.user_id) {
            return Ok(());
        }
        if !listening {
            return Err(BotError::NotListening);
        }
        if message.content.trim().is_empty() {
            return Err(BotError::EmptyInput);
        }

        let started = Instant::now();
        let history = self
            .assembler
            .chat_history(community_id, message.channel.id, self.last_n);
        let answer = self.llm.generate(&history).await.map_err(BotError::Llm)?;
        if answer.trim().is_empty() {
            return Err(BotError::Llm(anyhow::anyhow!("LLM returned an empty answer")));
        }

        let segments = self.say(transport, target, &answer).await?;

        if self.store.is_listening(community_id) {
            let entry = LogEntry::text(
                message.created_at,
                self.config.name.as_str(),
                &message.channel,
                answer.as_str(),
            );
            self.remember(community_id, vec![entry]).await?;
        }

        self.activity.log(
            ActivityLog::builder(community_id, message.author.id, ActivityType::AnswerSent)
                .channel(message.channel.id)
                .message(message.content.as_str())
                .response(answer.as_str())
                .segments(segments)
                .custom("history_turns", history.len())
                .processing_time(started.elapsed().as_millis() as u64)
                .build(),
        );
        Ok(())
    }

    /// Remember images first, then the text. Nothing is appended for an
    /// image before its download resolves.
    async fn ingest(&self, message: &InboundMessage) -> Result<(), BotError> {
        let community_id = message.community_id;
        let urls = message.image_urls();

        if !urls.is_empty() {
            let fetched = self.images.fetch_all(&urls).await;
            let entries = self.images.remember_images(
                self.store.as_ref(),
                community_id,
                message.created_at,
                &message.author.name,
                &message.channel,
                &fetched,
            )?;
            self.index(community_id, &entries).await;

            debug!(
                "Remembered {}/{} images from message {}",
                entries.len(),
                urls.len(),
                message.id
            );
            self.activity.log(
                ActivityLog::builder(community_id, message.author.id, ActivityType::ImagesIngested)
                    .channel(message.channel.id)
                    .custom("requested", urls.len())
                    .custom("stored", entries.len())
                    .build(),
            );
        }

        if message.content.trim().is_empty() {
            return Ok(());
        }

        let entry = LogEntry::text(
            message.created_at,
            message.author.name.as_str(),
            &message.channel,
            message.content.as_str(),
        );
        self.remember(community_id, vec![entry]).await?;
        self.activity.log(
            ActivityLog::builder(community_id, message.author.id, ActivityType::MessageRemembered)
                .channel(message.channel.id)
                .build(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::replies;
    use super::super::testing::*;
    use super::*;
    use crate::models::{Attachment, Author, ChatMessage, DeliveryMode, MessageContent};
    use crate::services::dispatcher::RecordingTransport;
    use crate::services::llm_service::MockLlmProvider;
    use crate::store::ConversationStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00];

    fn no_llm() -> MockLlmProvider {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate().times(0);
        llm
    }

    async fn deliver(h: &Harness, message: InboundMessage) -> Vec<crate::models::OutboundMessage> {
        let transport = RecordingTransport::new();
        h.bot.on_message(message, &transport).await;
        transport.into_messages()
    }

    #[tokio::test]
    async fn test_not_listening_ignores_plain_messages() {
        let h = harness(no_llm());
        assert!(deliver(&h, message(1, "hello", false)).await.is_empty());
        assert!(h.store.list(GUILD, None).is_empty());
    }

    #[tokio::test]
    async fn test_mention_while_not_listening() {
        let h = harness(no_llm());
        let sent = deliver(&h, message(1, "<@42> hi", true)).await;

        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content, replies::NOT_LISTENING_MENTION);
        assert_eq!(sent[0].mode, DeliveryMode::Reply { message_id: 1 });
        assert!(h.store.list(GUILD, None).is_empty());
    }

    #[tokio::test]
    async fn test_listening_remembers_and_indexes() {
        let h = harness(no_llm());
        h.store.set_listening(GUILD, true).unwrap();

        assert!(deliver(&h, message(1, "pizza on friday", false)).await.is_empty());
        let log = h.store.list(GUILD, None);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].author, "lena");
        assert!(log[0].display_text.ends_with("@lena on #[general]: `pizza on friday`"));
        assert_eq!(h.recall.len(), 1);
    }

    #[tokio::test]
    async fn test_own_messages_are_ignored() {
        let h = harness(no_llm());
        h.store.set_listening(GUILD, true).unwrap();

        let mut own = message(1, "I am the bot", false);
        own.author = Author {
            id: BOT_ID,
            name: "RAgent".to_string(),
        };
        assert!(deliver(&h, own).await.is_empty());
        assert!(h.store.list(GUILD, None).is_empty());
    }

    #[tokio::test]
    async fn test_prefix_command_is_routed_and_not_remembered() {
        let h = harness(no_llm());
        let sent = deliver(&h, message(1, "/listen", false)).await;

        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content, replies::LISTENING);
        assert_eq!(sent[0].mode, DeliveryMode::ChannelPost);
        assert!(h.store.is_listening(GUILD));
        assert!(h.store.list(GUILD, None).is_empty());
    }

    #[tokio::test]
    async fn test_prefix_command_argument() {
        let h = harness(no_llm());
        let invocation = h
            .bot
            .parse_prefix_command(&message(1, "/rag   what is new  ", false))
            .unwrap();
        assert_eq!(invocation.name, "rag");
        assert_eq!(invocation.argument.as_deref(), Some("what is new"));

        let bare = h.bot.parse_prefix_command(&message(1, "/status", false)).unwrap();
        assert_eq!(bare.argument, None);
        assert!(h.bot.parse_prefix_command(&message(1, "/ nothing", false)).is_none());
        assert!(h.bot.parse_prefix_command(&message(1, "no prefix", false)).is_none());
    }

    #[tokio::test]
    async fn test_mention_answers_with_channel_history() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .times(1)
            .returning(|history: &[ChatMessage]| {
                assert_eq!(history[0].role, "system");
                let last = history.last().unwrap();
                assert_eq!(last.role, "user");
                assert_eq!(last.content, MessageContent::Text("@RAgent what's up?".to_string()));
                Ok("Not much!".to_string())
            });

        let h = harness(llm);
        h.store.set_listening(GUILD, true).unwrap();

        let sent = deliver(&h, message(5, "<@42> what's up?", true)).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content, "Not much!");
        assert_eq!(sent[0].mode, DeliveryMode::Reply { message_id: 5 });

        let log = h.store.list(GUILD, None);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].payload, "@RAgent what's up?");
        assert_eq!(log[1].author, "RAgent");
        assert_eq!(log[1].payload, "Not much!");
    }

    #[tokio::test]
    async fn test_empty_mention() {
        let h = harness(no_llm());
        h.store.set_listening(GUILD, true).unwrap();

        let sent = deliver(&h, message(1, "   ", true)).await;
        assert_eq!(sent[0].content, replies::EMPTY_MENTION);
    }

    #[tokio::test]
    async fn test_images_are_remembered_before_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cat.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let h = harness(no_llm());
        h.store.set_listening(GUILD, true).unwrap();

        let mut msg = message(1, "look", false);
        msg.attachments = vec![
            Attachment {
                url: format!("{}/cat.png?ex=1", server.uri()),
                content_type: Some("image/png".to_string()),
            },
            Attachment {
                url: format!("{}/gone.png", server.uri()),
                content_type: Some("image/png".to_string()),
            },
            Attachment {
                url: format!("{}/notes.pdf", server.uri()),
                content_type: Some("application/pdf".to_string()),
            },
        ];
        deliver(&h, msg).await;

        let log = h.store.list(GUILD, None);
        assert_eq!(log.len(), 2);
        assert!(log[0].is_image);
        assert!(log[0].payload.starts_with("data:image/png;base64,"));
        assert!(!log[1].is_image);
        assert_eq!(log[1].payload, "look");
        // Only the text is embedded
        assert_eq!(h.recall.len(), 1);
    }
}
