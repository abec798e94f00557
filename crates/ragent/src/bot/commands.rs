use std::time::Instant;
use tracing::{debug, info};

use super::{replies, Bot, Origin};
use crate::logging::{ActivityLog, ActivityType};
use crate::models::{ChatMessage, CommandInvocation, LogEntry, ReplyTarget};
use crate::services::commands::CommandCatalog;
use crate::services::dispatcher::ChatTransport;
use crate::utils::error::{BotError, Surface};

impl Bot {
    /// Entry point for slash and prefix commands
    pub async fn on_command(&self, invocation: CommandInvocation, transport: &dyn ChatTransport) {
        let target = invocation.reply_target();
        debug!(
            "Command '{}' from {} in guild {}",
            invocation.name, invocation.invoker.name, invocation.community_id
        );

        let outcome = self.run_command(&invocation, transport, &target).await;
        let origin = Origin {
            community_id: invocation.community_id,
            channel_id: invocation.channel.id,
            user_id: invocation.invoker.id,
            command: Some(invocation.name.as_str()),
        };
        self.settle(outcome, Surface::Command, origin, transport, &target).await;
    }

    async fn run_command(
        &self,
        invocation: &CommandInvocation,
        transport: &dyn ChatTransport,
        target: &ReplyTarget,
    ) -> Result<(), BotError> {
        let community_id = invocation.community_id;

        let reply = match invocation.name.as_str() {
            "listen" => {
                self.store.set_listening(community_id, true)?;
                replies::LISTENING
            }
            "stop" => {
                self.store.set_listening(community_id, false)?;
                replies::STOPPED
            }
            "forget" => {
                self.forget_community(community_id).await?;
                replies::FORGOTTEN
            }
            "status" => {
                if self.store.is_listening(community_id) {
                    replies::STATUS_LISTENING
                } else {
                    replies::STATUS_NOT_LISTENING
                }
            }
            "rag" => return self.rag(invocation, transport, target).await,
            "sync" => return self.sync(invocation, transport, target).await,
            other => {
                debug!("Ignoring unknown command '{}'", other);
                return Ok(());
            }
        };

        self.say(transport, target, reply).await?;
        self.activity.log(
            ActivityLog::builder(community_id, invocation.invoker.id, ActivityType::CommandHandled)
                .channel(invocation.channel.id)
                .command(invocation.name.as_str())
                .build(),
        );
        Ok(())
    }

    async fn sync(
        &self,
        invocation: &CommandInvocation,
        transport: &dyn ChatTransport,
        target: &ReplyTarget,
    ) -> Result<(), BotError> {
        if invocation.invoker.id != self.config.owner_id {
            self.say(transport, target, replies::NOT_OWNER).await?;
            return Ok(());
        }

        let published = self
            .registry
            .publish(CommandCatalog::slash_commands())
            .await
            .map_err(BotError::Internal)?;
        info!("Command tree synced ({} commands)", published);

        self.say(transport, target, replies::SYNCED).await?;
        self.activity.log(
            ActivityLog::builder(
                invocation.community_id,
                invocation.invoker.id,
                ActivityType::CommandsSynced,
            )
            .custom("published", published)
            .build(),
        );
        Ok(())
    }

    /// Answer from the channel's recent messages plus recalled guild history
    async fn rag(
        &self,
        invocation: &CommandInvocation,
        transport: &dyn ChatTransport,
        target: &ReplyTarget,
    ) -> Result<(), BotError> {
        let started = Instant::now();
        let community_id = invocation.community_id;

        if !self.store.is_listening(community_id) {
            return Err(BotError::NotListening);
        }
        let query = invocation.argument.as_deref().unwrap_or_default().trim();
        if query.is_empty() {
            return Err(BotError::EmptyInput);
        }

        let assembled = self.assembler.build(
            community_id,
            invocation.channel.id,
            &invocation.invoker.name,
            query,
            self.last_n,
        )?;

        let recall_started = Instant::now();
        let hits = self
            .recall
            .recall(&assembled.recall_request())
            .await
            .map_err(BotError::Recall)?;
        let recall_ms = recall_started.elapsed().as_millis() as u64;
        self.activity.log(
            ActivityLog::builder(community_id, invocation.invoker.id, ActivityType::RecallExecuted)
                .channel(invocation.channel.id)
                .command("rag")
                .message(query)
                .recall_hits(hits.len())
                .recall_duration(recall_ms)
                .custom("seeds", assembled.prompt.embedding_seeds().len())
                .build(),
        );

        let messages = vec![
            ChatMessage::system(self.rag_system_prompt.clone()),
            ChatMessage::user(assembled.prompt.render(&hits)),
        ];

        let llm_started = Instant::now();
        let answer = self.llm.generate(&messages).await.map_err(BotError::Llm)?;
        let llm_ms = llm_started.elapsed().as_millis() as u64;
        if answer.trim().is_empty() {
            return Err(BotError::Llm(anyhow::anyhow!("LLM returned an empty answer")));
        }

        let segments = self.say(transport, target, &answer).await?;

        // Listening may have been turned off while the answer was generated
        if self.store.is_listening(community_id) {
            let entry = LogEntry::text(
                invocation.invoked_at(),
                self.config.name.as_str(),
                &invocation.channel,
                answer.as_str(),
            );
            self.remember(community_id, vec![entry]).await?;
        }

        self.activity.log(
            ActivityLog::builder(community_id, invocation.invoker.id, ActivityType::AnswerSent)
                .channel(invocation.channel.id)
                .command("rag")
                .message(query)
                .response(answer.as_str())
                .segments(segments)
                .recall_hits(hits.len())
                .recall_duration(recall_ms)
                .llm_duration(llm_ms)
                .processing_time(started.elapsed().as_millis() as u64)
                .build(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::logging::wait_for_lines;
    use crate::models::{DeliveryMode, MessageContent};
    use crate::services::dispatcher::RecordingTransport;
    use crate::services::llm_service::MockLlmProvider;
    use crate::store::ConversationStore;
    use chrono::Utc;

    async fn run(h: &Harness, name: &str, argument: Option<&str>, invoker: u64) -> Vec<String> {
        let transport = RecordingTransport::new();
        h.bot
            .on_command(command(name, argument, invoker), &transport)
            .await;
        transport
            .into_messages()
            .into_iter()
            .map(|m| m.content)
            .collect()
    }

    fn no_llm() -> MockLlmProvider {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate().times(0);
        llm
    }

    async fn seed_knowledge(h: &Harness) {
        let entries = ["I love pizza", "pizza night is friday", "the cat sleeps"]
            .iter()
            .map(|text| LogEntry::text(Utc::now(), "mona", &channel(), *text))
            .collect();
        h.bot.remember(GUILD, entries).await.unwrap();
    }

    #[tokio::test]
    async fn test_listen_stop_status() {
        let h = harness(no_llm());

        assert_eq!(run(&h, "status", None, 1).await, vec![replies::STATUS_NOT_LISTENING]);
        assert_eq!(run(&h, "listen", None, 1).await, vec![replies::LISTENING]);
        assert!(h.store.is_listening(GUILD));
        assert_eq!(run(&h, "status", None, 1).await, vec![replies::STATUS_LISTENING]);
        assert_eq!(run(&h, "stop", None, 1).await, vec![replies::STOPPED]);
        assert!(!h.store.is_listening(GUILD));
    }

    #[tokio::test]
    async fn test_forget_command() {
        let h = harness(no_llm());
        run(&h, "listen", None, 1).await;
        seed_knowledge(&h).await;
        assert_eq!(h.recall.len(), 3);

        assert_eq!(run(&h, "forget", None, 1).await, vec![replies::FORGOTTEN]);
        assert!(h.store.list(GUILD, None).is_empty());
        assert!(!h.store.is_listening(GUILD));
        assert!(h.recall.is_empty());
    }

    #[tokio::test]
    async fn test_rag_while_not_listening() {
        let h = harness(no_llm());
        let sent = run(&h, "rag", Some("anything?"), 1).await;

        assert_eq!(sent, vec![replies::NOT_LISTENING_COMMAND]);
        assert!(h.store.list(GUILD, None).is_empty());
    }

    #[tokio::test]
    async fn test_rag_empty_query_and_empty_knowledge_base() {
        let h = harness(no_llm());
        h.store.set_listening(GUILD, true).unwrap();

        assert_eq!(run(&h, "rag", Some("   "), 1).await, vec![replies::EMPTY_QUERY]);
        assert_eq!(run(&h, "rag", None, 1).await, vec![replies::EMPTY_QUERY]);
        assert_eq!(
            run(&h, "rag", Some("what is up"), 1).await,
            vec![replies::EMPTY_KNOWLEDGE_BASE]
        );
        assert!(h.store.list(GUILD, None).is_empty());
    }

    #[tokio::test]
    async fn test_rag_answers_and_remembers() {
        let answer = "Pizza night is on friday. ".repeat(180);
        let mut llm = MockLlmProvider::new();
        let expected = answer.clone();
        llm.expect_generate()
            .times(1)
            .returning(move |messages: &[ChatMessage]| {
                assert_eq!(messages.len(), 2);
                assert_eq!(messages[0].role, "system");
                let prompt = match &messages[1].content {
                    MessageContent::Text(text) => text.clone(),
                    MessageContent::Parts(_) => panic!("rag prompt must be text"),
                };
                assert!(prompt.contains("lena is asking"));
                assert!(prompt.contains("Question: when is pizza night?"));
                assert!(prompt.contains("pizza night is friday"));
                Ok(expected.clone())
            });

        let h = harness(llm);
        h.store.set_listening(GUILD, true).unwrap();
        seed_knowledge(&h).await;

        let transport = RecordingTransport::new();
        let invocation = command("rag", Some("when is pizza night?"), 1);
        let invoked_at = invocation.invoked_at();
        h.bot.on_command(invocation, &transport).await;

        let sent = transport.into_messages();
        assert!(sent.len() > 1);
        assert!(sent.iter().all(|m| matches!(m.mode, DeliveryMode::FollowUp { .. })));
        assert!(sent.iter().all(|m| m.content.chars().count() <= 2000));
        let joined: String = sent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(joined, answer);

        let log = h.store.list(GUILD, None);
        let last = log.last().unwrap();
        assert_eq!(last.author, "RAgent");
        assert_eq!(last.payload, answer);
        assert_eq!(last.posted_at, invoked_at);
        assert_eq!(h.recall.len(), 4);
    }

    #[tokio::test]
    async fn test_rag_llm_failure_apologizes() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("connection refused")));

        let h = harness(llm);
        h.store.set_listening(GUILD, true).unwrap();
        seed_knowledge(&h).await;

        let sent = run(&h, "rag", Some("pizza?"), 1).await;
        assert_eq!(sent, vec![replies::APOLOGY]);
        assert_eq!(h.store.list(GUILD, None).len(), 3);
    }

    #[tokio::test]
    async fn test_rag_journals_recall_then_answer() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .times(1)
            .returning(|_| Ok("Friday.".to_string()));

        let (h, journal) = harness_with_journal(llm);
        h.store.set_listening(GUILD, true).unwrap();
        seed_knowledge(&h).await;

        run(&h, "rag", Some("when is pizza night?"), 1).await;

        let lines = wait_for_lines(&journal, 2).await;
        let recall: ActivityLog = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(recall.activity_type, ActivityType::RecallExecuted);
        assert_eq!(recall.command.as_deref(), Some("rag"));
        assert_eq!(recall.message_content.as_deref(), Some("when is pizza night?"));
        assert_eq!(recall.recall_hits, Some(3));
        assert!(recall.recall_duration_ms.is_some());

        let answer: ActivityLog = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(answer.activity_type, ActivityType::AnswerSent);
        assert_eq!(answer.segment_count, Some(1));
    }

    #[tokio::test]
    async fn test_sync_is_owner_only() {
        let h = harness(no_llm());

        assert_eq!(run(&h, "sync", None, 1).await, vec![replies::NOT_OWNER]);
        assert!(h.bot.registry().published().synced_at.is_none());

        assert_eq!(run(&h, "sync", None, OWNER_ID).await, vec![replies::SYNCED]);
        let published = h.bot.registry().published();
        assert_eq!(published.commands.len(), 5);
        assert!(published.commands.iter().all(|c| c.name != "sync"));
    }

    #[tokio::test]
    async fn test_unknown_command_is_ignored() {
        let h = harness(no_llm());
        assert!(run(&h, "dance", None, 1).await.is_empty());
    }
}
