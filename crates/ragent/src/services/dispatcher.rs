use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::segmenter::MessageSegmenter;
use crate::models::{DeliveryMode, OutboundMessage, ReplyTarget};

/// Platform side of a conversation
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn deliver(&self, target: &ReplyTarget, content: &str) -> Result<()>;

    /// Show the typing indicator; transports without one ignore it
    async fn typing(&self, _target: &ReplyTarget) -> Result<()> {
        Ok(())
    }
}

/// Sends answers in transport-sized units, strictly in order
pub struct ReplyDispatcher {
    segmenter: MessageSegmenter,
}

impl ReplyDispatcher {
    pub fn new(max_message_chars: usize) -> Self {
        Self {
            segmenter: MessageSegmenter::new(max_message_chars),
        }
    }

    /// Returns how many units were delivered
    pub async fn send(
        &self,
        transport: &dyn ChatTransport,
        target: &ReplyTarget,
        text: &str,
    ) -> Result<usize> {
        if !matches!(target.mode, DeliveryMode::FollowUp { .. }) {
            transport.typing(target).await?;
        }

        let units = self.segmenter.segment(text);
        if units.len() > 1 {
            debug!(
                "Reply of {} chars split into {} segments",
                text.chars().count(),
                units.len()
            );
        }

        for unit in &units {
            transport.deliver(target, unit).await?;
        }
        Ok(units.len())
    }
}

/// Collects deliveries in memory; one per gateway request
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    typing_count: Mutex<usize>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_messages(self) -> Vec<OutboundMessage> {
        self.sent.into_inner()
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    pub fn typing_count(&self) -> usize {
        *self.typing_count.lock()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn deliver(&self, target: &ReplyTarget, content: &str) -> Result<()> {
        self.sent.lock().push(OutboundMessage {
            channel_id: target.channel_id,
            mode: target.mode.clone(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn typing(&self, _target: &ReplyTarget) -> Result<()> {
        *self.typing_count.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_post() -> ReplyTarget {
        ReplyTarget {
            channel_id: 3,
            mode: DeliveryMode::ChannelPost,
        }
    }

    #[tokio::test]
    async fn test_short_reply_is_one_unit() {
        let transport = RecordingTransport::new();
        let sent = ReplyDispatcher::new(2000)
            .send(&transport, &channel_post(), "hello")
            .await
            .unwrap();

        assert_eq!(sent, 1);
        assert_eq!(transport.typing_count(), 1);
        let messages = transport.into_messages();
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[0].channel_id, 3);
    }

    #[tokio::test]
    async fn test_long_reply_keeps_segment_order() {
        let text: String = (0..400).map(|i| format!("line {:04}\n", i)).collect();
        let transport = RecordingTransport::new();
        let target = ReplyTarget {
            channel_id: 3,
            mode: DeliveryMode::Reply { message_id: 77 },
        };

        let sent = ReplyDispatcher::new(2000).send(&transport, &target, &text).await.unwrap();
        assert!(sent > 1);

        let messages = transport.into_messages();
        assert_eq!(messages.len(), sent);
        assert!(messages.iter().all(|m| m.mode == target.mode));
        assert!(messages.iter().all(|m| m.content.chars().count() <= 2000));
        let joined: String = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[tokio::test]
    async fn test_follow_up_skips_typing() {
        let transport = RecordingTransport::new();
        let target = ReplyTarget {
            channel_id: 3,
            mode: DeliveryMode::FollowUp {
                interaction_token: "tok".to_string(),
            },
        };
        ReplyDispatcher::new(2000).send(&transport, &target, "done").await.unwrap();
        assert_eq!(transport.typing_count(), 0);
        assert_eq!(transport.messages().len(), 1);
    }
}
