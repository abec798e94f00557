use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Activity type categories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    CommandHandled,
    MessageRemembered,
    ImagesIngested,
    AnswerSent,
    RecallExecuted,
    CommandsSynced,
    CommunityForgotten,
    PreconditionRefused,
    LlmError,
    RecallError,
    StoreError,
    TransportError,
    InternalError,
}

impl ActivityType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::CommandHandled => "command_handled",
            Self::MessageRemembered => "message_remembered",
            Self::ImagesIngested => "images_ingested",
            Self::AnswerSent => "answer_sent",
            Self::RecallExecuted => "recall_executed",
            Self::CommandsSynced => "commands_synced",
            Self::CommunityForgotten => "community_forgotten",
            Self::PreconditionRefused => "precondition_refused",
            Self::LlmError => "llm_error",
            Self::RecallError => "recall_error",
            Self::StoreError => "store_error",
            Self::TransportError => "transport_error",
            Self::InternalError => "internal_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Success,
    Error,
}

/// One journal line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLog {
    // Where & who
    pub community_id: u64,
    pub user_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<u64>,

    pub activity_type: ActivityType,
    pub activity_status: ActivityStatus,

    // Context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_content: Option<String>,

    // Metrics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recall_hits: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_call_duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recall_duration_ms: Option<u64>,

    // Error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, Value>,
}

impl ActivityLog {
    pub fn builder(community_id: u64, user_id: u64, activity_type: ActivityType) -> ActivityLogBuilder {
        ActivityLogBuilder::new(community_id, user_id, activity_type)
    }
}

pub struct ActivityLogBuilder {
    log: ActivityLog,
}

impl ActivityLogBuilder {
    pub fn new(community_id: u64, user_id: u64, activity_type: ActivityType) -> Self {
        Self {
            log: ActivityLog {
                community_id,
                user_id,
                channel_id: None,
                activity_type,
                activity_status: ActivityStatus::Success,
                command: None,
                message_content: None,
                response_content: None,
                segment_count: None,
                recall_hits: None,
                processing_time_ms: None,
                llm_call_duration_ms: None,
                recall_duration_ms: None,
                error_message: None,
                error_type: None,
                created_at: Utc::now(),
                custom_fields: BTreeMap::new(),
            },
        }
    }

    pub fn channel(mut self, channel_id: u64) -> Self {
        self.log.channel_id = Some(channel_id);
        self
    }

    pub fn command(mut self, name: impl Into<String>) -> Self {
        self.log.command = Some(name.into());
        self
    }

    pub fn message(mut self, content: impl Into<String>) -> Self {
        self.log.message_content = Some(content.into());
        self
    }

    pub fn response(mut self, content: impl Into<String>) -> Self {
        self.log.response_content = Some(content.into());
        self
    }

    pub fn segments(mut self, count: usize) -> Self {
        self.log.segment_count = Some(count);
        self
    }

    pub fn recall_hits(mut self, count: usize) -> Self {
        self.log.recall_hits = Some(count);
        self
    }

    pub fn processing_time(mut self, ms: u64) -> Self {
        self.log.processing_time_ms = Some(ms);
        self
    }

    pub fn llm_duration(mut self, ms: u64) -> Self {
        self.log.llm_call_duration_ms = Some(ms);
        self
    }

    pub fn recall_duration(mut self, ms: u64) -> Self {
        self.log.recall_duration_ms = Some(ms);
        self
    }

    pub fn error(mut self, message: impl Into<String>, error_type: impl Into<String>) -> Self {
        self.log.error_message = Some(message.into());
        self.log.error_type = Some(error_type.into());
        self.log.activity_status = ActivityStatus::Error;
        self
    }

    pub fn custom(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.log.custom_fields.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> ActivityLog {
        self.log
    }
}
