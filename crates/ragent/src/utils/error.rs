use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::bot::replies;
use crate::store::StoreError;

/// Failures of the HTTP gateway itself, rendered as JSON responses
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::NotFound(msg) => {
                tracing::warn!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, "NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "BadRequest", msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Which entry point produced the failure; a few guidance texts differ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// `rag` and the other slash/prefix commands
    Command,
    /// Free-form message that mentions the bot
    Mention,
}

/// Outcome of a bot operation that did not produce an answer
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Not listening in this guild")]
    NotListening,

    #[error("Empty input")]
    EmptyInput,

    #[error("Knowledge base is empty")]
    EmptyKnowledgeBase,

    #[error("Conversation store failed: {0}")]
    Store(#[from] StoreError),

    #[error("LLM failed: {0:#}")]
    Llm(anyhow::Error),

    #[error("Recall failed: {0:#}")]
    Recall(anyhow::Error),

    #[error("Transport failed: {0:#}")]
    Transport(anyhow::Error),

    #[error("Internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl BotError {
    /// Expected refusals answered with fixed guidance, not logged as errors
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            BotError::NotListening | BotError::EmptyInput | BotError::EmptyKnowledgeBase
        )
    }

    pub fn reply_text(&self, surface: Surface) -> &'static str {
        match (self, surface) {
            (BotError::NotListening, Surface::Command) => replies::NOT_LISTENING_COMMAND,
            (BotError::NotListening, Surface::Mention) => replies::NOT_LISTENING_MENTION,
            (BotError::EmptyInput, Surface::Command) => replies::EMPTY_QUERY,
            (BotError::EmptyInput, Surface::Mention) => replies::EMPTY_MENTION,
            (BotError::EmptyKnowledgeBase, _) => replies::EMPTY_KNOWLEDGE_BASE,
            _ => replies::APOLOGY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn test_precondition_classification() {
        assert!(BotError::NotListening.is_precondition());
        assert!(BotError::EmptyKnowledgeBase.is_precondition());
        assert!(!BotError::Llm(anyhow::anyhow!("boom")).is_precondition());
    }

    #[test]
    fn test_reply_text_per_surface() {
        assert_eq!(
            BotError::EmptyInput.reply_text(Surface::Command),
            "**RAgent SYS**: Empty Input?"
        );
        assert_eq!(BotError::EmptyInput.reply_text(Surface::Mention), "What?");
        assert!(BotError::NotListening
            .reply_text(Surface::Mention)
            .contains("🙈🙉🙊"));
        assert_eq!(
            BotError::Internal(anyhow::anyhow!("x")).reply_text(Surface::Mention),
            "**RAgent SYS**: The bot encountered an error, will try to fix it soon."
        );
    }

    #[test]
    fn test_error_chain_in_display() {
        let err = BotError::Recall(anyhow::anyhow!("connection refused").context("embedding seeds"));
        assert_eq!(
            err.to_string(),
            "Recall failed: embedding seeds: connection refused"
        );
    }

    #[tokio::test]
    async fn test_api_error_response_body() {
        let response = ApiError::NotFound("guild 5".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "NotFound");
        assert_eq!(json["message"], "guild 5");
    }
}
