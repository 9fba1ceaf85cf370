//! Error taxonomy of the HTTP endpoints.
//!
//! | Variant | Status | Who can fix it |
//! |---------|--------|----------------|
//! | [`ChatError::Validation`] | 400 | the caller |
//! | [`ChatError::NotConfigured`] | 400 | the site owner (no stored configuration) |
//! | [`ChatError::Upstream`] | 500 | nobody in the request; store or model failed |
//!
//! Every variant renders as `{ "message": "..." }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MISSING_CHAT_FIELDS: &str = "Message and owner ID is required";
pub const NOT_CONFIGURED: &str = "Chat Bot is not configured yet.";
pub const MISSING_OWNER_ID: &str = "owner ID is required";
pub const INVALID_PAYLOAD: &str = "Request body must be a JSON object";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("{}", NOT_CONFIGURED)]
    NotConfigured,

    /// Detail is the already-prefixed message, e.g. `chat error ...`.
    #[error("{0}")]
    Upstream(String),
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::Validation(_) | ChatError::NotConfigured => StatusCode::BAD_REQUEST,
            ChatError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The `{ message }` envelope used by every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = MessageBody {
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(
            ChatError::Validation(MISSING_CHAT_FIELDS).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ChatError::NotConfigured.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ChatError::Upstream("chat error boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn messages_are_literal() {
        assert_eq!(
            ChatError::Validation(MISSING_CHAT_FIELDS).to_string(),
            "Message and owner ID is required"
        );
        assert_eq!(
            ChatError::NotConfigured.to_string(),
            "Chat Bot is not configured yet."
        );
        assert_eq!(ChatError::NotConfigured.to_string(), NOT_CONFIGURED);
    }
}
