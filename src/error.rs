//! Request-path error type.
//!
//! Every failure a webhook request can hit is a [`RelayError`]. The server
//! maps each variant to an HTTP status and a machine-readable code:
//!
//! | Variant | Status | Code |
//! |---------|--------|------|
//! | `UnsupportedPayload` | 400 | `unsupported_payload` |
//! | `MissingIdentifiers` | 400 | `missing_identifiers` |
//! | `Helpdesk` | 502 | `helpdesk_error` |
//! | `Embedding` | 502 | `embedding_error` |
//! | `Completion` (backend, empty content) | 502 | `llm_error`, `empty_content` |
//! | `Completion` (loop exhausted) | 502 | `tool_loop_exceeded` |
//! | `Completion` (tool failure) | 500 | `tool_error` |
//! | `Store` | 500 | `store_error` |
//! | `Internal` | 500 | `internal` |
//!
//! CLI and start-up paths use `anyhow` instead.

use axum::http::StatusCode;
use relay_core::completion::CompletionError;
use relay_core::event::NormalizeError;
use relay_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("unsupported payload: body must be a JSON object")]
    UnsupportedPayload,
    #[error("Missing {0}")]
    MissingIdentifiers(String),
    #[error("helpdesk request failed: {0}")]
    Helpdesk(String),
    #[error("embedding request failed: {0}")]
    Embedding(String),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<NormalizeError> for RelayError {
    fn from(err: NormalizeError) -> Self {
        match err {
            NormalizeError::UnsupportedPayload => RelayError::UnsupportedPayload,
            NormalizeError::MissingIdentifiers(what) => RelayError::MissingIdentifiers(what),
        }
    }
}

impl RelayError {
    /// Wrap an upstream helpdesk failure, keeping the full cause chain.
    pub fn helpdesk(err: anyhow::Error) -> Self {
        RelayError::Helpdesk(format!("{:#}", err))
    }

    pub fn embedding(err: anyhow::Error) -> Self {
        RelayError::Embedding(format!("{:#}", err))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::UnsupportedPayload | RelayError::MissingIdentifiers(_) => {
                StatusCode::BAD_REQUEST
            }
            RelayError::Helpdesk(_) | RelayError::Embedding(_) => StatusCode::BAD_GATEWAY,
            RelayError::Completion(CompletionError::Tool { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            RelayError::Completion(_) => StatusCode::BAD_GATEWAY,
            RelayError::Store(_) | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RelayError::UnsupportedPayload => "unsupported_payload",
            RelayError::MissingIdentifiers(_) => "missing_identifiers",
            RelayError::Helpdesk(_) => "helpdesk_error",
            RelayError::Embedding(_) => "embedding_error",
            RelayError::Completion(err) => match err {
                CompletionError::Backend(_) => "llm_error",
                CompletionError::EmptyContent => "empty_content",
                CompletionError::LoopExhausted(_) => "tool_loop_exceeded",
                CompletionError::Tool { .. } => "tool_error",
            },
            RelayError::Store(_) => "store_error",
            RelayError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_distinct() {
        let unsupported = RelayError::from(NormalizeError::UnsupportedPayload);
        let missing =
            RelayError::from(NormalizeError::MissingIdentifiers("account_id".to_string()));
        assert_eq!(unsupported.status(), StatusCode::BAD_REQUEST);
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
        assert_ne!(unsupported.code(), missing.code());
    }

    #[test]
    fn test_upstream_failures_are_bad_gateway() {
        let cases = [
            RelayError::Helpdesk("503".into()),
            RelayError::Embedding("timeout".into()),
            RelayError::Completion(CompletionError::EmptyContent),
            RelayError::Completion(CompletionError::LoopExhausted(2)),
        ];
        for err in cases {
            assert_eq!(err.status(), StatusCode::BAD_GATEWAY, "{}", err);
        }
    }

    #[test]
    fn test_store_corruption_is_internal() {
        let err = RelayError::from(StoreError::Corrupt {
            path: "rag.jsonl".into(),
            line: 3,
            message: "missing field `embedding`".into(),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "store_error");
    }
}
