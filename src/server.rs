//! HTTP server for helpdesk webhooks.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/webhook/chatwoot` | Chatwoot `message_created` webhook |
//!
//! # Responses
//!
//! ```json
//! { "ok": true }
//! { "ignored": true, "reason": "not_incoming" }
//! { "error": { "code": "missing_identifiers", "message": "Missing account_id or conversation_id" } }
//! ```
//!
//! Error codes and statuses are listed on [`RelayError`].

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::OpenAiEmbedder;
use crate::error::RelayError;
use crate::helpdesk::ChatwootClient;
use crate::jsonl_store::JsonlStore;
use crate::llm::OpenAiChat;
use crate::pipeline::{handle_webhook, AppState, Outcome, StoreOpener};
use relay_core::embedding::Embedder;
use relay_core::store::EmbeddingStore;

/// Build production collaborators from `config`.
pub fn build_state(config: Config) -> anyhow::Result<AppState> {
    let helpdesk = ChatwootClient::from_config(&config)?;
    let chat = OpenAiChat::from_config(&config)?;
    let embedder: Option<Arc<dyn Embedder>> = if config.rag.enabled {
        Some(Arc::new(OpenAiEmbedder::from_config(&config)?))
    } else {
        None
    };

    let store_path = config.rag.store_path.clone();
    let store: StoreOpener = Arc::new(move || {
        Arc::new(JsonlStore::open(store_path.clone())) as Arc<dyn EmbeddingStore>
    });

    Ok(AppState {
        config: Arc::new(config),
        helpdesk: Arc::new(helpdesk),
        chat: Arc::new(chat),
        embedder,
        store,
    })
}

/// The application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/webhook/chatwoot", post(handle_chatwoot))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `[server].bind` and serve until the process is terminated.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = build_state(config)?;

    info!(
        bind = %bind_addr,
        mode = ?state.config.helpdesk.mode,
        rag = state.config.rag.enabled,
        tools = state.config.tools.enabled,
        "relay listening"
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError(RelayError);

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.0.code().to_string(),
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /webhook/chatwoot ============

async fn handle_chatwoot(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let request_id = Uuid::new_v4();
    let payload: Value =
        serde_json::from_slice(&body).map_err(|_| RelayError::UnsupportedPayload)?;
    let event = payload
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let span = tracing::info_span!("webhook", %request_id, event = %event);
    let result = handle_webhook(&state, &payload).instrument(span.clone()).await;

    match result {
        Ok(Outcome::Ignored(reason)) => Ok((
            StatusCode::OK,
            Json(json!({ "ignored": true, "reason": reason.as_str() })),
        )),
        Ok(Outcome::Replied { .. }) => Ok((StatusCode::OK, Json(json!({ "ok": true })))),
        Err(err) => {
            span.in_scope(|| {
                if err.status().is_server_error() {
                    error!(code = err.code(), error = %err, "webhook failed");
                } else {
                    warn!(code = err.code(), error = %err, "webhook rejected");
                }
            });
            Err(err.into())
        }
    }
}
