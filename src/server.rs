//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Answer a visitor message for one owner (cross-origin) |
//! | `OPTIONS` | `/chat` | Cross-origin preflight |
//! | `POST` | `/settings` | Create or replace an owner's configuration |
//! | `POST` | `/settings/get` | Read an owner's configuration (`null` if none) |
//! | `GET` | `/chatbot.js` | The embeddable widget script |
//! | `GET` | `/health` | Health check (returns version) |
//!
//! # Chat pipeline
//!
//! `POST /chat` runs parse → resolve → assemble → invoke → respond. Each
//! stage either hands its output to the next or ends the request with a
//! [`ChatError`]; nothing is retried.
//!
//! # CORS
//!
//! The chat routes are called from arbitrary third-party sites, so every
//! response on them (success, error, preflight, 405) carries
//! `Access-Control-Allow-Origin: *` plus the allowed methods and headers.
//! The headers are set by one response layer wrapping the chat routes
//! rather than by each handler. The settings routes serve the owner
//! dashboard and are not decorated.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
        },
        HeaderValue, StatusCode,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{self, TraceLayer};
use tracing::{error, info, Level};

use crate::completion::{create_completer, Completer};
use crate::config::Config;
use crate::db;
use crate::error::{ChatError, INVALID_PAYLOAD, MISSING_CHAT_FIELDS, MISSING_OWNER_ID};
use crate::models::{ChatConfiguration, ChatReply, ChatRequest, SettingsLookup, SettingsRequest};
use crate::prompt::build_prompt;
use crate::store::{ConfigStore, SqliteStore};

/// The widget script, served as-is. It is owner-agnostic; the owner id comes
/// from the `data-owner-id` attribute of the embedding `<script>` tag.
pub const EMBED_SCRIPT: &str = include_str!("../assets/chatbot.js");

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn ConfigStore>,
    completer: Arc<dyn Completer>,
}

impl AppState {
    pub fn new(store: Arc<dyn ConfigStore>, completer: Arc<dyn Completer>) -> Self {
        Self { store, completer }
    }
}

/// Starts the HTTP server on `[server].bind` and runs until Ctrl-C.
///
/// The store connection is not opened here; the first request that needs
/// it establishes it.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = Arc::new(SqliteStore::new(db::lazy_pool(&config.db)));
    let completer = create_completer(&config.completion)?;

    info!(
        bind = %config.server.bind,
        provider = %config.completion.provider,
        model = completer.model_name(),
        "deskbot server starting"
    );

    let app = router(AppState::new(store, completer));
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let chat = with_chat_cors(
        Router::new().route("/chat", post(handle_chat).options(handle_preflight)),
    );

    Router::new()
        .merge(chat)
        .route("/settings", post(handle_settings_upsert))
        .route("/settings/get", post(handle_settings_get))
        .route("/chatbot.js", get(handle_embed_script))
        .route("/health", get(handle_health))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Applies the cross-origin header set to every response of `routes`.
fn with_chat_cors<S>(routes: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    routes
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
}

// ============ POST /chat ============

/// Handler for `POST /chat`.
///
/// Returns 400 for missing fields or an unconfigured owner, 500 when the
/// store or the model fails, and `{ reply }` otherwise.
async fn handle_chat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ChatReply>, ChatError> {
    // Parse
    let request =
        ChatRequest::from_json(&body).ok_or(ChatError::Validation(MISSING_CHAT_FIELDS))?;
    info!(
        owner_id = %request.owner_id,
        message_len = request.message.len(),
        "chat request"
    );

    // Resolve
    let config = state
        .store
        .find(&request.owner_id)
        .await
        .map_err(|e| {
            error!(owner_id = %request.owner_id, error = %e, "configuration lookup failed");
            ChatError::Upstream(format!("chat error {e}"))
        })?
        .ok_or_else(|| {
            info!(owner_id = %request.owner_id, "chat bot not configured");
            ChatError::NotConfigured
        })?;

    // Assemble
    let prompt = build_prompt(&config, &request.message);

    // Invoke
    let reply = state.completer.complete(&prompt).await.map_err(|e| {
        error!(
            owner_id = %request.owner_id,
            model = state.completer.model_name(),
            error = %e,
            "completion failed"
        );
        ChatError::Upstream(format!("chat error {e}"))
    })?;

    Ok(Json(ChatReply { reply }))
}

/// Handler for `OPTIONS /chat`. The CORS layer supplies the headers.
async fn handle_preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

// ============ POST /settings ============

async fn handle_settings_upsert(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ChatConfiguration>, ChatError> {
    let request: SettingsRequest =
        serde_json::from_slice(&body).map_err(|_| ChatError::Validation(INVALID_PAYLOAD))?;
    let update = request
        .into_update()
        .ok_or(ChatError::Validation(MISSING_OWNER_ID))?;

    let stored = state.store.upsert(&update).await.map_err(|e| {
        error!(owner_id = %update.owner_id, error = %e, "settings write failed");
        ChatError::Upstream(format!("settings error {e}"))
    })?;

    info!(owner_id = %stored.owner_id, "settings saved");
    Ok(Json(stored))
}

// ============ POST /settings/get ============

async fn handle_settings_get(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Option<ChatConfiguration>>, ChatError> {
    let lookup: SettingsLookup =
        serde_json::from_slice(&body).map_err(|_| ChatError::Validation(INVALID_PAYLOAD))?;
    let owner_id = lookup
        .owner_id()
        .ok_or(ChatError::Validation(MISSING_OWNER_ID))?;

    let found = state.store.find(&owner_id).await.map_err(|e| {
        error!(owner_id = %owner_id, error = %e, "settings read failed");
        ChatError::Upstream(format!("get settings error {e}"))
    })?;

    Ok(Json(found))
}

// ============ GET /chatbot.js ============

async fn handle_embed_script() -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "application/javascript; charset=utf-8")],
        EMBED_SCRIPT,
    )
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
