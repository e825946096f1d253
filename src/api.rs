mod analytics;
mod chat;
mod contact;
mod feedback;
mod projects;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use crate::{app_state::AppState, error::ApiError};

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        // Portfolio (CRUD)
        .route(
            "/api/projects",
            get(projects::list_handler).post(projects::create_handler),
        )
        .route("/api/projects/featured", get(projects::featured_handler))
        .route(
            "/api/projects/:id",
            get(projects::get_handler)
                .put(projects::update_handler)
                .delete(projects::delete_handler),
        )
        .route(
            "/api/contact",
            get(contact::list_handler).post(contact::create_handler),
        )
        .route("/api/contact/:id", get(contact::get_handler))
        .route("/api/contact/:id/read", put(contact::mark_read_handler))
        // NEXI
        .route("/api/chat", get(chat::status_handler).post(chat::chat_handler))
        .route(
            "/api/chat/feedback",
            get(feedback::stats_handler).post(feedback::submit_handler),
        )
        .route(
            "/api/chat/analytics",
            get(analytics::report_handler).post(analytics::track_handler),
        )
        .fallback(not_found_handler)
        .with_state(app_state)
}

// --- Handlers comunes ---

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.database.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            warn!("La base de datos no responde: {e:#}");
            "disconnected"
        }
    };
    Json(json!({
        "status": "ok",
        "message": "Backend server is running",
        "database": database,
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "Route not found" })),
    )
}

/// Deserializa el cuerpo a mano para devolver siempre el sobre de error
/// propio en vez del rechazo por defecto de axum.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        debug!("Cuerpo JSON inválido: {e}");
        ApiError::validation("Invalid JSON body")
    })
}
