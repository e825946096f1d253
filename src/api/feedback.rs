use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::{
    app_state::AppState,
    error::{ok, ApiError, ApiResult},
    feedback::FeedbackSubmission,
};

use super::parse_body;

#[derive(Serialize)]
pub struct FeedbackReceipt {
    id: String,
}

pub async fn submit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<FeedbackReceipt> {
    let submission: FeedbackSubmission = parse_body(&body)?;
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let entry = state
        .feedback
        .record(submission, user_agent)
        .map_err(|e| ApiError::validation(e.to_string()))?;
    ok(FeedbackReceipt { id: entry.id })
}

pub async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "statistics": state.feedback.statistics(),
        "recent": state.feedback.recent(),
    }))
}
