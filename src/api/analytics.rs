use axum::{body::Bytes, extract::State, Json};
use serde::Serialize;
use tracing::debug;

use crate::{
    analytics::{AnalyticsReport, AnalyticsSubmission},
    app_state::AppState,
    error::{ok, ApiError, ApiResult},
};

use super::parse_body;

#[derive(Serialize)]
pub struct EventReceipt {
    id: String,
}

pub async fn track_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<EventReceipt> {
    let submission: AnalyticsSubmission = parse_body(&body)?;
    let event = state
        .analytics
        .record(submission)
        .map_err(|e| ApiError::validation(e.to_string()))?;

    debug!("[Analytics] {:?} ({})", event.event, event.id);
    ok(EventReceipt { id: event.id })
}

pub async fn report_handler(State(state): State<AppState>) -> Json<AnalyticsReport> {
    Json(state.analytics.report())
}
