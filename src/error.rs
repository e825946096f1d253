//! Errores de la API y sobre `{success, ...}` común a todas las respuestas.
//!
//! Cada handler devuelve `ApiResult<T>`; la traducción a código HTTP y a JSON
//! se hace aquí, una sola vez.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::error;

static EXPOSE_INTERNAL_ERRORS: AtomicBool = AtomicBool::new(false);

/// Activa el detalle de errores internos en las respuestas (sólo desarrollo).
pub fn expose_internal_errors(enabled: bool) {
    EXPOSE_INTERNAL_ERRORS.store(enabled, Ordering::Relaxed);
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("{0}")]
    ProviderUnavailable(String),

    /// `public` es el mensaje genérico de la operación; `cause` sólo se
    /// muestra al cliente en desarrollo.
    #[error("{public}: {cause:#}")]
    Internal {
        public: &'static str,
        cause: anyhow::Error,
    },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn internal(public: &'static str, cause: impl Into<anyhow::Error>) -> Self {
        Self::Internal {
            public,
            cause: cause.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Internal { public, cause } => {
                error!("{public}: {cause:#}");
                let body = if EXPOSE_INTERNAL_ERRORS.load(Ordering::Relaxed) {
                    json!({
                        "success": false,
                        "error": cause.to_string(),
                        "detail": format!("{cause:?}"),
                    })
                } else {
                    json!({ "success": false, "error": public })
                };
                (status, Json(body)).into_response()
            }
            Self::RateLimited {
                message,
                retry_after,
            } => {
                let mut response =
                    (status, Json(json!({ "success": false, "error": message }))).into_response();
                if let Some(secs) = retry_after.map(|d| d.as_secs().max(1)) {
                    if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                        response.headers_mut().insert(header::RETRY_AFTER, value);
                    }
                }
                response
            }
            Self::Validation(message)
            | Self::NotFound(message)
            | Self::ProviderUnavailable(message) => {
                (status, Json(json!({ "success": false, "error": message }))).into_response()
            }
        }
    }
}

/// Respuesta satisfactoria: `{"success": true, ...payload}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub payload: T,
}

pub type ApiResult<T> = Result<(StatusCode, Json<Envelope<T>>), ApiError>;

pub fn ok<T: Serialize>(payload: T) -> ApiResult<T> {
    Ok((
        StatusCode::OK,
        Json(Envelope {
            success: true,
            payload,
        }),
    ))
}

pub fn created<T: Serialize>(payload: T) -> ApiResult<T> {
    Ok((
        StatusCode::CREATED,
        Json(Envelope {
            success: true,
            payload,
        }),
    ))
}
