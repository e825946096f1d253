use std::{net::SocketAddr, time::Duration};

use async_stream::stream;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::{
    app_state::AppState,
    chat::{validate_chat_request, ChatMessage, StreamFrame},
    error::{ok, ApiError},
    llm::{ChatTurn, CompletionRequest, FragmentStream},
    prompt::{welcome_message, ErrorMessages},
    rate_limiter::{client_ip, RateLimitDecision},
};

use super::parse_body;

#[derive(Serialize)]
pub struct ReplyPayload {
    message: ChatTurn,
}

pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "NEXI chat API is ready",
        "provider": state.llm.provider_name(),
        "model": state.llm.model(),
        "welcome": welcome_message(&state.portfolio),
    }))
}

pub async fn chat_handler(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    // 1. Límite de peticiones, antes de leer el cuerpo.
    let ip = client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    let decision = state.rate_limiter.check(&ip);
    let remaining = match &decision {
        RateLimitDecision::Rejected { window, .. } => {
            let retry_after = decision.retry_after_secs();
            info!(
                "[Chat] Petición rechazada por límite {} (reintentar en {}s)",
                window.name(),
                retry_after.unwrap_or_default()
            );
            return Err(ApiError::RateLimited {
                message: ErrorMessages::RATE_LIMITED.to_string(),
                retry_after: retry_after.map(Duration::from_secs),
            });
        }
        RateLimitDecision::Allowed { remaining, warning } => {
            if let Some(warning) = warning {
                warn!("[Chat] {warning}");
            }
            *remaining
        }
    };

    // 2. Validación y saneado.
    let body: Value = parse_body(&body)?;
    let chat = validate_chat_request(&body).map_err(ApiError::validation)?;

    let request = CompletionRequest {
        messages: chat.messages,
        system_prompt: state.system_prompt.to_string(),
        max_tokens: None,
    };

    // 3a. Respuesta completa.
    if !chat.stream {
        let content = state.llm.completion(request).await.map_err(|e| {
            error!("[Chat] Error del proveedor {}: {e}", state.llm.provider_name());
            ApiError::ProviderUnavailable(ErrorMessages::PROVIDER_UNAVAILABLE.to_string())
        })?;
        let reply = ChatMessage::assistant(content);
        return Ok(ok(ReplyPayload {
            message: reply.to_turn(),
        })
        .into_response());
    }

    // 3b. Streaming SSE.
    let events = relay_frames(state.llm.stream_completion(request))
        .map(|frame| Event::default().json_data(frame));
    let mut response = Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response();

    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-transform"),
    );
    response_headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    response_headers.insert(
        HeaderName::from_static("x-ratelimit-remaining"),
        HeaderValue::from(remaining),
    );
    Ok(response)
}

/// Convierte los fragmentos del proveedor en frames para el cliente.
///
/// Siempre termina con `done` o con un único `error`. Si el cliente se
/// desconecta, axum suelta este stream y con él la conexión al proveedor.
fn relay_frames(mut fragments: FragmentStream) -> impl Stream<Item = StreamFrame> + Send {
    stream! {
        let mut reply = ChatMessage::assistant_streaming();
        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(text) if text.is_empty() => {}
                Ok(text) => {
                    if let Err(e) = reply.append(&text) {
                        warn!("[Chat] {e}");
                        break;
                    }
                    yield StreamFrame::Content { content: text };
                }
                Err(e) => {
                    error!("[Chat] Error durante el streaming: {e}");
                    yield StreamFrame::Error {
                        error: ErrorMessages::GENERIC_ERROR.to_string(),
                    };
                    return;
                }
            }
        }
        reply.finish();
        debug!("[Chat] Respuesta completa ({} caracteres)", reply.content().chars().count());
        yield StreamFrame::Done;
    }
}
