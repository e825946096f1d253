//! Tipos del chat de NEXI: mensajes, validación de peticiones y frames SSE.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::llm::{ChatTurn, MessageRole};
use crate::prompt::ErrorMessages;

/// Longitud máxima (en caracteres) de un mensaje del usuario.
pub const MAX_MESSAGE_LENGTH: usize = 300;
/// Turnos máximos que se aceptan por petición.
pub const MAX_CONVERSATION_HISTORY: usize = 6;

static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("regex de etiquetas válida"));

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackValue {
    Positive,
    Negative,
}

#[derive(Debug, thiserror::Error)]
#[error("el mensaje {0} ya está cerrado y no admite más contenido")]
pub struct MessageFrozen(pub String);

/// Un turno de conversación. Mientras `is_streaming` es `true` el contenido
/// sólo puede crecer; tras `finish` queda congelado.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    content: String,
    pub timestamp: DateTime<Utc>,
    is_streaming: bool,
    pub feedback: Option<FeedbackValue>,
}

impl ChatMessage {
    fn new(role: MessageRole, content: String, is_streaming: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
            is_streaming,
            feedback: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content.into(), false)
    }

    /// Respuesta del asistente completa (sin streaming).
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content.into(), false)
    }

    /// Respuesta del asistente vacía que se irá llenando con fragmentos.
    pub fn assistant_streaming() -> Self {
        Self::new(MessageRole::Assistant, String::new(), true)
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    pub fn append(&mut self, fragment: &str) -> Result<(), MessageFrozen> {
        if !self.is_streaming {
            return Err(MessageFrozen(self.id.clone()));
        }
        self.content.push_str(fragment);
        Ok(())
    }

    pub fn finish(&mut self) {
        self.is_streaming = false;
    }

    pub fn set_feedback(&mut self, feedback: Option<FeedbackValue>) {
        self.feedback = feedback;
    }

    pub fn to_turn(&self) -> ChatTurn {
        ChatTurn::new(self.role, self.content.clone())
    }
}

/// Petición ya validada y saneada.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedChat {
    pub messages: Vec<ChatTurn>,
    pub stream: bool,
}

/// Elimina etiquetas HTML y espacios en los extremos.
pub fn sanitize_content(content: &str) -> String {
    HTML_TAG_RE.replace_all(content, "").trim().to_string()
}

/// Valida el cuerpo de `POST /api/chat`. El error es el mensaje para el cliente.
pub fn validate_chat_request(body: &Value) -> Result<ValidatedChat, String> {
    let Some(object) = body.as_object() else {
        return Err("Invalid request body".to_string());
    };

    let messages = match object.get("messages").and_then(Value::as_array) {
        Some(messages) if !messages.is_empty() => messages,
        _ => return Err("Messages array is required".to_string()),
    };

    if messages.len() > MAX_CONVERSATION_HISTORY {
        return Err("Too many messages in conversation".to_string());
    }

    let mut turns = Vec::with_capacity(messages.len());
    for message in messages {
        let role = message.get("role").filter(|r| is_present(r));
        let content = message.get("content").filter(|c| is_present(c));
        let (Some(role), Some(content)) = (role, content) else {
            return Err("Invalid message format".to_string());
        };

        let role = match role.as_str() {
            Some("user") => MessageRole::User,
            Some("assistant") => MessageRole::Assistant,
            _ => return Err("Invalid message role".to_string()),
        };

        let Some(content) = content.as_str() else {
            return Err("Message content must be a string".to_string());
        };

        if role == MessageRole::User && content.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(ErrorMessages::MESSAGE_TOO_LONG.to_string());
        }

        let clean = sanitize_content(content);
        if clean.is_empty() {
            return Err(ErrorMessages::INVALID_MESSAGE.to_string());
        }
        turns.push(ChatTurn::new(role, clean));
    }

    let stream = object.get("stream").and_then(Value::as_bool).unwrap_or(true);
    Ok(ValidatedChat {
        messages: turns,
        stream,
    })
}

/// Valores "vacíos" (null, false, 0, "") cuentan como ausentes.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        _ => true,
    }
}

/// Frame enviado al cliente por SSE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamFrame {
    Content { content: String },
    Done,
    Error { error: String },
}
