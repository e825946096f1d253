//! Abstracción sobre los proveedores de IA compatibles con la API de OpenAI
//! (OpenAI y Groq). El proveedor se elige una vez al arrancar; el resto de la
//! aplicación sólo ve el trait `CompletionProvider`.
//!
//! No hay reintentos: un fallo del proveedor se propaga tal cual y el handler
//! lo traduce a un mensaje genérico.

use std::pin::Pin;

use anyhow::{anyhow, Result};
use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::ProviderConfig;

/// Temperatura fija para todas las peticiones.
const TEMPERATURE: f32 = 0.7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Un turno de conversación tal y como se envía al proveedor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: MessageRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompletionRequest {
    /// Turnos previos más el nuevo turno del usuario (sin el prompt de sistema).
    pub messages: Vec<ChatTurn>,
    pub system_prompt: String,
    /// Si es `None` se usa el valor de configuración.
    pub max_tokens: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API key no configurada para el proveedor {0}")]
    NotConfigured(&'static str),

    #[error("error de red con el proveedor: {0}")]
    Http(#[from] reqwest::Error),

    #[error("el proveedor respondió con estado {0}")]
    Status(u16),

    #[error("respuesta del proveedor sin contenido")]
    EmptyBody,
}

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Interfaz común de completions, en streaming y de una sola vez.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    fn model(&self) -> &str;

    /// Devuelve los fragmentos de texto a medida que llegan. Si el consumidor
    /// suelta el stream, la conexión HTTP con el proveedor se cierra.
    fn stream_completion(&self, request: CompletionRequest) -> FragmentStream;

    /// Espera la respuesta completa.
    async fn completion(&self, request: CompletionRequest) -> Result<String, ProviderError>;
}

// ---------------------------------------------------------------------
// FORMATO DE LA API
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatCompletionBody {
    model: String,
    messages: Vec<ChatTurn>,
    max_tokens: u32,
    stream: bool,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
}

/// Evento de una línea Server-Sent Events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Content(String),
    Done,
}

/// Interpreta una línea SSE. Líneas vacías, comentarios, chunks sin contenido
/// y JSON mal formado devuelven `None`.
pub fn parse_sse_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    if line == "data: [DONE]" {
        return Some(StreamEvent::Done);
    }

    let data = line.strip_prefix("data: ")?;
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(StreamEvent::Content),
        Err(e) => {
            debug!("Saltando chunk mal formado ({e}): {line}");
            None
        }
    }
}

/// Acumula bytes del cuerpo y entrega líneas completas; la última línea
/// incompleta se queda en el buffer hasta el siguiente chunk.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Lo que quede sin salto de línea final.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

// ---------------------------------------------------------------------
// GESTOR
// ---------------------------------------------------------------------

/// Gestor del proveedor de IA activo.
#[derive(Debug, Clone)]
pub struct LlmManager {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración. Falla si no hay API key.
    ///
    /// `timeout` limita la conexión y cada lectura, no la duración total: una
    /// respuesta en streaming puede durar lo que tarde el modelo.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(anyhow!(ProviderError::NotConfigured(config.provider.name())));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .build()?;
        Ok(Self {
            config: config.clone(),
            http,
        })
    }

    fn body(&self, request: CompletionRequest, stream: bool) -> ChatCompletionBody {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(ChatTurn::new(MessageRole::System, request.system_prompt));
        messages.extend(request.messages);
        ChatCompletionBody {
            model: self.config.model.clone(),
            messages,
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            stream,
            temperature: TEMPERATURE,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }
}

/// Envía la petición y convierte los estados no-2xx en `ProviderError::Status`.
/// El cuerpo del error sólo se registra en el log.
async fn send(
    http: &reqwest::Client,
    config: &ProviderConfig,
    endpoint: &str,
    body: &ChatCompletionBody,
) -> Result<reqwest::Response, ProviderError> {
    let mut request = http.post(endpoint).bearer_auth(&config.api_key).json(body);
    if !body.stream {
        // Sin streaming sí hay plazo para la petición completa.
        request = request.timeout(config.timeout);
    }
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        error!(
            "Error del proveedor de IA ({}): {} {}",
            config.provider.name(),
            status,
            detail
        );
        return Err(ProviderError::Status(status.as_u16()));
    }
    Ok(response)
}

#[async_trait]
impl CompletionProvider for LlmManager {
    fn provider_name(&self) -> &'static str {
        self.config.provider.name()
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn stream_completion(&self, request: CompletionRequest) -> FragmentStream {
        let http = self.http.clone();
        let config = self.config.clone();
        let endpoint = self.endpoint();
        let body = self.body(request, true);

        Box::pin(stream! {
            let response = match send(&http, &config, &endpoint, &body).await {
                Ok(response) => response,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let mut bytes = response.bytes_stream();
            let mut lines = SseLineBuffer::default();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(ProviderError::Http(e));
                        return;
                    }
                };
                for line in lines.push(&chunk) {
                    match parse_sse_line(&line) {
                        Some(StreamEvent::Content(text)) => {
                            yield Ok(text);
                        }
                        Some(StreamEvent::Done) => return,
                        None => {}
                    }
                }
            }

            // Cuerpo terminado sin `[DONE]` ni salto de línea final.
            if let Some(StreamEvent::Content(text)) = lines.finish().as_deref().and_then(parse_sse_line) {
                yield Ok(text);
            }
        })
    }

    async fn completion(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let body = self.body(request, false);
        let response = send(&self.http, &self.config, &self.endpoint(), &body).await?;
        let parsed: ChatCompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or(ProviderError::EmptyBody)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmProvider;
    use std::time::Duration;

    fn config() -> ProviderConfig {
        ProviderConfig {
            provider: LlmProvider::Groq,
            model: "llama-3.1-8b-instant".into(),
            api_key: "gsk_test".into(),
            max_tokens: 500,
            base_url: "https://api.groq.com/openai/v1".into(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn parse_content_chunk() {
        let line = r#"data: {"id":"c1","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        assert_eq!(parse_sse_line(line), Some(StreamEvent::Content("Hello".into())));
    }

    #[test]
    fn parse_done_marker() {
        assert_eq!(parse_sse_line("data: [DONE]\n"), Some(StreamEvent::Done));
    }

    #[test]
    fn parse_skips_noise() {
        assert_eq!(parse_sse_line(""), None);
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line("event: ping"), None);
        assert_eq!(parse_sse_line("data: {not json"), None);
        // Chunk final sin contenido.
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#),
            None
        );
    }

    #[test]
    fn line_buffer_keeps_partial_lines() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(b"data: {\"cho").is_empty());
        let lines = buffer.push(b"ices\":[]}\n\ndata: [DO");
        assert_eq!(lines, vec!["data: {\"choices\":[]}\n".to_string(), "\n".to_string()]);
        assert_eq!(buffer.finish().as_deref(), Some("data: [DO"));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn line_buffer_handles_split_utf8() {
        let mut buffer = SseLineBuffer::default();
        let text = "data: ñ\n".as_bytes();
        assert!(buffer.push(&text[..7]).is_empty());
        assert_eq!(buffer.push(&text[7..]), vec!["data: ñ\n".to_string()]);
    }

    #[test]
    fn body_prepends_system_prompt() {
        let manager = LlmManager::from_config(&config()).unwrap();
        let body = manager.body(
            CompletionRequest {
                messages: vec![ChatTurn::new(MessageRole::User, "hi")],
                system_prompt: "You are NEXI".into(),
                max_tokens: None,
            },
            true,
        );
        assert_eq!(body.messages[0], ChatTurn::new(MessageRole::System, "You are NEXI"));
        assert_eq!(body.messages[1].role, MessageRole::User);
        assert_eq!(body.max_tokens, 500);
        assert!(body.stream);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["model"], "llama-3.1-8b-instant");
    }

    #[test]
    fn empty_key_is_rejected() {
        let mut cfg = config();
        cfg.api_key = "  ".into();
        assert!(LlmManager::from_config(&cfg).is_err());
    }
}
