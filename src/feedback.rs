//! Valoraciones (pulgar arriba/abajo) de las respuestas de NEXI.
//!
//! Buffer circular en memoria: no se persiste y se pierde al reiniciar.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::chat::FeedbackValue;

pub const FEEDBACK_CAPACITY: usize = 1000;
const MAX_STORED_CONTENT: usize = 500;
const RECENT_LIMIT: usize = 10;
const PREVIEW_LENGTH: usize = 100;

/// Cuerpo de `POST /api/chat/feedback`. Los ids numéricos se aceptan como
/// texto; `feedback` se valida al registrar.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSubmission {
    #[serde(default, deserialize_with = "lenient_string")]
    pub message_id: Option<String>,
    #[serde(default)]
    pub feedback: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message_content: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// `null`, ausente o `""` significan "valoración retirada".
fn parse_feedback(raw: Option<&Value>) -> Result<Option<FeedbackValue>, FeedbackError> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) if s == "positive" => Ok(Some(FeedbackValue::Positive)),
        Some(Value::String(s)) if s == "negative" => Ok(Some(FeedbackValue::Negative)),
        Some(_) => Err(FeedbackError::InvalidFeedback),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEntry {
    pub id: String,
    pub message_id: String,
    pub feedback: Option<FeedbackValue>,
    pub message_content: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackStatistics {
    pub total: usize,
    pub positive: usize,
    pub negative: usize,
    pub positive_rate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackPreview {
    pub id: String,
    pub feedback: Option<FeedbackValue>,
    pub timestamp: String,
    pub content_preview: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FeedbackError {
    #[error("messageId is required")]
    MissingMessageId,
    #[error("feedback must be \"positive\", \"negative\" or null")]
    InvalidFeedback,
}

#[derive(Clone)]
pub struct FeedbackStore {
    entries: Arc<Mutex<VecDeque<FeedbackEntry>>>,
    capacity: usize,
}

impl Default for FeedbackStore {
    fn default() -> Self {
        Self::with_capacity(FEEDBACK_CAPACITY)
    }
}

impl FeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<FeedbackEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Guarda una valoración y devuelve la entrada creada. Si el buffer está
    /// lleno se descarta la más antigua.
    pub fn record(
        &self,
        submission: FeedbackSubmission,
        user_agent: Option<String>,
    ) -> Result<FeedbackEntry, FeedbackError> {
        let message_id = submission
            .message_id
            .filter(|id| !id.is_empty())
            .ok_or(FeedbackError::MissingMessageId)?;
        let feedback = parse_feedback(submission.feedback.as_ref())?;

        let entry = FeedbackEntry {
            id: timestamped_id("fb"),
            message_id,
            feedback,
            message_content: truncate_chars(
                submission.message_content.as_deref().unwrap_or_default(),
                MAX_STORED_CONTENT,
            ),
            timestamp: submission
                .timestamp
                .filter(|ts| !ts.is_empty())
                .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            user_agent: user_agent.filter(|ua| !ua.is_empty()),
        };

        {
            let mut entries = self.lock();
            entries.push_back(entry.clone());
            while entries.len() > self.capacity {
                entries.pop_front();
            }
        }

        let label = match entry.feedback {
            Some(FeedbackValue::Positive) => "positive",
            Some(FeedbackValue::Negative) => "negative",
            None => "removed",
        };
        info!("[Feedback] {label} para el mensaje {}", entry.message_id);
        Ok(entry)
    }

    pub fn statistics(&self) -> FeedbackStatistics {
        let entries = self.lock();
        let total = entries.len();
        let positive = count(&entries, FeedbackValue::Positive);
        let negative = count(&entries, FeedbackValue::Negative);
        FeedbackStatistics {
            total,
            positive,
            negative,
            positive_rate: positive_rate(positive, total),
        }
    }

    /// Las últimas entradas, la más reciente primero.
    pub fn recent(&self) -> Vec<FeedbackPreview> {
        self.lock()
            .iter()
            .rev()
            .take(RECENT_LIMIT)
            .map(|entry| FeedbackPreview {
                id: entry.id.clone(),
                feedback: entry.feedback,
                timestamp: entry.timestamp.clone(),
                content_preview: preview(&entry.message_content),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn entries(&self) -> Vec<FeedbackEntry> {
        self.lock().iter().cloned().collect()
    }
}

fn count(entries: &VecDeque<FeedbackEntry>, value: FeedbackValue) -> usize {
    entries.iter().filter(|e| e.feedback == Some(value)).count()
}

pub fn positive_rate(positive: usize, total: usize) -> String {
    if total == 0 {
        return "N/A".to_string();
    }
    // Redondeo a décimas con empates hacia arriba (6.25 -> 6.3).
    let tenths = (positive as f64 * 1000.0 / total as f64).round() / 10.0;
    format!("{tenths:.1}%")
}

/// `<prefijo>_<millis>_<7 caracteres>`
pub(crate) fn timestamped_id(prefix: &str) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(7).collect();
    format!("{prefix}_{}_{suffix}", Utc::now().timestamp_millis())
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn preview(content: &str) -> String {
    let mut preview = truncate_chars(content, PREVIEW_LENGTH);
    if content.chars().count() > PREVIEW_LENGTH {
        preview.push_str("...");
    }
    preview
}
