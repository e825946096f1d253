//! Analítica de uso del chat: eventos del widget, temas y métricas por sesión.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::feedback::timestamped_id;

pub const ANALYTICS_CAPACITY: usize = 5000;
const RECENT_EVENTS: usize = 20;
const POPULAR_TOPICS: usize = 5;
/// Tiempos de respuesta que se conservan por sesión.
const MAX_RESPONSE_SAMPLES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsEventKind {
    ChatOpened,
    ChatClosed,
    MessageSent,
    ResponseReceived,
    QuickReplyClicked,
    ChatCleared,
}

impl AnalyticsEventKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "chat_opened" => Some(Self::ChatOpened),
            "chat_closed" => Some(Self::ChatClosed),
            "message_sent" => Some(Self::MessageSent),
            "response_received" => Some(Self::ResponseReceived),
            "quick_reply_clicked" => Some(Self::QuickReplyClicked),
            "chat_cleared" => Some(Self::ChatCleared),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Projects,
    Skills,
    Contact,
    Experience,
    General,
    Other,
}

/// Palabras clave por tema. El orden importa: gana el primer tema que
/// coincide.
const TOPIC_KEYWORDS: [(Topic, &[&str]); 5] = [
    (
        Topic::Projects,
        &["project", "built", "work", "portfolio", "case study", "ems", "whatsapp", "naba"],
    ),
    (
        Topic::Skills,
        &["skill", "tech", "technology", "stack", "language", "framework", "react", "node", "python"],
    ),
    (
        Topic::Contact,
        &["contact", "hire", "work with", "email", "reach", "available"],
    ),
    (Topic::Experience, &["experience", "years", "background", "career"]),
    (Topic::General, &["hello", "hi", "hey", "help", "what can you"]),
];

pub fn categorize_message(content: &str) -> Topic {
    let lower = content.to_lowercase();
    TOPIC_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        .map(|(topic, _)| *topic)
        .unwrap_or(Topic::Other)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSubmission {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub id: String,
    pub event: AnalyticsEventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<Topic>,
}

#[derive(Debug, Clone)]
struct SessionMetrics {
    message_count: u64,
    start_time: DateTime<Utc>,
    last_message_time: DateTime<Utc>,
    response_times: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicCount {
    pub topic: Topic,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStats {
    pub total_conversations: usize,
    pub total_messages: u64,
    pub avg_messages_per_conversation: f64,
    pub avg_response_time: u64,
    pub popular_topics: Vec<TopicCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentEvent {
    pub id: String,
    pub event: AnalyticsEventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<Topic>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub statistics: ConversationStats,
    pub recent_events: Vec<RecentEvent>,
    /// Hora UTC (0-23) → eventos de las últimas 24 horas.
    pub hourly_distribution: BTreeMap<u32, usize>,
    pub event_count: usize,
    pub unique_sessions: usize,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AnalyticsError {
    #[error("Invalid event type")]
    InvalidEvent,
}

#[derive(Default)]
struct AnalyticsInner {
    events: VecDeque<AnalyticsEvent>,
    sessions: HashMap<String, SessionMetrics>,
}

#[derive(Clone)]
pub struct AnalyticsStore {
    inner: Arc<Mutex<AnalyticsInner>>,
    capacity: usize,
}

impl Default for AnalyticsStore {
    fn default() -> Self {
        Self::with_capacity(ANALYTICS_CAPACITY)
    }
}

impl AnalyticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AnalyticsInner::default())),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, AnalyticsInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, submission: AnalyticsSubmission) -> Result<AnalyticsEvent, AnalyticsError> {
        self.record_at(submission, Utc::now())
    }

    pub fn record_at(
        &self,
        submission: AnalyticsSubmission,
        now: DateTime<Utc>,
    ) -> Result<AnalyticsEvent, AnalyticsError> {
        let kind = submission
            .event
            .as_deref()
            .and_then(AnalyticsEventKind::parse)
            .ok_or(AnalyticsError::InvalidEvent)?;

        let data = submission.data.unwrap_or_default();
        let topic = data
            .get("messageContent")
            .and_then(Value::as_str)
            .filter(|content| !content.is_empty())
            .map(categorize_message);

        let event = AnalyticsEvent {
            id: timestamped_id("evt"),
            event: kind,
            timestamp: now,
            session_id: submission.session_id.filter(|id| !id.is_empty()),
            data,
            topic,
        };

        let mut inner = self.lock();
        inner.events.push_back(event.clone());
        while inner.events.len() > self.capacity {
            inner.events.pop_front();
        }

        if let Some(session_id) = &event.session_id {
            // Misma cota que el log de eventos: fuera la sesión más antigua.
            if !inner.sessions.contains_key(session_id) && inner.sessions.len() >= self.capacity {
                evict_oldest_session(&mut inner.sessions);
            }
            let metrics = inner
                .sessions
                .entry(session_id.clone())
                .or_insert_with(|| SessionMetrics {
                    message_count: 0,
                    start_time: now,
                    last_message_time: now,
                    response_times: Vec::new(),
                });
            match kind {
                AnalyticsEventKind::MessageSent => {
                    metrics.message_count += 1;
                    metrics.last_message_time = now;
                }
                AnalyticsEventKind::ResponseReceived => {
                    if let Some(ms) = event
                        .data
                        .get("responseTime")
                        .and_then(Value::as_f64)
                        .filter(|ms| *ms > 0.0)
                    {
                        metrics.response_times.push(ms);
                        if metrics.response_times.len() > MAX_RESPONSE_SAMPLES {
                            metrics.response_times.remove(0);
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(event)
    }

    pub fn report(&self) -> AnalyticsReport {
        self.report_at(Utc::now())
    }

    pub fn report_at(&self, now: DateTime<Utc>) -> AnalyticsReport {
        let inner = self.lock();

        let recent_events = inner
            .events
            .iter()
            .rev()
            .take(RECENT_EVENTS)
            .map(|e| RecentEvent {
                id: e.id.clone(),
                event: e.event,
                timestamp: e.timestamp,
                topic: e.topic,
            })
            .collect();

        let since = now - Duration::hours(24);
        let mut hourly_distribution = BTreeMap::new();
        for event in inner.events.iter().filter(|e| e.timestamp > since) {
            *hourly_distribution.entry(event.timestamp.hour()).or_insert(0) += 1;
        }

        AnalyticsReport {
            statistics: conversation_stats(&inner),
            recent_events,
            hourly_distribution,
            event_count: inner.events.len(),
            unique_sessions: inner.sessions.len(),
        }
    }

    /// Tiempo entre el primer evento de la sesión y su último mensaje.
    pub fn session_duration(&self, session_id: &str) -> Option<Duration> {
        self.lock()
            .sessions
            .get(session_id)
            .map(|m| m.last_message_time - m.start_time)
    }
}

fn evict_oldest_session(sessions: &mut HashMap<String, SessionMetrics>) {
    let oldest = sessions
        .iter()
        .min_by_key(|(_, metrics)| metrics.start_time)
        .map(|(id, _)| id.clone());
    if let Some(id) = oldest {
        sessions.remove(&id);
    }
}

fn conversation_stats(inner: &AnalyticsInner) -> ConversationStats {
    let total_conversations = inner.sessions.len();
    let total_messages: u64 = inner.sessions.values().map(|m| m.message_count).sum();

    let response_times: Vec<f64> = inner
        .sessions
        .values()
        .flat_map(|m| m.response_times.iter().copied())
        .collect();
    let avg_response_time = if response_times.is_empty() {
        0
    } else {
        (response_times.iter().sum::<f64>() / response_times.len() as f64).round() as u64
    };

    // Orden de primera aparición como desempate.
    let mut topics: Vec<TopicCount> = Vec::new();
    for event in inner
        .events
        .iter()
        .filter(|e| e.event == AnalyticsEventKind::MessageSent)
    {
        let topic = event.topic.unwrap_or(Topic::Other);
        match topics.iter_mut().find(|t| t.topic == topic) {
            Some(entry) => entry.count += 1,
            None => topics.push(TopicCount { topic, count: 1 }),
        }
    }
    topics.sort_by(|a, b| b.count.cmp(&a.count));
    topics.truncate(POPULAR_TOPICS);

    ConversationStats {
        total_conversations,
        total_messages,
        avg_messages_per_conversation: if total_conversations > 0 {
            total_messages as f64 / total_conversations as f64
        } else {
            0.0
        },
        avg_response_time,
        popular_topics: topics,
    }
}
