use std::sync::Arc;

use crate::{
    analytics::AnalyticsStore,
    feedback::FeedbackStore,
    llm::CompletionProvider,
    portfolio::PortfolioContext,
    prompt::build_system_prompt,
    rate_limiter::{RateLimitConfig, RateLimiter},
    repository::{ContactRepository, HealthCheck, ProjectRepository},
};

/// Estado compartido por todos los handlers. Clonarlo sólo copia `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub projects: Arc<dyn ProjectRepository>,
    pub contacts: Arc<dyn ContactRepository>,
    pub database: Arc<dyn HealthCheck>,
    pub llm: Arc<dyn CompletionProvider>,
    pub rate_limiter: RateLimiter,
    pub feedback: FeedbackStore,
    pub analytics: AnalyticsStore,
    pub portfolio: Arc<PortfolioContext>,
    /// Calculado una vez al arrancar; el contexto no cambia.
    pub system_prompt: Arc<str>,
}

impl AppState {
    pub fn new<S>(
        store: Arc<S>,
        llm: Arc<dyn CompletionProvider>,
        rate_limits: RateLimitConfig,
        portfolio: PortfolioContext,
    ) -> Self
    where
        S: ProjectRepository + ContactRepository + HealthCheck + 'static,
    {
        let system_prompt: Arc<str> = build_system_prompt(&portfolio).into();
        Self {
            projects: store.clone(),
            contacts: store.clone(),
            database: store,
            llm,
            rate_limiter: RateLimiter::new(rate_limits),
            feedback: FeedbackStore::new(),
            analytics: AnalyticsStore::new(),
            portfolio: Arc::new(portfolio),
            system_prompt,
        }
    }
}
