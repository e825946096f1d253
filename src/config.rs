//! Carga y gestión de configuración de la aplicación (servidor, Neo4j, proveedor
//! de IA, límites de uso y contexto del portfolio).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::rate_limiter::RateLimitConfig;

/// Proveedores de IA soportados. El proveedor se elige una sola vez al arrancar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Groq,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "groq" => Ok(Self::Groq),
            other => Err(anyhow!("Proveedor de IA no soportado: {other}")),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Groq => "groq",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o-mini",
            Self::Groq => "llama-3.1-8b-instant",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAI => "https://api.openai.com/v1",
            Self::Groq => "https://api.groq.com/openai/v1",
        }
    }

    /// Variable de entorno que contiene la API key de este proveedor.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Groq => "GROQ_API_KEY",
        }
    }
}

/// Entorno de ejecución (`NODE_ENV`). Sólo en desarrollo se exponen detalles
/// de los errores internos al cliente.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "test" => Self::Test,
            _ => Self::Development,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Configuración del proveedor de IA activo.
#[derive(Clone)]
pub struct ProviderConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub api_key: String,
    pub max_tokens: u32,
    pub base_url: String,
    pub timeout: Duration,
}

// La API key nunca aparece en los logs.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub frontend_url: String,
    pub environment: Environment,

    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,

    pub provider: ProviderConfig,
    pub rate_limits: RateLimitConfig,
    pub portfolio_context_path: PathBuf,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env`, pero leyendo las variables desde `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_or(var("PORT"), 4000);
        let server_addr = format!("{host}:{port}");

        let frontend_url =
            var("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".to_string());
        let environment = Environment::from_str(
            &var("NODE_ENV").unwrap_or_else(|| "development".to_string()),
        );

        let neo4j_uri = var("NEO4J_URI").unwrap_or_else(|| "bolt://localhost:7687".to_string());
        let neo4j_user = var("NEO4J_USER").unwrap_or_else(|| "neo4j".to_string());
        let neo4j_password =
            var("NEO4J_PASSWORD").ok_or_else(|| anyhow!("Falta NEO4J_PASSWORD en el entorno"))?;

        let provider =
            LlmProvider::from_str(&var("AI_PROVIDER").unwrap_or_else(|| "groq".to_string()))?;
        let api_key = var(provider.api_key_var()).ok_or_else(|| {
            anyhow!(
                "Falta {} en el entorno (proveedor de IA seleccionado: {})",
                provider.api_key_var(),
                provider.name()
            )
        })?;
        let provider = ProviderConfig {
            provider,
            model: var("AI_MODEL").unwrap_or_else(|| provider.default_model().to_string()),
            api_key,
            max_tokens: parse_or(var("AI_MAX_TOKENS"), 500),
            base_url: var("AI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| provider.default_base_url().to_string()),
            timeout: Duration::from_secs(parse_or(var("AI_TIMEOUT_SECS"), 30)),
        };

        let defaults = RateLimitConfig::default();
        let rate_limits = RateLimitConfig {
            per_minute: parse_or(var("RATE_LIMIT_PER_MINUTE"), defaults.per_minute),
            per_hour: parse_or(var("RATE_LIMIT_PER_HOUR"), defaults.per_hour),
            per_day: parse_or(var("RATE_LIMIT_PER_DAY"), defaults.per_day),
            daily_limit_is_soft: parse_or(var("RATE_LIMIT_DAILY_SOFT"), false),
        };

        let portfolio_context_path = PathBuf::from(
            var("PORTFOLIO_CONTEXT_PATH")
                .unwrap_or_else(|| "data/portfolio-context.json".to_string()),
        );

        Ok(Self {
            server_addr,
            frontend_url,
            environment,
            neo4j_uri,
            neo4j_user,
            neo4j_password,
            provider,
            rate_limits,
            portfolio_context_path,
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
