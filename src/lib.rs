//! Backend del portfolio: API de proyectos y contacto sobre Neo4j y relay
//! del asistente NEXI (OpenAI / Groq) con límite de peticiones, feedback y
//! analítica en memoria.

pub mod analytics;
pub mod api;
pub mod app_state;
pub mod chat;
pub mod config;
pub mod error;
pub mod feedback;
pub mod llm;
pub mod models;
pub mod neo4j_client;
pub mod portfolio;
pub mod prompt;
pub mod rate_limiter;
pub mod repository;
