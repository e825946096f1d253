use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use portfolio_nexi_webapp::{
    api,
    app_state::AppState,
    config::AppConfig,
    error::expose_internal_errors,
    llm::LlmManager,
    neo4j_client,
    portfolio::{context_summary, PortfolioContext},
    repository::Neo4jRepository,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Cargar configuración (falta de claves = error fatal)
    let cfg = AppConfig::from_env().context("Error al cargar la configuración")?;
    expose_internal_errors(cfg.environment.is_development());
    info!(
        "Entorno: {} | proveedor IA: {} ({})",
        cfg.environment.name(),
        cfg.provider.provider.name(),
        cfg.provider.model
    );

    // 3. Conectar a Neo4j y asegurar esquemas
    let graph = neo4j_client::connect_from_config(&cfg)
        .await
        .context("Error conectando a Neo4j")?;
    neo4j_client::ensure_schema(&graph)
        .await
        .context("Error asegurando el esquema de Neo4j")?;
    let repository = Arc::new(Neo4jRepository::new(Arc::new(graph)));

    // 4. Contexto del portfolio y proveedor de IA
    let portfolio = PortfolioContext::load(&cfg.portfolio_context_path)?;
    info!("{}", context_summary(&portfolio));
    let llm = LlmManager::from_config(&cfg.provider).context("Error inicializando el proveedor de IA")?;

    // 5. Estado compartido
    let app_state = AppState::new(repository, Arc::new(llm), cfg.rate_limits, portfolio);
    let _purge = app_state.rate_limiter.spawn_purge_task();

    // 6. Router con CORS para el frontend y trazas HTTP
    let origin = HeaderValue::from_str(&cfg.frontend_url)
        .with_context(|| format!("FRONTEND_URL inválida: {}", cfg.frontend_url))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let app = api::create_router(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // 7. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {}", cfg.server_addr))?;
    info!("🚀 Servidor escuchando en http://{}", cfg.server_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
        info!("Señal de apagado recibida, iniciando cierre del servidor.");
    })
    .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
