use crate::config::AppConfig;
use anyhow::Result;
use neo4rs::{query, Graph};
use tracing::info;
use url::Url;

pub async fn connect_from_config(cfg: &AppConfig) -> Result<Graph> {
    let url = Url::parse(&cfg.neo4j_uri)?;
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(7687);
    let addr = format!("{host}:{port}");

    info!("Conectando a Neo4j en {}...", redact_uri(&cfg.neo4j_uri));
    let graph = Graph::new(&addr, &cfg.neo4j_user, &cfg.neo4j_password).await?;
    info!("Conexión a Neo4j OK");
    Ok(graph)
}

/// Crea constraints básicos para las etiquetas usadas: :Project y :Contact.
pub async fn ensure_schema(graph: &Graph) -> Result<()> {
    let statements = [
        "CREATE CONSTRAINT project_id IF NOT EXISTS
         FOR (p:Project)
         REQUIRE p.id IS UNIQUE",
        "CREATE CONSTRAINT contact_id IF NOT EXISTS
         FOR (c:Contact)
         REQUIRE c.id IS UNIQUE",
        // Listados ordenados por fecha y filtrados por destacado/leído.
        "CREATE INDEX project_featured_created IF NOT EXISTS
         FOR (p:Project) ON (p.featured, p.created_at)",
        "CREATE INDEX contact_read_created IF NOT EXISTS
         FOR (c:Contact) ON (c.read, c.created_at)",
    ];

    for stmt in statements {
        graph.run(query(stmt)).await?;
    }

    info!("Esquema de Neo4j asegurado (constraints e índices creados).");
    Ok(())
}

/// Oculta usuario y contraseña de una URI de conexión para poder loguearla.
pub fn redact_uri(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(mut url) if !url.username().is_empty() || url.password().is_some() => {
            let _ = url.set_username("***");
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => "<uri inválida>".to_string(),
    }
}
