//! Persistencia de proyectos y mensajes de contacto.
//!
//! Los handlers trabajan contra los traits `ProjectRepository` y
//! `ContactRepository`; en producción se usa Neo4j y en los tests la versión
//! en memoria.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use neo4rs::{query, Graph, Row};

use crate::models::{Contact, Project};

/// Máximo de proyectos devueltos por `/api/projects/featured`.
pub const FEATURED_LIMIT: usize = 6;

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Todos los proyectos, del más reciente al más antiguo.
    async fn list(&self) -> Result<Vec<Project>>;

    /// Proyectos destacados, del más reciente al más antiguo.
    async fn list_featured(&self, limit: usize) -> Result<Vec<Project>>;

    async fn find(&self, id: &str) -> Result<Option<Project>>;

    /// Inserta o reemplaza el proyecto completo.
    async fn save(&self, project: &Project) -> Result<()>;

    /// Devuelve `true` si existía y se ha borrado.
    async fn delete(&self, id: &str) -> Result<bool>;
}

#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Contact>>;

    async fn find(&self, id: &str) -> Result<Option<Contact>>;

    async fn insert(&self, contact: &Contact) -> Result<()>;

    /// Marca el mensaje como leído y lo devuelve actualizado.
    async fn mark_read(&self, id: &str) -> Result<Option<Contact>>;
}

/// Comprobación de conectividad para `/api/health`.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self) -> Result<()>;
}

// ---------------------------------------------------------------------
// NEO4J
// ---------------------------------------------------------------------

/// Repositorio sobre Neo4j: cada documento es un nodo etiquetado
/// (`:Project`, `:Contact`) con sus campos como propiedades.
#[derive(Clone)]
pub struct Neo4jRepository {
    graph: Arc<Graph>,
}

impl Neo4jRepository {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self { graph }
    }
}

const PROJECT_FIELDS: &str = "p.id AS id, p.title AS title, p.description AS description,
     p.technologies AS technologies, p.github_url AS github_url, p.live_url AS live_url,
     p.image_url AS image_url, p.featured AS featured,
     p.created_at AS created_at, p.updated_at AS updated_at";

const CONTACT_FIELDS: &str = "c.id AS id, c.name AS name, c.email AS email, c.message AS message,
     c.read AS read, c.created_at AS created_at, c.updated_at AS updated_at";

fn to_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn field(row: &Row, name: &str) -> Result<String> {
    row.get::<String>(name)
        .ok_or_else(|| anyhow!("Falta campo '{name}' en resultado de Neo4j"))
}

fn timestamp_field(row: &Row, name: &str) -> Result<DateTime<Utc>> {
    let raw = field(row, name)?;
    Ok(DateTime::parse_from_rfc3339(&raw)?.with_timezone(&Utc))
}

/// Las URLs opcionales se guardan como cadena vacía.
fn optional_field(row: &Row, name: &str) -> Option<String> {
    row.get::<String>(name).filter(|v| !v.is_empty())
}

fn project_from_row(row: &Row) -> Result<Project> {
    Ok(Project {
        id: field(row, "id")?,
        title: field(row, "title")?,
        description: field(row, "description")?,
        technologies: row.get::<Vec<String>>("technologies").unwrap_or_default(),
        github_url: optional_field(row, "github_url"),
        live_url: optional_field(row, "live_url"),
        image_url: optional_field(row, "image_url"),
        featured: row.get::<bool>("featured").unwrap_or(false),
        created_at: timestamp_field(row, "created_at")?,
        updated_at: timestamp_field(row, "updated_at")?,
    })
}

fn contact_from_row(row: &Row) -> Result<Contact> {
    Ok(Contact {
        id: field(row, "id")?,
        name: field(row, "name")?,
        email: field(row, "email")?,
        message: field(row, "message")?,
        read: row.get::<bool>("read").unwrap_or(false),
        created_at: timestamp_field(row, "created_at")?,
        updated_at: timestamp_field(row, "updated_at")?,
    })
}

impl Neo4jRepository {
    async fn fetch_projects(&self, q: neo4rs::Query) -> Result<Vec<Project>> {
        let mut cursor = self.graph.execute(q).await?;
        let mut projects = Vec::new();
        while let Some(row) = cursor.next().await? {
            projects.push(project_from_row(&row)?);
        }
        Ok(projects)
    }

    async fn fetch_contacts(&self, q: neo4rs::Query) -> Result<Vec<Contact>> {
        let mut cursor = self.graph.execute(q).await?;
        let mut contacts = Vec::new();
        while let Some(row) = cursor.next().await? {
            contacts.push(contact_from_row(&row)?);
        }
        Ok(contacts)
    }
}

#[async_trait]
impl ProjectRepository for Neo4jRepository {
    async fn list(&self) -> Result<Vec<Project>> {
        let cypher = format!("MATCH (p:Project) RETURN {PROJECT_FIELDS} ORDER BY created_at DESC");
        self.fetch_projects(query(&cypher)).await
    }

    async fn list_featured(&self, limit: usize) -> Result<Vec<Project>> {
        let cypher = format!(
            "MATCH (p:Project) WHERE p.featured = true
             RETURN {PROJECT_FIELDS} ORDER BY created_at DESC LIMIT $limit"
        );
        self.fetch_projects(query(&cypher).param("limit", limit as i64))
            .await
    }

    async fn find(&self, id: &str) -> Result<Option<Project>> {
        let cypher = format!("MATCH (p:Project {{id: $id}}) RETURN {PROJECT_FIELDS}");
        let mut found = self
            .fetch_projects(query(&cypher).param("id", id.to_string()))
            .await?;
        Ok(found.pop())
    }

    async fn save(&self, project: &Project) -> Result<()> {
        self.graph
            .run(
                query(
                    "MERGE (p:Project {id: $id})
                     SET p.title = $title, p.description = $description,
                         p.technologies = $technologies, p.github_url = $github_url,
                         p.live_url = $live_url, p.image_url = $image_url,
                         p.featured = $featured,
                         p.created_at = $created_at, p.updated_at = $updated_at",
                )
                .param("id", project.id.clone())
                .param("title", project.title.clone())
                .param("description", project.description.clone())
                .param("technologies", project.technologies.clone())
                .param("github_url", project.github_url.clone().unwrap_or_default())
                .param("live_url", project.live_url.clone().unwrap_or_default())
                .param("image_url", project.image_url.clone().unwrap_or_default())
                .param("featured", project.featured)
                .param("created_at", to_timestamp(&project.created_at))
                .param("updated_at", to_timestamp(&project.updated_at)),
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut cursor = self
            .graph
            .execute(
                query(
                    "MATCH (p:Project {id: $id})
                     WITH p LIMIT 1
                     DETACH DELETE p
                     RETURN 1 AS deleted",
                )
                .param("id", id.to_string()),
            )
            .await?;
        Ok(cursor.next().await?.is_some())
    }
}

#[async_trait]
impl ContactRepository for Neo4jRepository {
    async fn list(&self) -> Result<Vec<Contact>> {
        let cypher = format!("MATCH (c:Contact) RETURN {CONTACT_FIELDS} ORDER BY created_at DESC");
        self.fetch_contacts(query(&cypher)).await
    }

    async fn find(&self, id: &str) -> Result<Option<Contact>> {
        let cypher = format!("MATCH (c:Contact {{id: $id}}) RETURN {CONTACT_FIELDS}");
        let mut found = self
            .fetch_contacts(query(&cypher).param("id", id.to_string()))
            .await?;
        Ok(found.pop())
    }

    async fn insert(&self, contact: &Contact) -> Result<()> {
        self.graph
            .run(
                query(
                    "CREATE (c:Contact {id: $id, name: $name, email: $email, message: $message,
                                        read: $read, created_at: $created_at, updated_at: $updated_at})",
                )
                .param("id", contact.id.clone())
                .param("name", contact.name.clone())
                .param("email", contact.email.clone())
                .param("message", contact.message.clone())
                .param("read", contact.read)
                .param("created_at", to_timestamp(&contact.created_at))
                .param("updated_at", to_timestamp(&contact.updated_at)),
            )
            .await?;
        Ok(())
    }

    async fn mark_read(&self, id: &str) -> Result<Option<Contact>> {
        let cypher = format!(
            "MATCH (c:Contact {{id: $id}})
             SET c.read = true, c.updated_at = $updated_at
             RETURN {CONTACT_FIELDS}"
        );
        let mut found = self
            .fetch_contacts(
                query(&cypher)
                    .param("id", id.to_string())
                    .param("updated_at", to_timestamp(&Utc::now())),
            )
            .await?;
        Ok(found.pop())
    }
}

#[async_trait]
impl HealthCheck for Neo4jRepository {
    async fn ping(&self) -> Result<()> {
        self.graph.run(query("RETURN 1")).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------
// MEMORIA
// ---------------------------------------------------------------------

/// Repositorio en memoria, usado en tests y desarrollo sin base de datos.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    projects: Arc<RwLock<HashMap<String, Project>>>,
    contacts: Arc<RwLock<HashMap<String, Contact>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, F>(mut items: Vec<T>, created_at: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    items
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("Lock del repositorio en memoria envenenado")
}

#[async_trait]
impl ProjectRepository for InMemoryRepository {
    async fn list(&self) -> Result<Vec<Project>> {
        let projects = self.projects.read().map_err(poisoned)?;
        Ok(newest_first(projects.values().cloned().collect(), |p| p.created_at))
    }

    async fn list_featured(&self, limit: usize) -> Result<Vec<Project>> {
        let featured = ProjectRepository::list(self)
            .await?
            .into_iter()
            .filter(|p| p.featured)
            .take(limit)
            .collect();
        Ok(featured)
    }

    async fn find(&self, id: &str) -> Result<Option<Project>> {
        Ok(self.projects.read().map_err(poisoned)?.get(id).cloned())
    }

    async fn save(&self, project: &Project) -> Result<()> {
        self.projects
            .write()
            .map_err(poisoned)?
            .insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.projects.write().map_err(poisoned)?.remove(id).is_some())
    }
}

#[async_trait]
impl ContactRepository for InMemoryRepository {
    async fn list(&self) -> Result<Vec<Contact>> {
        let contacts = self.contacts.read().map_err(poisoned)?;
        Ok(newest_first(contacts.values().cloned().collect(), |c| c.created_at))
    }

    async fn find(&self, id: &str) -> Result<Option<Contact>> {
        Ok(self.contacts.read().map_err(poisoned)?.get(id).cloned())
    }

    async fn insert(&self, contact: &Contact) -> Result<()> {
        self.contacts
            .write()
            .map_err(poisoned)?
            .insert(contact.id.clone(), contact.clone());
        Ok(())
    }

    async fn mark_read(&self, id: &str) -> Result<Option<Contact>> {
        let mut contacts = self.contacts.write().map_err(poisoned)?;
        Ok(contacts.get_mut(id).map(|contact| {
            contact.read = true;
            contact.updated_at = Utc::now();
            contact.clone()
        }))
    }
}

#[async_trait]
impl HealthCheck for InMemoryRepository {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContactInput, ProjectInput};
    use chrono::Duration;
    use tokio_test::assert_ok;

    fn project(title: &str, featured: bool, age_secs: i64) -> Project {
        let mut p = Project::create(ProjectInput {
            title: Some(title.into()),
            description: Some("desc".into()),
            technologies: Some(vec!["Rust".into()]),
            featured: Some(featured),
            ..Default::default()
        })
        .unwrap();
        p.created_at -= Duration::seconds(age_secs);
        p
    }

    #[tokio::test]
    async fn in_memory_projects_are_sorted_and_filtered() {
        let repo = InMemoryRepository::new();
        for (i, featured) in [true, false, true, true].into_iter().enumerate() {
            repo.save(&project(&format!("p{i}"), featured, i as i64 * 10))
                .await
                .unwrap();
        }

        let all = ProjectRepository::list(&repo).await.unwrap();
        let titles: Vec<_> = all.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["p0", "p1", "p2", "p3"]);

        let featured = repo.list_featured(2).await.unwrap();
        let titles: Vec<_> = featured.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["p0", "p2"]);
    }

    #[tokio::test]
    async fn in_memory_delete_reports_existence() {
        let repo = InMemoryRepository::new();
        let p = project("p", false, 0);
        assert_ok!(repo.save(&p).await);
        assert!(ProjectRepository::delete(&repo, &p.id).await.unwrap());
        assert!(!ProjectRepository::delete(&repo, &p.id).await.unwrap());
        assert!(ProjectRepository::find(&repo, &p.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn in_memory_mark_read() {
        let repo = InMemoryRepository::new();
        let contact = Contact::create(ContactInput {
            name: Some("Ada".into()),
            email: Some("ada@example.com".into()),
            message: Some("Hola".into()),
        })
        .unwrap();
        assert_ok!(repo.insert(&contact).await);

        let updated = repo.mark_read(&contact.id).await.unwrap().unwrap();
        assert!(updated.read);
        assert!(repo.mark_read("missing").await.unwrap().is_none());
    }
}
