//! Modelos de dominio del portfolio (`Project`, `Contact`) y su validación.
//!
//! Los mensajes de validación se acumulan y se devuelven unidos por comas,
//! que es lo que espera el frontend.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://.+").expect("regex de URL válida"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$").expect("regex de email válida")
});

pub const PROJECT_TITLE_MAX: usize = 100;
pub const PROJECT_DESCRIPTION_MAX: usize = 1000;
pub const CONTACT_NAME_MAX: usize = 100;
pub const CONTACT_MESSAGE_MAX: usize = 2000;

/// Errores de validación acumulados.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<String>);

impl ValidationErrors {
    pub fn joined(&self) -> String {
        self.0.join(", ")
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.joined())
    }
}

impl std::error::Error for ValidationErrors {}

fn finish(errors: Vec<String>) -> Result<(), ValidationErrors> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Representa un nodo (:Project) en Neo4j.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub title: String,
    pub description: String,
    pub technologies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cuerpo de `POST /api/projects`. Todos los campos son opcionales para poder
/// informar de todos los que faltan a la vez.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub technologies: Option<Vec<String>>,
    pub github_url: Option<String>,
    pub live_url: Option<String>,
    pub image_url: Option<String>,
    pub featured: Option<bool>,
}

/// Cuerpo de `PUT /api/projects/:id`: sólo se modifican los campos presentes.
pub type ProjectPatch = ProjectInput;

impl Project {
    /// Construye un proyecto nuevo a partir del cuerpo de la petición.
    pub fn create(input: ProjectInput) -> Result<Self, ValidationErrors> {
        let now = Utc::now();
        let project = Self {
            id: Uuid::new_v4().to_string(),
            title: trimmed(input.title).unwrap_or_default(),
            description: trimmed(input.description).unwrap_or_default(),
            technologies: clean_technologies(input.technologies.unwrap_or_default()),
            github_url: trimmed(input.github_url),
            live_url: trimmed(input.live_url),
            image_url: trimmed(input.image_url),
            featured: input.featured.unwrap_or(false),
            created_at: now,
            updated_at: now,
        };
        project.validate()?;
        Ok(project)
    }

    /// Aplica una actualización parcial y vuelve a validar el resultado.
    pub fn apply_patch(&self, patch: ProjectPatch) -> Result<Self, ValidationErrors> {
        let mut updated = self.clone();
        if let Some(title) = patch.title {
            updated.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            updated.description = description.trim().to_string();
        }
        if let Some(technologies) = patch.technologies {
            updated.technologies = clean_technologies(technologies);
        }
        if patch.github_url.is_some() {
            updated.github_url = trimmed(patch.github_url);
        }
        if patch.live_url.is_some() {
            updated.live_url = trimmed(patch.live_url);
        }
        if patch.image_url.is_some() {
            updated.image_url = trimmed(patch.image_url);
        }
        if let Some(featured) = patch.featured {
            updated.featured = featured;
        }
        updated.updated_at = Utc::now();
        updated.validate()?;
        Ok(updated)
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();

        if self.title.is_empty() {
            errors.push("Project title is required".to_string());
        } else if self.title.chars().count() > PROJECT_TITLE_MAX {
            errors.push("Title cannot exceed 100 characters".to_string());
        }

        if self.description.is_empty() {
            errors.push("Project description is required".to_string());
        } else if self.description.chars().count() > PROJECT_DESCRIPTION_MAX {
            errors.push("Description cannot exceed 1000 characters".to_string());
        }

        if self.technologies.is_empty() {
            errors.push("At least one technology is required".to_string());
        }

        for url in [&self.github_url, &self.live_url, &self.image_url]
            .into_iter()
            .flatten()
        {
            if !URL_RE.is_match(url) {
                errors.push("Please provide a valid URL".to_string());
            }
        }

        finish(errors)
    }
}

fn clean_technologies(technologies: Vec<String>) -> Vec<String> {
    technologies
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Representa un nodo (:Contact) en Neo4j: un mensaje del formulario de contacto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub email: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub message: Option<String>,
}

impl ContactInput {
    /// Campos obligatorios ausentes o vacíos, en el orden del formulario.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("name", &self.name),
            ("email", &self.email),
            ("message", &self.message),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().map(str::trim).unwrap_or("").is_empty())
        .map(|(field, _)| field)
        .collect()
    }
}

impl Contact {
    pub fn create(input: ContactInput) -> Result<Self, ValidationErrors> {
        let now = Utc::now();
        let contact = Self {
            id: Uuid::new_v4().to_string(),
            name: trimmed(input.name).unwrap_or_default(),
            email: trimmed(input.email).unwrap_or_default().to_lowercase(),
            message: trimmed(input.message).unwrap_or_default(),
            read: false,
            created_at: now,
            updated_at: now,
        };
        contact.validate()?;
        Ok(contact)
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push("Name is required".to_string());
        } else if self.name.chars().count() > CONTACT_NAME_MAX {
            errors.push("Name cannot exceed 100 characters".to_string());
        }

        if self.email.is_empty() {
            errors.push("Email is required".to_string());
        } else if !EMAIL_RE.is_match(&self.email) {
            errors.push("Please provide a valid email address".to_string());
        }

        if self.message.is_empty() {
            errors.push("Message is required".to_string());
        } else if self.message.chars().count() > CONTACT_MESSAGE_MAX {
            errors.push("Message cannot exceed 2000 characters".to_string());
        }

        finish(errors)
    }
}
