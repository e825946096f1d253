//! Contexto del portfolio: la base de conocimiento estática de NEXI.
//!
//! Se carga una sola vez al arrancar desde un JSON y es inmutable durante la
//! vida del proceso (se comparte como `Arc<PortfolioContext>`).

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioOwner {
    pub name: String,
    pub title: String,
    pub bio: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioProject {
    pub name: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    pub year: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PortfolioSkills {
    #[serde(default)]
    pub frontend: Vec<String>,
    #[serde(default)]
    pub backend: Vec<String>,
    #[serde(default)]
    pub cloud: Vec<String>,
    #[serde(default)]
    pub integrations: Vec<String>,
    #[serde(default)]
    pub practices: Vec<String>,
}

impl PortfolioSkills {
    /// Categorías en orden fijo, para que las búsquedas sean deterministas.
    pub fn categories(&self) -> [(&'static str, &[String]); 5] {
        [
            ("frontend", &self.frontend),
            ("backend", &self.backend),
            ("cloud", &self.cloud),
            ("integrations", &self.integrations),
            ("practices", &self.practices),
        ]
    }

    pub fn total(&self) -> usize {
        self.categories().iter().map(|(_, skills)| skills.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioContact {
    pub email: String,
    pub github: String,
    pub linkedin: String,
    pub cta: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioContext {
    pub owner: PortfolioOwner,
    pub projects: Vec<PortfolioProject>,
    pub skills: PortfolioSkills,
    pub contact: PortfolioContact,
    #[serde(default)]
    pub quick_facts: Vec<String>,
}

impl PortfolioContext {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("JSON de contexto del portfolio inválido")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| {
            format!("No se pudo leer el contexto del portfolio en {}", path.display())
        })?;
        Self::from_json(&raw)
    }
}

/// Resumen en texto del contexto cargado (para logs de arranque).
pub fn context_summary(context: &PortfolioContext) -> String {
    let names: Vec<&str> = context.projects.iter().map(|p| p.name.as_str()).collect();
    format!(
        "Portfolio Context Summary:\n- Owner: {} ({})\n- Projects: {} ({})\n- Skills: {} total\n- Quick Facts: {}",
        context.owner.name,
        context.owner.title,
        context.projects.len(),
        names.join(", "),
        context.skills.total(),
        context.quick_facts.len()
    )
}

/// Proyectos cuyo nombre, descripción, stack o tipo contienen `query`
/// (sin distinguir mayúsculas). Sin coincidencias devuelve una lista vacía.
pub fn search_projects<'a>(context: &'a PortfolioContext, query: &str) -> Vec<&'a PortfolioProject> {
    let needle = query.to_lowercase();
    context
        .projects
        .iter()
        .filter(|project| {
            project.name.to_lowercase().contains(&needle)
                || project.description.to_lowercase().contains(&needle)
                || project
                    .tech_stack
                    .iter()
                    .any(|tech| tech.to_lowercase().contains(&needle))
                || project.kind.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Primera categoría de skills que contiene `skill`, o `None`.
pub fn find_skill_category(context: &PortfolioContext, skill: &str) -> Option<&'static str> {
    let needle = skill.to_lowercase();
    context
        .skills
        .categories()
        .into_iter()
        .find(|(_, skills)| skills.iter().any(|s| s.to_lowercase().contains(&needle)))
        .map(|(category, _)| category)
}
