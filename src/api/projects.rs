use axum::{
    body::Bytes,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::info;

use crate::{
    app_state::AppState,
    error::{created, ok, ApiError, ApiResult},
    models::{Project, ProjectInput, ProjectPatch},
    repository::FEATURED_LIMIT,
};

use super::parse_body;

const NOT_FOUND: &str = "Project not found";

#[derive(Serialize)]
pub struct ProjectList {
    count: usize,
    projects: Vec<Project>,
}

impl From<Vec<Project>> for ProjectList {
    fn from(projects: Vec<Project>) -> Self {
        Self {
            count: projects.len(),
            projects,
        }
    }
}

#[derive(Serialize)]
pub struct ProjectPayload {
    project: Project,
}

#[derive(Serialize)]
pub struct MessagePayload {
    message: &'static str,
}

pub async fn list_handler(State(state): State<AppState>) -> ApiResult<ProjectList> {
    let projects = state
        .projects
        .list()
        .await
        .map_err(|e| ApiError::internal("Failed to fetch projects", e))?;
    ok(projects.into())
}

pub async fn featured_handler(State(state): State<AppState>) -> ApiResult<ProjectList> {
    let projects = state
        .projects
        .list_featured(FEATURED_LIMIT)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch featured projects", e))?;
    ok(projects.into())
}

pub async fn get_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ProjectPayload> {
    let project = state
        .projects
        .find(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch project", e))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    ok(ProjectPayload { project })
}

pub async fn create_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<ProjectPayload> {
    let input: ProjectInput = parse_body(&body)?;
    let project = Project::create(input).map_err(|e| ApiError::validation(e.joined()))?;
    state
        .projects
        .save(&project)
        .await
        .map_err(|e| ApiError::internal("Failed to create project", e))?;

    info!("Proyecto creado: {} ({})", project.title, project.id);
    created(ProjectPayload { project })
}

pub async fn update_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<ProjectPayload> {
    let patch: ProjectPatch = parse_body(&body)?;
    let current = state
        .projects
        .find(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to update project", e))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    let project = current
        .apply_patch(patch)
        .map_err(|e| ApiError::validation(e.joined()))?;
    state
        .projects
        .save(&project)
        .await
        .map_err(|e| ApiError::internal("Failed to update project", e))?;
    ok(ProjectPayload { project })
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<MessagePayload> {
    let deleted = state
        .projects
        .delete(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to delete project", e))?;
    if !deleted {
        return Err(ApiError::not_found(NOT_FOUND));
    }

    info!("Proyecto eliminado: {id}");
    ok(MessagePayload {
        message: "Project deleted successfully",
    })
}
