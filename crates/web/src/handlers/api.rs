use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use buildwatch_core::{
    AppError,
    models::{BuildResult, Project, ProjectInfo, ProjectStatus},
    util::format_timestamp,
};
use buildwatch_db::Database;
use buildwatch_engine::EngineHandle;
use serde::{Deserialize, Serialize};
use time::UtcDateTime;

#[derive(Serialize)]
pub struct StatusResponse {
    summary: BuildResult,
    projects: Vec<ProjectResponse>,
}

#[derive(Serialize)]
pub struct ProjectsResponse {
    projects: Vec<ProjectResponse>,
}

/// A project as exposed over the API. The token is never included.
#[derive(Serialize)]
pub struct ProjectResponse {
    project_id: String,
    title: String,
    url: String,
    username: String,
    has_token: bool,
    ignore_for_summary: bool,
    list_order: i64,
    created_at: String,
    modified_at: String,
    status: ProjectStatusResponse,
}

#[derive(Serialize)]
pub struct ProjectStatusResponse {
    last_known_status: BuildResult,
    building: bool,
    had_response: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_build_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed_build_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    culprits: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    build_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    update_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_status_code: Option<u16>,
    /// Explanation of the last problem reaching the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    problem: Option<String>,
}

impl From<&ProjectStatus> for ProjectStatusResponse {
    fn from(status: &ProjectStatus) -> Self {
        Self {
            last_known_status: status.last_known_status,
            building: status.building,
            had_response: status.had_response,
            last_build_number: status.last_build_number,
            failed_build_number: status.failed_build_number,
            name: status.name.clone(),
            culprits: status.culprits.clone(),
            build_description: status.build_description.clone(),
            update_date: status.update_date.map(format_timestamp),
            response_status_code: status.response_status_code,
            problem: status.describe(),
        }
    }
}

impl From<&ProjectInfo> for ProjectResponse {
    fn from(info: &ProjectInfo) -> Self {
        let project = &info.project;
        Self {
            project_id: project.project_id.clone(),
            title: project.title.clone(),
            url: project.url.clone(),
            username: project.username.clone(),
            has_token: !project.token.is_empty(),
            ignore_for_summary: project.ignore_for_summary,
            list_order: project.list_order,
            created_at: format_timestamp(project.created_at),
            modified_at: format_timestamp(project.modified_at),
            status: (&info.status).into(),
        }
    }
}

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    title: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    ignore_for_summary: bool,
}

#[derive(Deserialize)]
pub struct UpdateProjectRequest {
    title: Option<String>,
    url: Option<String>,
    username: Option<String>,
    token: Option<String>,
    ignore_for_summary: Option<bool>,
}

#[derive(Deserialize)]
pub struct MoveProjectRequest {
    from: usize,
    to: usize,
}

/// Current summary and the last known status of every project, as tracked by the engine.
pub async fn get_status(State(engine): State<EngineHandle>) -> Result<Response, AppError> {
    let snapshot = engine.snapshot().await?;
    let projects = snapshot.projects.iter().map(ProjectResponse::from).collect();
    Ok(Json(StatusResponse { summary: snapshot.summary, projects }).into_response())
}

pub async fn get_projects(State(db): State<Database>) -> Result<Response, AppError> {
    let projects = db.list_projects().await?.iter().map(ProjectResponse::from).collect();
    Ok(Json(ProjectsResponse { projects }).into_response())
}

pub async fn create_project(
    State(db): State<Database>,
    State(engine): State<EngineHandle>,
    Json(request): Json<CreateProjectRequest>,
) -> Result<Response, AppError> {
    let title = match request.title.filter(|title| !title.trim().is_empty()) {
        Some(title) => title,
        None => db.unique_project_title().await?,
    };
    let mut project = Project::new(title, UtcDateTime::now());
    project.url = request.url;
    project.username = request.username;
    project.token = request.token;
    project.ignore_for_summary = request.ignore_for_summary;
    db.create_project(&project).await?;
    tracing::info!(project_id = %project.project_id, "Created project {}", project.title);
    engine.tick().await?;
    let info = ProjectInfo { project, status: ProjectStatus::default() };
    Ok((StatusCode::CREATED, Json(ProjectResponse::from(&info))).into_response())
}

pub async fn update_project(
    Path(project_id): Path<String>,
    State(db): State<Database>,
    State(engine): State<EngineHandle>,
    Json(request): Json<UpdateProjectRequest>,
) -> Result<Response, AppError> {
    let Some(ProjectInfo { mut project, .. }) =
        db.get_project(&project_id).await?.filter(|info| info.project.is_active())
    else {
        return Err(AppError::Status(StatusCode::NOT_FOUND));
    };
    if let Some(title) = request.title {
        project.title = title;
    }
    if let Some(url) = request.url {
        project.url = url;
    }
    if let Some(username) = request.username {
        project.username = username;
    }
    if let Some(token) = request.token {
        project.token = token;
    }
    if let Some(ignore_for_summary) = request.ignore_for_summary {
        project.ignore_for_summary = ignore_for_summary;
    }
    let info = db
        .update_project(&project, UtcDateTime::now())
        .await?
        .ok_or(AppError::Status(StatusCode::NOT_FOUND))?;
    engine.tick().await?;
    Ok(Json(ProjectResponse::from(&info)).into_response())
}

pub async fn delete_project(
    Path(project_id): Path<String>,
    State(db): State<Database>,
    State(engine): State<EngineHandle>,
) -> Result<Response, AppError> {
    if !db.delete_project(&project_id, UtcDateTime::now()).await? {
        return Err(AppError::Status(StatusCode::NOT_FOUND));
    }
    engine.deleted(project_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn move_project(
    State(db): State<Database>,
    State(engine): State<EngineHandle>,
    Json(request): Json<MoveProjectRequest>,
) -> Result<Response, AppError> {
    if !db.move_project(request.from, request.to).await? {
        return Err(AppError::Status(StatusCode::BAD_REQUEST));
    }
    engine.tick().await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Polls every project now instead of waiting for the next interval.
pub async fn refresh(State(engine): State<EngineHandle>) -> Result<Response, AppError> {
    engine.tick().await?;
    Ok(StatusCode::ACCEPTED.into_response())
}
