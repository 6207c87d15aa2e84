use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
};
use buildwatch_core::AppError;
use buildwatch_db::Database;
use buildwatch_engine::EngineHandle;
use buildwatch_images::{
    badge::{ShieldParams, render_svg},
    svg_response,
};

pub async fn get_summary_badge(
    Query(params): Query<ShieldParams>,
    State(engine): State<EngineHandle>,
) -> Result<Response, AppError> {
    let snapshot = engine.snapshot().await?;
    Ok(svg_response(render_svg(snapshot.summary, "build", &params)?))
}

pub async fn get_project_badge(
    Path(project_id): Path<String>,
    Query(params): Query<ShieldParams>,
    State(db): State<Database>,
    State(engine): State<EngineHandle>,
) -> Result<Response, AppError> {
    let snapshot = engine.snapshot().await?;
    let tracked = snapshot.projects.into_iter().find(|info| info.project.project_id == project_id);
    // Projects created since the last poll are only known to the database
    let info = match tracked {
        Some(info) => info,
        None => db
            .get_project(&project_id)
            .await?
            .filter(|info| info.project.is_active())
            .ok_or(AppError::Status(StatusCode::NOT_FOUND))?,
    };
    let svg = render_svg(info.status.last_known_status, &info.project.title, &params)?;
    Ok(svg_response(svg))
}
