use axum::{
    Router,
    routing::{get, post, put},
};

use crate::AppState;

mod api;
mod badge;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/api/status", get(api::get_status))
        .route("/api/projects", get(api::get_projects).post(api::create_project))
        .route("/api/projects/move", post(api::move_project))
        .route("/api/projects/{id}", put(api::update_project).delete(api::delete_project))
        .route("/api/refresh", post(api::refresh))
        .route("/badge.svg", get(badge::get_summary_badge))
        .route("/{id}/badge.svg", get(badge::get_project_badge))
}
