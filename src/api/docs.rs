use crate::SharedData;
use axum::Router;
use axum::routing::get;
use std::sync::Arc;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(info(
    title = "TaskTrack API",
    description = "A task/user CRUD API with linked assignments and dynamic collection queries"
))]
struct TaskTrackApi;

/// Merges the per-resource OpenAPI definitions into the served document.
pub fn build_documentation() -> utoipa::openapi::OpenApi {
    let mut api_docs = TaskTrackApi::openapi();
    api_docs.merge(super::task::TasksApi::openapi());
    api_docs.merge(super::user::UsersApi::openapi());
    api_docs
}

/// Serves the OpenAPI document as plain JSON.
pub fn docs_routes() -> Router<Arc<SharedData>> {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { axum::Json(build_documentation()) }),
    )
}
