use crate::SharedData;
use axum::Router;
use std::sync::Arc;

pub mod docs;
pub mod task;
pub mod user;

#[cfg(test)]
pub mod test_util;

/// Assembles the routers for every resource on the API.
pub fn api_routes() -> Router<Arc<SharedData>> {
    Router::new()
        .nest("/tasks", task::task_routes())
        .nest("/users", user::user_routes())
}
