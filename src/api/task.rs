use crate::domain;
use crate::domain::queries::FieldProjection;
use crate::domain::task::TaskService;
use crate::domain::task::driving_ports::{TaskPort, TaskWriteError};
use crate::external_connections::{ExternalConnectivity, Transactable};
use crate::persistence::db_task_ports::{DbTaskReader, DbTaskWriter};
use crate::persistence::db_user_ports::{DbUserReader, DbUserWriter};
use crate::routing_utils::{ApiError, Envelope, Json};
use crate::{AppState, SharedData, dto};
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};
use utoipa::OpenApi;
use uuid::Uuid;
use validator::Validate;

#[derive(OpenApi)]
#[openapi(
    paths(list_tasks, create_task, get_task, replace_task, delete_task),
    components(schemas(dto::TaskBody))
)]
pub struct TasksApi;

/// Builds a router for all the task routes
pub fn task_routes() -> Router<Arc<SharedData>> {
    Router::new()
        .route(
            "/",
            get(
                |State(app_data): AppState, Query(params): Query<dto::ListingParams>| async move {
                    let mut ext_cxn = app_data.ext_cxn.clone();

                    list_tasks(params, &mut ext_cxn, &TaskService {}).await
                },
            ),
        )
        .route(
            "/",
            post(
                |State(app_data): AppState, Json(new_task): Json<dto::TaskBody>| async move {
                    create_task(new_task, &app_data.ext_cxn, &TaskService {}).await
                },
            ),
        )
        .route(
            "/:task_id",
            get(
                |State(app_data): AppState,
                 Path(task_id): Path<String>,
                 Query(params): Query<dto::SingleParams>| async move {
                    let mut ext_cxn = app_data.ext_cxn.clone();

                    get_task(&task_id, params, &mut ext_cxn, &TaskService {}).await
                },
            ),
        )
        .route(
            "/:task_id",
            put(
                |State(app_data): AppState,
                 Path(task_id): Path<String>,
                 Json(replacement): Json<dto::TaskBody>| async move {
                    replace_task(&task_id, replacement, &app_data.ext_cxn, &TaskService {}).await
                },
            ),
        )
        .route(
            "/:task_id",
            delete(
                |State(app_data): AppState, Path(task_id): Path<String>| async move {
                    delete_task(&task_id, &app_data.ext_cxn, &TaskService {}).await
                },
            ),
        )
}

/// A task id arrives as an opaque path segment; nothing in the store can match a
/// malformed one, so it reports the same way as an absent document.
fn parse_task_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::try_parse(raw).map_err(|_| ApiError::not_found("Task not found"))
}

/// Lists tasks matching the caller's dynamic query, or counts them with `count=true`.
#[utoipa::path(
    get,
    path = "/api/tasks",
    tag = "tasks",
    params(dto::ListingParams),
    responses(
        (status = 200, description = "The matching tasks, or an integer count in count mode"),
        (status = 500, description = "Tasks could not be fetched"),
    ),
)]
async fn list_tasks(
    params: dto::ListingParams,
    ext_cxn: &mut impl ExternalConnectivity,
    task_service: &impl TaskPort,
) -> Result<Json<Envelope<Value>>, ApiError> {
    info!("Requested task listing");
    let listing = task_service
        .list(params.into_query(), &mut *ext_cxn, &DbTaskReader)
        .await
        .map_err(|err| {
            error!("Could not list tasks: {err}");
            ApiError::internal("Error fetching tasks")
        })?;

    Ok(Json(Envelope::new("OK", listing.into_value())))
}

/// Creates a task, linking it to its assignee when one is requested and resolvable.
#[utoipa::path(
    post,
    path = "/api/tasks",
    tag = "tasks",
    request_body = dto::TaskBody,
    responses(
        (status = 201, description = "The stored task, including its assignment outcome"),
        (status = 400, description = "Required fields were missing or the task could not be saved"),
    ),
)]
async fn create_task(
    new_task: dto::TaskBody,
    tx_source: &impl Transactable,
    task_service: &impl TaskPort,
) -> Result<(StatusCode, Json<Envelope<domain::task::Task>>), ApiError> {
    info!("Attempt to create a task");
    if new_task.validate().is_err() {
        return Err(ApiError::bad_request("Task name and deadline required"));
    }
    if new_task.assigned_user_name.is_some() {
        debug!("ignoring client-supplied assignedUserName, the stored value is derived");
    }

    let created = task_service
        .create(
            new_task.into_create(),
            tx_source,
            &DbTaskWriter,
            &DbUserReader,
            &DbUserWriter,
        )
        .await
        .map_err(|err| {
            error!("Task create failure: {err}");
            ApiError::bad_request("Failed to create task")
        })?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::new("Task created", created)),
    ))
}

/// Fetches one task, optionally trimmed by a projection.
#[utoipa::path(
    get,
    path = "/api/tasks/{task_id}",
    tag = "tasks",
    params(("task_id" = String, Path, description = "Id of the task to fetch"), dto::SingleParams),
    responses(
        (status = 200, description = "The (possibly projected) task"),
        (status = 400, description = "The projection could not be parsed"),
        (status = 404, description = "No task has the given id"),
    ),
)]
async fn get_task(
    task_id: &str,
    params: dto::SingleParams,
    ext_cxn: &mut impl ExternalConnectivity,
    task_service: &impl TaskPort,
) -> Result<Json<Envelope<Value>>, ApiError> {
    info!("Fetching task {task_id}");
    let id = parse_task_id(task_id)?;

    // Unlike the list endpoint, a bad projection here is a caller error.
    let projection = match params.select {
        None => FieldProjection::All,
        Some(ref raw) => FieldProjection::strict(raw).map_err(|err| {
            error!("Unusable projection fetching task {task_id}: {err}");
            ApiError::bad_request("Error fetching task")
        })?,
    };

    let fetched = task_service
        .by_id(id, projection, &mut *ext_cxn, &DbTaskReader)
        .await
        .map_err(|err| {
            error!("Failed to fetch task {task_id}: {err}");
            ApiError::internal("Error fetching task")
        })?;

    match fetched {
        Some(task) => Ok(Json(Envelope::new("OK", task))),
        None => Err(ApiError::not_found("Task not found")),
    }
}

/// Fully replaces a task, rewiring user links when the assignment changes.
#[utoipa::path(
    put,
    path = "/api/tasks/{task_id}",
    tag = "tasks",
    params(("task_id" = String, Path, description = "Id of the task to replace")),
    request_body = dto::TaskBody,
    responses(
        (status = 200, description = "The replacement task as stored"),
        (status = 400, description = "Required fields were missing or the update failed"),
        (status = 404, description = "No task has the given id"),
    ),
)]
async fn replace_task(
    task_id: &str,
    replacement: dto::TaskBody,
    tx_source: &impl Transactable,
    task_service: &impl TaskPort,
) -> Result<Json<Envelope<domain::task::Task>>, ApiError> {
    info!("Replacing task {task_id}");
    let id = parse_task_id(task_id)?;
    if replacement.validate().is_err() {
        return Err(ApiError::bad_request("Task name and deadline required"));
    }
    if replacement.assigned_user_name.is_some() {
        debug!("ignoring client-supplied assignedUserName, the stored value is derived");
    }

    let replaced = task_service
        .replace(
            id,
            replacement.into_create(),
            tx_source,
            &DbTaskReader,
            &DbTaskWriter,
            &DbUserReader,
            &DbUserWriter,
        )
        .await
        .map_err(|err| match err {
            TaskWriteError::NotFound(_) => ApiError::not_found("Task not found"),
            TaskWriteError::PortError(cause) => {
                error!("Task update failure: {cause}");
                ApiError::bad_request("Failed to update task")
            }
        })?;

    Ok(Json(Envelope::new("Task updated", replaced)))
}

/// Deletes a task, detaching it from its owner first.
#[utoipa::path(
    delete,
    path = "/api/tasks/{task_id}",
    tag = "tasks",
    params(("task_id" = String, Path, description = "Id of the task to delete")),
    responses(
        (status = 200, description = "The task was removed"),
        (status = 404, description = "No task has the given id"),
        (status = 500, description = "The delete could not be completed"),
    ),
)]
async fn delete_task(
    task_id: &str,
    tx_source: &impl Transactable,
    task_service: &impl TaskPort,
) -> Result<Json<Envelope<Value>>, ApiError> {
    info!("Deleting task {task_id}");
    let id = parse_task_id(task_id)?;

    task_service
        .delete(id, tx_source, &DbTaskReader, &DbTaskWriter, &DbUserWriter)
        .await
        .map_err(|err| match err {
            TaskWriteError::NotFound(_) => ApiError::not_found("Task not found"),
            TaskWriteError::PortError(cause) => {
                error!("Failed to delete task: {cause}");
                ApiError::internal("Failed to delete task")
            }
        })?;

    Ok(Json(Envelope::new("Task deleted", Value::Object(
        serde_json::Map::new(),
    ))))
}
