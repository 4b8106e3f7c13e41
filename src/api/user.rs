use crate::domain;
use crate::domain::queries::FieldProjection;
use crate::domain::user::UserService;
use crate::domain::user::driving_ports::{CreateUserError, UserPort, UserWriteError};
use crate::external_connections::{ExternalConnectivity, Transactable};
use crate::persistence::db_task_ports::DbTaskWriter;
use crate::persistence::db_user_ports::{DbDetectUser, DbUserReader, DbUserWriter};
use crate::routing_utils::{ApiError, Envelope, Json};
use crate::{AppState, SharedData, dto};
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::OpenApi;
use uuid::Uuid;
use validator::Validate;

#[derive(OpenApi)]
#[openapi(
    paths(list_users, create_user, get_user, replace_user, delete_user),
    components(schemas(dto::UserBody))
)]
pub struct UsersApi;

/// Builds a router for all the user routes
pub fn user_routes() -> Router<Arc<SharedData>> {
    Router::new()
        .route(
            "/",
            get(
                |State(app_data): AppState, Query(params): Query<dto::ListingParams>| async move {
                    let mut ext_cxn = app_data.ext_cxn.clone();

                    list_users(params, &mut ext_cxn, &UserService {}).await
                },
            ),
        )
        .route(
            "/",
            post(
                |State(app_data): AppState, Json(new_user): Json<dto::UserBody>| async move {
                    let mut ext_cxn = app_data.ext_cxn.clone();

                    create_user(new_user, &mut ext_cxn, &UserService {}).await
                },
            ),
        )
        .route(
            "/:user_id",
            get(
                |State(app_data): AppState,
                 Path(user_id): Path<String>,
                 Query(params): Query<dto::SingleParams>| async move {
                    let mut ext_cxn = app_data.ext_cxn.clone();

                    get_user(&user_id, params, &mut ext_cxn, &UserService {}).await
                },
            ),
        )
        .route(
            "/:user_id",
            put(
                |State(app_data): AppState,
                 Path(user_id): Path<String>,
                 Json(replacement): Json<dto::UserBody>| async move {
                    replace_user(&user_id, replacement, &app_data.ext_cxn, &UserService {}).await
                },
            ),
        )
        .route(
            "/:user_id",
            delete(
                |State(app_data): AppState, Path(user_id): Path<String>| async move {
                    delete_user(&user_id, &app_data.ext_cxn, &UserService {}).await
                },
            ),
        )
}

fn parse_user_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::try_parse(raw).map_err(|_| ApiError::not_found("User not found"))
}

/// Lists users matching the caller's dynamic query. User listings are unbounded unless a
/// limit is supplied.
#[utoipa::path(
    get,
    path = "/api/users",
    tag = "users",
    params(dto::ListingParams),
    responses(
        (status = 200, description = "The matching users, or an integer count in count mode"),
        (status = 500, description = "Users could not be fetched"),
    ),
)]
async fn list_users(
    params: dto::ListingParams,
    ext_cxn: &mut impl ExternalConnectivity,
    user_service: &impl UserPort,
) -> Result<Json<Envelope<Value>>, ApiError> {
    info!("Requested user listing");
    let listing = user_service
        .list(params.into_query(), &mut *ext_cxn, &DbUserReader)
        .await
        .map_err(|err| {
            error!("Could not list users: {err}");
            ApiError::internal("Error fetching users")
        })?;

    Ok(Json(Envelope::new("OK", listing.into_value())))
}

/// Creates a user. The supplied pending task list is stored as-is; assignments only get
/// reconciled through the replace endpoint.
#[utoipa::path(
    post,
    path = "/api/users",
    tag = "users",
    request_body = dto::UserBody,
    responses(
        (status = 201, description = "The stored user"),
        (status = 400, description = "Required fields were missing, the email is taken, or the save failed"),
    ),
)]
async fn create_user(
    new_user: dto::UserBody,
    ext_cxn: &mut impl ExternalConnectivity,
    user_service: &impl UserPort,
) -> Result<(StatusCode, Json<Envelope<domain::user::User>>), ApiError> {
    info!("Attempt to create a user");
    if new_user.validate().is_err() {
        return Err(ApiError::bad_request("Name and email required"));
    }

    let created = user_service
        .create(
            new_user.into_content(),
            &mut *ext_cxn,
            &DbUserWriter,
            &DbDetectUser,
        )
        .await
        .map_err(|err| match err {
            CreateUserError::EmailInUse => ApiError::bad_request("Email already exists"),
            CreateUserError::PortError(cause) => {
                error!("User create failure: {cause}");
                ApiError::bad_request("Failed to create user")
            }
        })?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::new("User created", created)),
    ))
}

/// Fetches one user, optionally trimmed by a projection.
#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    tag = "users",
    params(("user_id" = String, Path, description = "Id of the user to fetch"), dto::SingleParams),
    responses(
        (status = 200, description = "The (possibly projected) user"),
        (status = 400, description = "The projection could not be parsed"),
        (status = 404, description = "No user has the given id"),
    ),
)]
async fn get_user(
    user_id: &str,
    params: dto::SingleParams,
    ext_cxn: &mut impl ExternalConnectivity,
    user_service: &impl UserPort,
) -> Result<Json<Envelope<Value>>, ApiError> {
    info!("Fetching user {user_id}");
    let id = parse_user_id(user_id)?;

    let projection = match params.select {
        None => FieldProjection::All,
        Some(ref raw) => FieldProjection::strict(raw).map_err(|err| {
            error!("Unusable projection fetching user {user_id}: {err}");
            ApiError::bad_request("Error fetching user")
        })?,
    };

    let fetched = user_service
        .by_id(id, projection, &mut *ext_cxn, &DbUserReader)
        .await
        .map_err(|err| {
            error!("Failed to fetch user {user_id}: {err}");
            ApiError::internal("Error fetching user")
        })?;

    match fetched {
        Some(user) => Ok(Json(Envelope::new("OK", user))),
        None => Err(ApiError::not_found("User not found")),
    }
}

/// Fully replaces a user and reconciles the task collection against the new pending set:
/// tasks dropped from the list are unassigned, listed tasks get (re)assigned under the
/// user's new name.
#[utoipa::path(
    put,
    path = "/api/users/{user_id}",
    tag = "users",
    params(("user_id" = String, Path, description = "Id of the user to replace")),
    request_body = dto::UserBody,
    responses(
        (status = 200, description = "The replacement user as stored"),
        (status = 400, description = "Required fields were missing or the update failed"),
        (status = 404, description = "No user has the given id"),
    ),
)]
async fn replace_user(
    user_id: &str,
    replacement: dto::UserBody,
    tx_source: &impl Transactable,
    user_service: &impl UserPort,
) -> Result<Json<Envelope<domain::user::User>>, ApiError> {
    info!("Replacing user {user_id}");
    let id = parse_user_id(user_id)?;
    if replacement.validate().is_err() {
        return Err(ApiError::bad_request("Name and email required"));
    }

    let replaced = user_service
        .replace(
            id,
            replacement.into_content(),
            tx_source,
            &DbUserReader,
            &DbUserWriter,
            &DbTaskWriter,
        )
        .await
        .map_err(|err| match err {
            UserWriteError::NotFound(_) => ApiError::not_found("User not found"),
            UserWriteError::PortError(cause) => {
                error!("User update failure: {cause}");
                ApiError::bad_request("Failed to update user")
            }
        })?;

    Ok(Json(Envelope::new("User updated", replaced)))
}

/// Deletes a user, unassigning every task that pointed at them first.
#[utoipa::path(
    delete,
    path = "/api/users/{user_id}",
    tag = "users",
    params(("user_id" = String, Path, description = "Id of the user to delete")),
    responses(
        (status = 200, description = "The user was removed"),
        (status = 404, description = "No user has the given id"),
        (status = 500, description = "The delete could not be completed"),
    ),
)]
async fn delete_user(
    user_id: &str,
    tx_source: &impl Transactable,
    user_service: &impl UserPort,
) -> Result<Json<Envelope<Value>>, ApiError> {
    info!("Deleting user {user_id}");
    let id = parse_user_id(user_id)?;

    user_service
        .delete(id, tx_source, &DbUserReader, &DbUserWriter, &DbTaskWriter)
        .await
        .map_err(|err| match err {
            UserWriteError::NotFound(_) => ApiError::not_found("User not found"),
            UserWriteError::PortError(cause) => {
                error!("Failed to delete user: {cause}");
                ApiError::internal("Failed to delete user")
            }
        })?;

    Ok(Json(Envelope::new(
        "User deleted",
        Value::Object(serde_json::Map::new()),
    )))
}
