use super::dyn_query::{self, FieldKind, FieldMapping};
use crate::domain;
use crate::domain::queries::{DocumentFilter, ListParams};
use crate::domain::user::{User, UserContent};
use crate::external_connections::{ConnectionHandle, ExternalConnectivity};
use anyhow::{Context, Error};
use sqlx::QueryBuilder;
use uuid::Uuid;

pub struct DbUserReader;
pub struct DbUserWriter;
pub struct DbDetectUser;

/// Queryable fields of the user collection.
const USER_FIELDS: &[FieldMapping] = &[
    FieldMapping {
        api_name: "_id",
        column: "id",
        kind: FieldKind::Id,
    },
    FieldMapping {
        api_name: "name",
        column: "name",
        kind: FieldKind::Text,
    },
    FieldMapping {
        api_name: "email",
        column: "email",
        kind: FieldKind::Text,
    },
    FieldMapping {
        api_name: "pendingTasks",
        column: "pending_tasks",
        kind: FieldKind::IdList,
    },
];

const SELECT_USER: &str = "SELECT id, name, email, pending_tasks FROM app_user";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    pending_tasks: Vec<String>,
}

impl From<UserRow> for User {
    fn from(value: UserRow) -> Self {
        User {
            id: value.id,
            name: value.name,
            email: value.email,
            pending_tasks: value.pending_tasks,
        }
    }
}

impl domain::user::driven_ports::UserReader for DbUserReader {
    async fn all(
        &self,
        params: &ListParams,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<Vec<User>, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let mut query = QueryBuilder::new(SELECT_USER);
        dyn_query::push_filter(&mut query, &params.filter, USER_FIELDS);
        dyn_query::push_sort(&mut query, &params.sort, USER_FIELDS);
        dyn_query::push_page(&mut query, params.skip, params.limit);

        let users: Vec<User> = query
            .build_query_as::<UserRow>()
            .fetch_all(cxn.borrow_connection())
            .await
            .context("listing users")?
            .into_iter()
            .map(User::from)
            .collect();

        Ok(users)
    }

    async fn count(
        &self,
        filter: &DocumentFilter,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<i64, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let mut query = QueryBuilder::new("SELECT count(*) FROM app_user");
        dyn_query::push_filter(&mut query, filter, USER_FIELDS);

        let total: i64 = query
            .build_query_scalar()
            .fetch_one(cxn.borrow_connection())
            .await
            .context("counting users")?;

        Ok(total)
    }

    async fn by_id(
        &self,
        id: Uuid,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<Option<User>, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let sql = format!("{SELECT_USER} WHERE id = $1");
        let user: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(cxn.borrow_connection())
            .await
            .context("fetching a user by id")?;

        Ok(user.map(User::from))
    }
}

impl domain::user::driven_ports::UserWriter for DbUserWriter {
    async fn insert(
        &self,
        content: &UserContent,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<User, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let created: UserRow = sqlx::query_as(
            "INSERT INTO app_user (name, email, pending_tasks) VALUES ($1, $2, $3) \
             RETURNING id, name, email, pending_tasks",
        )
        .bind(&content.name)
        .bind(&content.email)
        .bind(&content.pending_tasks)
        .fetch_one(cxn.borrow_connection())
        .await
        .context("inserting a new user")?;

        Ok(User::from(created))
    }

    async fn replace(
        &self,
        id: Uuid,
        content: &UserContent,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<(), Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        sqlx::query("UPDATE app_user SET name = $2, email = $3, pending_tasks = $4 WHERE id = $1")
            .bind(id)
            .bind(&content.name)
            .bind(&content.email)
            .bind(&content.pending_tasks)
            .execute(cxn.borrow_connection())
            .await
            .context("replacing a user")?;

        Ok(())
    }

    async fn delete(&self, id: Uuid, ext_cxn: &mut impl ExternalConnectivity) -> Result<(), Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        sqlx::query("DELETE FROM app_user WHERE id = $1")
            .bind(id)
            .execute(cxn.borrow_connection())
            .await
            .context("removing a user")?;

        Ok(())
    }
}

impl domain::user::driven_ports::PendingTaskWriter for DbUserWriter {
    async fn add_pending_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<(), Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        // set semantics: appending is skipped when the id is already present
        sqlx::query(
            "UPDATE app_user SET pending_tasks = array_append(pending_tasks, $2) \
             WHERE id = $1 AND NOT ($2 = ANY(pending_tasks))",
        )
        .bind(user_id)
        .bind(task_id.to_string())
        .execute(cxn.borrow_connection())
        .await
        .context("adding a pending task to a user")?;

        Ok(())
    }

    async fn remove_pending_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<(), Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        sqlx::query(
            "UPDATE app_user SET pending_tasks = array_remove(pending_tasks, $2) WHERE id = $1",
        )
        .bind(user_id)
        .bind(task_id.to_string())
        .execute(cxn.borrow_connection())
        .await
        .context("removing a pending task from a user")?;

        Ok(())
    }
}

impl domain::user::driven_ports::DetectUser for DbDetectUser {
    async fn email_in_use(
        &self,
        email: &str,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<bool, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let users_with_email: i64 =
            sqlx::query_scalar("SELECT count(*) FROM app_user WHERE email = $1")
                .bind(email)
                .fetch_one(cxn.borrow_connection())
                .await
                .context("detecting a user via email")?;

        Ok(users_with_email > 0)
    }
}
