use super::dyn_query::{self, FieldKind, FieldMapping};
use crate::domain;
use crate::domain::assignment::{Assignment, UNASSIGNED_USER_NAME};
use crate::domain::queries::{DocumentFilter, ListParams};
use crate::domain::task::{Task, TaskContent};
use crate::external_connections::{ConnectionHandle, ExternalConnectivity};
use anyhow::{Context, Error};
use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;
use uuid::Uuid;

pub struct DbTaskReader;
pub struct DbTaskWriter;

/// Queryable fields of the task collection.
const TASK_FIELDS: &[FieldMapping] = &[
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
        api_name: "description",
        column: "description",
        kind: FieldKind::Text,
    },
    FieldMapping {
        api_name: "deadline",
        column: "deadline",
        kind: FieldKind::Timestamp,
    },
    FieldMapping {
        api_name: "completed",
        column: "completed",
        kind: FieldKind::Boolean,
    },
    FieldMapping {
        api_name: "assignedUser",
        column: "assigned_user",
        kind: FieldKind::Text,
    },
    FieldMapping {
        api_name: "assignedUserName",
        column: "assigned_user_name",
        kind: FieldKind::Text,
    },
    FieldMapping {
        api_name: "dateCreated",
        column: "date_created",
        kind: FieldKind::Timestamp,
    },
];

const SELECT_TASK: &str = "SELECT id, name, description, deadline, completed, \
     assigned_user, assigned_user_name, date_created FROM task";

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    name: String,
    description: String,
    deadline: DateTime<Utc>,
    completed: bool,
    assigned_user: String,
    assigned_user_name: String,
    date_created: DateTime<Utc>,
}

impl From<TaskRow> for Task {
    fn from(value: TaskRow) -> Self {
        Task {
            id: value.id,
            name: value.name,
            description: value.description,
            deadline: value.deadline,
            completed: value.completed,
            assigned_user: value.assigned_user,
            assigned_user_name: value.assigned_user_name,
            date_created: value.date_created,
        }
    }
}

impl domain::task::driven_ports::TaskReader for DbTaskReader {
    async fn all(
        &self,
        params: &ListParams,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<Vec<Task>, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let mut query = QueryBuilder::new(SELECT_TASK);
        dyn_query::push_filter(&mut query, &params.filter, TASK_FIELDS);
        dyn_query::push_sort(&mut query, &params.sort, TASK_FIELDS);
        dyn_query::push_page(&mut query, params.skip, params.limit);

        let tasks: Vec<Task> = query
            .build_query_as::<TaskRow>()
            .fetch_all(cxn.borrow_connection())
            .await
            .context("listing tasks")?
            .into_iter()
            .map(Task::from)
            .collect();

        Ok(tasks)
    }

    async fn count(
        &self,
        filter: &DocumentFilter,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<i64, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let mut query = QueryBuilder::new("SELECT count(*) FROM task");
        dyn_query::push_filter(&mut query, filter, TASK_FIELDS);

        let total: i64 = query
            .build_query_scalar()
            .fetch_one(cxn.borrow_connection())
            .await
            .context("counting tasks")?;

        Ok(total)
    }

    async fn by_id(
        &self,
        id: Uuid,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<Option<Task>, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let sql = format!("{SELECT_TASK} WHERE id = $1");
        let task: Option<TaskRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(cxn.borrow_connection())
            .await
            .context("fetching a task by id")?;

        Ok(task.map(Task::from))
    }
}

impl domain::task::driven_ports::TaskWriter for DbTaskWriter {
    async fn insert(
        &self,
        content: &TaskContent,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<Task, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let created: TaskRow = sqlx::query_as(
            "INSERT INTO task (name, description, deadline, completed) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, name, description, deadline, completed, \
                 assigned_user, assigned_user_name, date_created",
        )
        .bind(&content.name)
        .bind(&content.description)
        .bind(content.deadline)
        .bind(content.completed)
        .fetch_one(cxn.borrow_connection())
        .await
        .context("inserting a new task")?;

        Ok(Task::from(created))
    }

    async fn replace(
        &self,
        id: Uuid,
        content: &TaskContent,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<(), Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        // date_created is deliberately left out so the original timestamp survives
        sqlx::query(
            "UPDATE task SET name = $2, description = $3, deadline = $4, completed = $5, \
             assigned_user = '', assigned_user_name = $6 WHERE id = $1",
        )
        .bind(id)
        .bind(&content.name)
        .bind(&content.description)
        .bind(content.deadline)
        .bind(content.completed)
        .bind(UNASSIGNED_USER_NAME)
        .execute(cxn.borrow_connection())
        .await
        .context("replacing a task")?;

        Ok(())
    }

    async fn set_assignment(
        &self,
        id: Uuid,
        assignment: &Assignment,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<(), Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        sqlx::query("UPDATE task SET assigned_user = $2, assigned_user_name = $3 WHERE id = $1")
            .bind(id)
            .bind(&assignment.user)
            .bind(&assignment.user_name)
            .execute(cxn.borrow_connection())
            .await
            .context("updating a task's assignment")?;

        Ok(())
    }

    async fn assign_many(
        &self,
        ids: &[Uuid],
        assignment: &Assignment,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<u64, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let updated = sqlx::query(
            "UPDATE task SET assigned_user = $2, assigned_user_name = $3 WHERE id = ANY($1)",
        )
        .bind(ids.to_vec())
        .bind(&assignment.user)
        .bind(&assignment.user_name)
        .execute(cxn.borrow_connection())
        .await
        .context("assigning a set of tasks")?;

        Ok(updated.rows_affected())
    }

    async fn unassign_all_for(
        &self,
        user_id: Uuid,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<u64, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let updated = sqlx::query(
            "UPDATE task SET assigned_user = '', assigned_user_name = $2 \
             WHERE assigned_user = $1",
        )
        .bind(user_id.to_string())
        .bind(UNASSIGNED_USER_NAME)
        .execute(cxn.borrow_connection())
        .await
        .context("unassigning a user's tasks")?;

        Ok(updated.rows_affected())
    }

    async fn delete(&self, id: Uuid, ext_cxn: &mut impl ExternalConnectivity) -> Result<(), Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        sqlx::query("DELETE FROM task WHERE id = $1")
            .bind(id)
            .execute(cxn.borrow_connection())
            .await
            .context("removing a task")?;

        Ok(())
    }
}
