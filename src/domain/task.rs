use crate::domain::assignment::{self, Assignment, UNASSIGNED_USER_NAME};
use crate::domain::queries::{DocumentFilter, FieldProjection, ListParams, Listing};
use crate::domain::user;
use crate::external_connections::{ExternalConnectivity, Transactable, TransactionHandle};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Tasks with no explicit limit on a list request are capped to this many results.
pub const DEFAULT_LIST_LIMIT: u64 = 100;

/// A stored task. `assigned_user`/`assigned_user_name` carry the unassigned sentinel
/// (empty string / "unassigned") when nobody owns the task.
#[derive(Debug, PartialEq, Eq, Serialize)]
#[cfg_attr(test, derive(Clone))]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub completed: bool,
    pub assigned_user: String,
    pub assigned_user_name: String,
    pub date_created: DateTime<Utc>,
}

/// The caller-editable portion of a task. Assignment fields are managed separately so the
/// link/unlink choreography owns them.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(Clone))]
pub struct TaskContent {
    pub name: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub completed: bool,
}

/// A request to create or fully replace a task. `assigned_user` is the requested owner as
/// supplied by the caller; it may be empty, unparsable, or stale.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(Clone))]
pub struct CreateTask {
    pub content: TaskContent,
    pub assigned_user: String,
}

pub mod driven_ports {
    use super::*;

    pub trait TaskReader: Sync {
        /// Lists tasks matching the given dynamic query. Projection and count handling
        /// happen above this port; only filter/sort/skip/limit apply here.
        async fn all(
            &self,
            params: &ListParams,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<Vec<Task>, anyhow::Error>;

        async fn count(
            &self,
            filter: &DocumentFilter,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<i64, anyhow::Error>;

        async fn by_id(
            &self,
            id: Uuid,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<Option<Task>, anyhow::Error>;
    }

    pub trait TaskWriter: Sync {
        /// Inserts a task with the unassigned sentinel; ownership is attached afterwards
        /// within the same transaction via [TaskWriter::set_assignment].
        async fn insert(
            &self,
            content: &TaskContent,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<Task, anyhow::Error>;

        /// Rewrites a task's content and resets it to the unassigned sentinel, leaving the
        /// creation timestamp untouched. Missing ids are a no-op; existence is checked by
        /// the caller.
        async fn replace(
            &self,
            id: Uuid,
            content: &TaskContent,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<(), anyhow::Error>;

        async fn set_assignment(
            &self,
            id: Uuid,
            assignment: &Assignment,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<(), anyhow::Error>;

        /// Points every listed task at the given assignment, reporting how many were
        /// actually updated.
        async fn assign_many(
            &self,
            ids: &[Uuid],
            assignment: &Assignment,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<u64, anyhow::Error>;

        /// Resets every task owned by the given user to the unassigned sentinel.
        async fn unassign_all_for(
            &self,
            user_id: Uuid,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<u64, anyhow::Error>;

        async fn delete(
            &self,
            id: Uuid,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<(), anyhow::Error>;
    }
}

pub mod driving_ports {
    use super::*;
    use serde_json::Value;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum TaskWriteError {
        #[error("task {0} does not exist")]
        NotFound(Uuid),
        #[error(transparent)]
        PortError(#[from] anyhow::Error),
    }

    pub trait TaskPort {
        async fn list(
            &self,
            params: ListParams,
            ext_cxn: &mut impl ExternalConnectivity,
            task_read: &impl driven_ports::TaskReader,
        ) -> Result<Listing, anyhow::Error>;

        async fn by_id(
            &self,
            id: Uuid,
            projection: FieldProjection,
            ext_cxn: &mut impl ExternalConnectivity,
            task_read: &impl driven_ports::TaskReader,
        ) -> Result<Option<Value>, anyhow::Error>;

        async fn create(
            &self,
            new_task: CreateTask,
            tx_source: &impl Transactable,
            task_write: &impl driven_ports::TaskWriter,
            user_read: &impl user::driven_ports::UserReader,
            pending_write: &impl user::driven_ports::PendingTaskWriter,
        ) -> Result<Task, anyhow::Error>;

        async fn replace(
            &self,
            id: Uuid,
            new_task: CreateTask,
            tx_source: &impl Transactable,
            task_read: &impl driven_ports::TaskReader,
            task_write: &impl driven_ports::TaskWriter,
            user_read: &impl user::driven_ports::UserReader,
            pending_write: &impl user::driven_ports::PendingTaskWriter,
        ) -> Result<Task, TaskWriteError>;

        async fn delete(
            &self,
            id: Uuid,
            tx_source: &impl Transactable,
            task_read: &impl driven_ports::TaskReader,
            task_write: &impl driven_ports::TaskWriter,
            pending_write: &impl user::driven_ports::PendingTaskWriter,
        ) -> Result<(), TaskWriteError>;
    }
}

pub struct TaskService {}

impl driving_ports::TaskPort for TaskService {
    async fn list(
        &self,
        params: ListParams,
        ext_cxn: &mut impl ExternalConnectivity,
        task_read: &impl driven_ports::TaskReader,
    ) -> Result<Listing, anyhow::Error> {
        if params.count_only {
            let total = task_read.count(&params.filter, &mut *ext_cxn).await?;
            return Ok(Listing::Count(total));
        }

        let mut params = params;
        if params.limit.is_none() {
            params.limit = Some(DEFAULT_LIST_LIMIT);
        }

        let tasks = task_read.all(&params, &mut *ext_cxn).await?;
        let mut documents = Vec::with_capacity(tasks.len());
        for task in &tasks {
            let serialized = serde_json::to_value(task).context("serializing a listed task")?;
            documents.push(params.projection.apply(serialized));
        }

        Ok(Listing::Documents(documents))
    }

    async fn by_id(
        &self,
        id: Uuid,
        projection: FieldProjection,
        ext_cxn: &mut impl ExternalConnectivity,
        task_read: &impl driven_ports::TaskReader,
    ) -> Result<Option<serde_json::Value>, anyhow::Error> {
        let Some(task) = task_read.by_id(id, &mut *ext_cxn).await? else {
            return Ok(None);
        };

        let serialized = serde_json::to_value(&task).context("serializing a fetched task")?;
        Ok(Some(projection.apply(serialized)))
    }

    async fn create(
        &self,
        new_task: CreateTask,
        tx_source: &impl Transactable,
        task_write: &impl driven_ports::TaskWriter,
        user_read: &impl user::driven_ports::UserReader,
        pending_write: &impl user::driven_ports::PendingTaskWriter,
    ) -> Result<Task, anyhow::Error> {
        let mut txn = tx_source
            .start_transaction()
            .await
            .context("opening the task create transaction")?;

        let mut created = task_write.insert(&new_task.content, &mut txn).await?;
        if !new_task.assigned_user.is_empty() {
            let assignment = assignment::link_task(
                created.id,
                &new_task.assigned_user,
                &mut txn,
                user_read,
                pending_write,
            )
            .await?;
            if !assignment.is_unassigned() {
                task_write
                    .set_assignment(created.id, &assignment, &mut txn)
                    .await?;
            }
            created.assigned_user = assignment.user;
            created.assigned_user_name = assignment.user_name;
        }

        txn.commit()
            .await
            .context("committing the task create transaction")?;
        Ok(created)
    }

    async fn replace(
        &self,
        id: Uuid,
        new_task: CreateTask,
        tx_source: &impl Transactable,
        task_read: &impl driven_ports::TaskReader,
        task_write: &impl driven_ports::TaskWriter,
        user_read: &impl user::driven_ports::UserReader,
        pending_write: &impl user::driven_ports::PendingTaskWriter,
    ) -> Result<Task, driving_ports::TaskWriteError> {
        let mut txn = tx_source
            .start_transaction()
            .await
            .context("opening the task replace transaction")?;

        let existing = task_read
            .by_id(id, &mut txn)
            .await
            .context("loading the task being replaced")?;
        let Some(existing) = existing else {
            return Err(driving_ports::TaskWriteError::NotFound(id));
        };

        // Only detach the previous owner when ownership actually moves; an unchanged
        // assignment just gets its pending entry and denormalized name refreshed below.
        if !existing.assigned_user.is_empty() && existing.assigned_user != new_task.assigned_user {
            assignment::unlink_task(id, &existing.assigned_user, &mut txn, pending_write).await?;
        }

        task_write.replace(id, &new_task.content, &mut txn).await?;

        let mut final_assignment = Assignment::unassigned();
        if !new_task.assigned_user.is_empty() {
            final_assignment = assignment::link_task(
                id,
                &new_task.assigned_user,
                &mut txn,
                user_read,
                pending_write,
            )
            .await?;
            if !final_assignment.is_unassigned() {
                task_write
                    .set_assignment(id, &final_assignment, &mut txn)
                    .await?;
            }
        }

        txn.commit()
            .await
            .context("committing the task replace transaction")?;

        let CreateTask { content, .. } = new_task;
        Ok(Task {
            id,
            name: content.name,
            description: content.description,
            deadline: content.deadline,
            completed: content.completed,
            assigned_user: final_assignment.user,
            assigned_user_name: final_assignment.user_name,
            date_created: existing.date_created,
        })
    }

    async fn delete(
        &self,
        id: Uuid,
        tx_source: &impl Transactable,
        task_read: &impl driven_ports::TaskReader,
        task_write: &impl driven_ports::TaskWriter,
        pending_write: &impl user::driven_ports::PendingTaskWriter,
    ) -> Result<(), driving_ports::TaskWriteError> {
        let mut txn = tx_source
            .start_transaction()
            .await
            .context("opening the task delete transaction")?;

        let existing = task_read
            .by_id(id, &mut txn)
            .await
            .context("loading the task being deleted")?;
        let Some(existing) = existing else {
            return Err(driving_ports::TaskWriteError::NotFound(id));
        };

        if !existing.assigned_user.is_empty() {
            assignment::unlink_task(id, &existing.assigned_user, &mut txn, pending_write).await?;
        }
        task_write.delete(id, &mut txn).await?;

        txn.commit()
            .await
            .context("committing the task delete transaction")?;
        Ok(())
    }
}
