use crate::domain::user;
use crate::external_connections::ExternalConnectivity;
use anyhow::Context;
use uuid::Uuid;

/// The denormalized owner name stored on tasks nobody owns.
pub const UNASSIGNED_USER_NAME: &str = "unassigned";

/// A task's owner reference: the owning user's id rendered as a string plus a denormalized
/// copy of their name, or the empty-string/"unassigned" sentinel pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub user: String,
    pub user_name: String,
}

impl Assignment {
    pub fn unassigned() -> Self {
        Self {
            user: String::new(),
            user_name: UNASSIGNED_USER_NAME.to_owned(),
        }
    }

    pub fn to_user(user: &user::User) -> Self {
        Self {
            user: user.id.to_string(),
            user_name: user.name.clone(),
        }
    }

    pub fn is_unassigned(&self) -> bool {
        self.user.is_empty()
    }
}

/// Links a task to the requested user by adding the task to the user's pending set
/// (duplicates suppressed) and reporting the assignment the task should carry. A user that
/// cannot be resolved — the id doesn't parse, or nobody has it — degrades the link to an
/// unassigned result instead of failing.
///
/// The caller writes the returned assignment onto the task inside the same transaction, so
/// no half-linked state is ever visible outside it.
pub async fn link_task(
    task_id: Uuid,
    requested_user: &str,
    ext_cxn: &mut impl ExternalConnectivity,
    user_read: &impl user::driven_ports::UserReader,
    pending_write: &impl user::driven_ports::PendingTaskWriter,
) -> Result<Assignment, anyhow::Error> {
    let Ok(user_id) = Uuid::try_parse(requested_user) else {
        return Ok(Assignment::unassigned());
    };

    let resolved_user = user_read
        .by_id(user_id, &mut *ext_cxn)
        .await
        .context("resolving the assignee during link")?;
    let Some(user) = resolved_user else {
        return Ok(Assignment::unassigned());
    };

    pending_write
        .add_pending_task(user.id, task_id, &mut *ext_cxn)
        .await
        .context("recording the pending task during link")?;

    Ok(Assignment::to_user(&user))
}

/// Removes a task from its owner's pending set. The caller clears the task-side fields in
/// the same transaction. Owners that no longer resolve are ignored — there is no pending
/// set left to fix.
pub async fn unlink_task(
    task_id: Uuid,
    owner: &str,
    ext_cxn: &mut impl ExternalConnectivity,
    pending_write: &impl user::driven_ports::PendingTaskWriter,
) -> Result<(), anyhow::Error> {
    if let Ok(user_id) = Uuid::try_parse(owner) {
        pending_write
            .remove_pending_task(user_id, task_id, &mut *ext_cxn)
            .await
            .context("dropping the pending task during unlink")?;
    }

    Ok(())
}
