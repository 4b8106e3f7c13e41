use crate::domain::assignment::Assignment;
use crate::domain::queries::{DocumentFilter, FieldProjection, ListParams, Listing};
use crate::domain::task;
use crate::external_connections::{ExternalConnectivity, Transactable, TransactionHandle};
use anyhow::Context;
use serde::Serialize;
use uuid::Uuid;

/// A stored user. `pending_tasks` is the ordered set of task ids assigned to this user,
/// kept as id strings so it round-trips through the API unchanged.
#[derive(Debug, PartialEq, Eq, Serialize)]
#[cfg_attr(test, derive(Clone))]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub pending_tasks: Vec<String>,
}

/// The caller-supplied portion of a user, used for both creation and full replacement.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(Clone))]
pub struct UserContent {
    pub name: String,
    pub email: String,
    pub pending_tasks: Vec<String>,
}

pub mod driven_ports {
    use super::*;

    pub trait UserReader: Sync {
        async fn all(
            &self,
            params: &ListParams,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<Vec<User>, anyhow::Error>;

        async fn count(
            &self,
            filter: &DocumentFilter,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<i64, anyhow::Error>;

        async fn by_id(
            &self,
            id: Uuid,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<Option<User>, anyhow::Error>;
    }

    pub trait UserWriter: Sync {
        async fn insert(
            &self,
            content: &UserContent,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<User, anyhow::Error>;

        /// Rewrites a user's fields wholesale, `pending_tasks` included. Existence is
        /// checked by the caller.
        async fn replace(
            &self,
            id: Uuid,
            content: &UserContent,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<(), anyhow::Error>;

        async fn delete(
            &self,
            id: Uuid,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<(), anyhow::Error>;
    }

    /// Maintenance of the pending-task set from the task side of the house.
    pub trait PendingTaskWriter: Sync {
        /// Adds a task to a user's pending set, suppressing duplicates.
        async fn add_pending_task(
            &self,
            user_id: Uuid,
            task_id: Uuid,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<(), anyhow::Error>;

        async fn remove_pending_task(
            &self,
            user_id: Uuid,
            task_id: Uuid,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<(), anyhow::Error>;
    }

    pub trait DetectUser: Sync {
        async fn email_in_use(
            &self,
            email: &str,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<bool, anyhow::Error>;
    }
}

pub mod driving_ports {
    use super::*;
    use serde_json::Value;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum CreateUserError {
        #[error("a user with this email address already exists")]
        EmailInUse,
        #[error(transparent)]
        PortError(#[from] anyhow::Error),
    }

    #[derive(Debug, Error)]
    pub enum UserWriteError {
        #[error("user {0} does not exist")]
        NotFound(Uuid),
        #[error(transparent)]
        PortError(#[from] anyhow::Error),
    }

    pub trait UserPort {
        async fn list(
            &self,
            params: ListParams,
            ext_cxn: &mut impl ExternalConnectivity,
            user_read: &impl driven_ports::UserReader,
        ) -> Result<Listing, anyhow::Error>;

        async fn by_id(
            &self,
            id: Uuid,
            projection: FieldProjection,
            ext_cxn: &mut impl ExternalConnectivity,
            user_read: &impl driven_ports::UserReader,
        ) -> Result<Option<Value>, anyhow::Error>;

        async fn create(
            &self,
            content: UserContent,
            ext_cxn: &mut impl ExternalConnectivity,
            user_write: &impl driven_ports::UserWriter,
            user_detect: &impl driven_ports::DetectUser,
        ) -> Result<User, CreateUserError>;

        async fn replace(
            &self,
            id: Uuid,
            content: UserContent,
            tx_source: &impl Transactable,
            user_read: &impl driven_ports::UserReader,
            user_write: &impl driven_ports::UserWriter,
            task_write: &impl task::driven_ports::TaskWriter,
        ) -> Result<User, UserWriteError>;

        async fn delete(
            &self,
            id: Uuid,
            tx_source: &impl Transactable,
            user_read: &impl driven_ports::UserReader,
            user_write: &impl driven_ports::UserWriter,
            task_write: &impl task::driven_ports::TaskWriter,
        ) -> Result<(), UserWriteError>;
    }
}

pub struct UserService {}

impl driving_ports::UserPort for UserService {
    async fn list(
        &self,
        params: ListParams,
        ext_cxn: &mut impl ExternalConnectivity,
        user_read: &impl driven_ports::UserReader,
    ) -> Result<Listing, anyhow::Error> {
        if params.count_only {
            let total = user_read.count(&params.filter, &mut *ext_cxn).await?;
            return Ok(Listing::Count(total));
        }

        // Unlike tasks, user listings are unbounded when no limit is given.
        let users = user_read.all(&params, &mut *ext_cxn).await?;
        let mut documents = Vec::with_capacity(users.len());
        for user in &users {
            let serialized = serde_json::to_value(user).context("serializing a listed user")?;
            documents.push(params.projection.apply(serialized));
        }

        Ok(Listing::Documents(documents))
    }

    async fn by_id(
        &self,
        id: Uuid,
        projection: FieldProjection,
        ext_cxn: &mut impl ExternalConnectivity,
        user_read: &impl driven_ports::UserReader,
    ) -> Result<Option<serde_json::Value>, anyhow::Error> {
        let Some(user) = user_read.by_id(id, &mut *ext_cxn).await? else {
            return Ok(None);
        };

        let serialized = serde_json::to_value(&user).context("serializing a fetched user")?;
        Ok(Some(projection.apply(serialized)))
    }

    async fn create(
        &self,
        content: UserContent,
        ext_cxn: &mut impl ExternalConnectivity,
        user_write: &impl driven_ports::UserWriter,
        user_detect: &impl driven_ports::DetectUser,
    ) -> Result<User, driving_ports::CreateUserError> {
        let email_taken = user_detect
            .email_in_use(&content.email, &mut *ext_cxn)
            .await
            .context("checking for an email collision during user creation")?;
        if email_taken {
            return Err(driving_ports::CreateUserError::EmailInUse);
        }

        // The supplied pending_tasks list is stored verbatim: ids are not checked against
        // the task collection and no reverse links are created here. PUT is the
        // reconciliation path.
        let created = user_write
            .insert(&content, &mut *ext_cxn)
            .await
            .context("inserting a new user")?;
        Ok(created)
    }

    async fn replace(
        &self,
        id: Uuid,
        content: UserContent,
        tx_source: &impl Transactable,
        user_read: &impl driven_ports::UserReader,
        user_write: &impl driven_ports::UserWriter,
        task_write: &impl task::driven_ports::TaskWriter,
    ) -> Result<User, driving_ports::UserWriteError> {
        let mut txn = tx_source
            .start_transaction()
            .await
            .context("opening the user replace transaction")?;

        let existing = user_read
            .by_id(id, &mut txn)
            .await
            .context("loading the user being replaced")?;
        if existing.is_none() {
            return Err(driving_ports::UserWriteError::NotFound(id));
        }

        user_write.replace(id, &content, &mut txn).await?;

        // Reconcile the task collection against the new pending set: drop every current
        // assignment, then point the listed tasks at this user under their new name.
        task_write.unassign_all_for(id, &mut txn).await?;
        let pending_ids: Vec<Uuid> = content
            .pending_tasks
            .iter()
            .filter_map(|raw| Uuid::try_parse(raw).ok())
            .collect();
        if !pending_ids.is_empty() {
            let assignment = Assignment {
                user: id.to_string(),
                user_name: content.name.clone(),
            };
            task_write
                .assign_many(&pending_ids, &assignment, &mut txn)
                .await?;
        }

        txn.commit()
            .await
            .context("committing the user replace transaction")?;

        Ok(User {
            id,
            name: content.name,
            email: content.email,
            pending_tasks: content.pending_tasks,
        })
    }

    async fn delete(
        &self,
        id: Uuid,
        tx_source: &impl Transactable,
        user_read: &impl driven_ports::UserReader,
        user_write: &impl driven_ports::UserWriter,
        task_write: &impl task::driven_ports::TaskWriter,
    ) -> Result<(), driving_ports::UserWriteError> {
        let mut txn = tx_source
            .start_transaction()
            .await
            .context("opening the user delete transaction")?;

        let existing = user_read
            .by_id(id, &mut txn)
            .await
            .context("loading the user being deleted")?;
        if existing.is_none() {
            return Err(driving_ports::UserWriteError::NotFound(id));
        }

        task_write.unassign_all_for(id, &mut txn).await?;
        user_write.delete(id, &mut txn).await?;

        txn.commit()
            .await
            .context("committing the user delete transaction")?;
        Ok(())
    }
}


#[cfg(test)]
pub mod test_util {
    use super::driven_ports::{DetectUser, PendingTaskWriter, UserReader, UserWriter};
    use super::driving_ports::{CreateUserError, UserPort, UserWriteError};
    use super::*;
    use crate::domain::test_util::{Connectivity, FakeImplementation};
    use anyhow::anyhow;
    use serde_json::Value;
    use std::sync::{Mutex, RwLock};

    pub struct InMemoryUserPersistence {
        pub users: Vec<User>,
        pub connected: Connectivity,
        pub last_list_params: Option<ListParams>,
    }

    impl InMemoryUserPersistence {
        pub fn new() -> InMemoryUserPersistence {
            InMemoryUserPersistence {
                users: Vec::new(),
                connected: Connectivity::Connected,
                last_list_params: None,
            }
        }

        pub fn new_with_users(users: Vec<User>) -> InMemoryUserPersistence {
            InMemoryUserPersistence {
                users,
                connected: Connectivity::Connected,
                last_list_params: None,
            }
        }

        pub fn new_locked() -> RwLock<InMemoryUserPersistence> {
            RwLock::new(Self::new())
        }
    }

    /// A user fixture with an empty pending set and a fresh id.
    pub fn user_named(name: &str, email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            email: email.to_owned(),
            pending_tasks: Vec::new(),
        }
    }

    impl UserReader for RwLock<InMemoryUserPersistence> {
        async fn all(
            &self,
            params: &ListParams,
            _: &mut impl ExternalConnectivity,
        ) -> Result<Vec<User>, anyhow::Error> {
            let mut persistence = self.write().expect("user persist rw lock poisoned");
            persistence.connected.blow_up_if_disconnected()?;
            persistence.last_list_params = Some(params.clone());

            let users = persistence
                .users
                .iter()
                .skip(params.skip.unwrap_or(0) as usize)
                .take(params.limit.map(|cap| cap as usize).unwrap_or(usize::MAX))
                .cloned()
                .collect();
            Ok(users)
        }

        async fn count(
            &self,
            _filter: &DocumentFilter,
            _: &mut impl ExternalConnectivity,
        ) -> Result<i64, anyhow::Error> {
            let persistence = self.read().expect("user persist rw lock poisoned");
            persistence.connected.blow_up_if_disconnected()?;

            Ok(persistence.users.len() as i64)
        }

        async fn by_id(
            &self,
            id: Uuid,
            _: &mut impl ExternalConnectivity,
        ) -> Result<Option<User>, anyhow::Error> {
            let persistence = self.read().expect("user persist rw lock poisoned");
            persistence.connected.blow_up_if_disconnected()?;

            Ok(persistence.users.iter().find(|user| user.id == id).cloned())
        }
    }

    impl UserWriter for RwLock<InMemoryUserPersistence> {
        async fn insert(
            &self,
            content: &UserContent,
            _: &mut impl ExternalConnectivity,
        ) -> Result<User, anyhow::Error> {
            let mut persistence = self.write().expect("user persist rw lock poisoned");
            persistence.connected.blow_up_if_disconnected()?;

            let user = User {
                id: Uuid::new_v4(),
                name: content.name.clone(),
                email: content.email.clone(),
                pending_tasks: content.pending_tasks.clone(),
            };
            persistence.users.push(user.clone());
            Ok(user)
        }

        async fn replace(
            &self,
            id: Uuid,
            content: &UserContent,
            _: &mut impl ExternalConnectivity,
        ) -> Result<(), anyhow::Error> {
            let mut persistence = self.write().expect("user persist rw lock poisoned");
            persistence.connected.blow_up_if_disconnected()?;

            if let Some(user) = persistence.users.iter_mut().find(|user| user.id == id) {
                user.name = content.name.clone();
                user.email = content.email.clone();
                user.pending_tasks = content.pending_tasks.clone();
            }
            Ok(())
        }

        async fn delete(
            &self,
            id: Uuid,
            _: &mut impl ExternalConnectivity,
        ) -> Result<(), anyhow::Error> {
            let mut persistence = self.write().expect("user persist rw lock poisoned");
            persistence.connected.blow_up_if_disconnected()?;

            persistence.users.retain(|user| user.id != id);
            Ok(())
        }
    }

    impl PendingTaskWriter for RwLock<InMemoryUserPersistence> {
        async fn add_pending_task(
            &self,
            user_id: Uuid,
            task_id: Uuid,
            _: &mut impl ExternalConnectivity,
        ) -> Result<(), anyhow::Error> {
            let mut persistence = self.write().expect("user persist rw lock poisoned");
            persistence.connected.blow_up_if_disconnected()?;

            if let Some(user) = persistence.users.iter_mut().find(|user| user.id == user_id) {
                let entry = task_id.to_string();
                if !user.pending_tasks.contains(&entry) {
                    user.pending_tasks.push(entry);
                }
            }
            Ok(())
        }

        async fn remove_pending_task(
            &self,
            user_id: Uuid,
            task_id: Uuid,
            _: &mut impl ExternalConnectivity,
        ) -> Result<(), anyhow::Error> {
            let mut persistence = self.write().expect("user persist rw lock poisoned");
            persistence.connected.blow_up_if_disconnected()?;

            if let Some(user) = persistence.users.iter_mut().find(|user| user.id == user_id) {
                let entry = task_id.to_string();
                user.pending_tasks.retain(|pending| pending != &entry);
            }
            Ok(())
        }
    }

    impl DetectUser for RwLock<InMemoryUserPersistence> {
        async fn email_in_use(
            &self,
            email: &str,
            _: &mut impl ExternalConnectivity,
        ) -> Result<bool, anyhow::Error> {
            let persistence = self.read().expect("user persist rw lock poisoned");
            persistence.connected.blow_up_if_disconnected()?;

            Ok(persistence.users.iter().any(|user| user.email == email))
        }
    }

    impl Clone for CreateUserError {
        fn clone(&self) -> Self {
            match self {
                Self::EmailInUse => Self::EmailInUse,
                Self::PortError(err) => Self::PortError(anyhow!(format!("{}", err))),
            }
        }
    }

    impl Clone for UserWriteError {
        fn clone(&self) -> Self {
            match self {
                Self::NotFound(id) => Self::NotFound(*id),
                Self::PortError(err) => Self::PortError(anyhow!(format!("{}", err))),
            }
        }
    }

    pub struct MockUserService {
        pub list_result: FakeImplementation<ListParams, Result<Listing, anyhow::Error>>,
        pub by_id_result:
            FakeImplementation<(Uuid, FieldProjection), Result<Option<Value>, anyhow::Error>>,
        pub create_result: FakeImplementation<UserContent, Result<User, CreateUserError>>,
        pub replace_result: FakeImplementation<(Uuid, UserContent), Result<User, UserWriteError>>,
        pub delete_result: FakeImplementation<Uuid, Result<(), UserWriteError>>,
    }

    impl MockUserService {
        pub fn new() -> MockUserService {
            MockUserService {
                list_result: FakeImplementation::new(),
                by_id_result: FakeImplementation::new(),
                create_result: FakeImplementation::new(),
                replace_result: FakeImplementation::new(),
                delete_result: FakeImplementation::new(),
            }
        }

        pub fn new_locked() -> Mutex<MockUserService> {
            Mutex::new(Self::new())
        }
    }

    impl UserPort for Mutex<MockUserService> {
        async fn list(
            &self,
            params: ListParams,
            _ext_cxn: &mut impl ExternalConnectivity,
            _user_read: &impl UserReader,
        ) -> Result<Listing, anyhow::Error> {
            let mut locked_self = self.lock().expect("mock user service mutex poisoned");
            locked_self.list_result.save_arguments(params);

            locked_self.list_result.return_value_anyhow()
        }

        async fn by_id(
            &self,
            id: Uuid,
            projection: FieldProjection,
            _ext_cxn: &mut impl ExternalConnectivity,
            _user_read: &impl UserReader,
        ) -> Result<Option<Value>, anyhow::Error> {
            let mut locked_self = self.lock().expect("mock user service mutex poisoned");
            locked_self.by_id_result.save_arguments((id, projection));

            locked_self.by_id_result.return_value_anyhow()
        }

        async fn create(
            &self,
            content: UserContent,
            _ext_cxn: &mut impl ExternalConnectivity,
            _user_write: &impl UserWriter,
            _user_detect: &impl DetectUser,
        ) -> Result<User, CreateUserError> {
            let mut locked_self = self.lock().expect("mock user service mutex poisoned");
            locked_self.create_result.save_arguments(content);

            locked_self.create_result.return_value_result()
        }

        async fn replace(
            &self,
            id: Uuid,
            content: UserContent,
            _tx_source: &impl Transactable,
            _user_read: &impl UserReader,
            _user_write: &impl UserWriter,
            _task_write: &impl task::driven_ports::TaskWriter,
        ) -> Result<User, UserWriteError> {
            let mut locked_self = self.lock().expect("mock user service mutex poisoned");
            locked_self.replace_result.save_arguments((id, content));

            locked_self.replace_result.return_value_result()
        }

        async fn delete(
            &self,
            id: Uuid,
            _tx_source: &impl Transactable,
            _user_read: &impl UserReader,
            _user_write: &impl UserWriter,
            _task_write: &impl task::driven_ports::TaskWriter,
        ) -> Result<(), UserWriteError> {
            let mut locked_self = self.lock().expect("mock user service mutex poisoned");
            locked_self.delete_result.save_arguments(id);

            locked_self.delete_result.return_value_result()
        }
    }
}
