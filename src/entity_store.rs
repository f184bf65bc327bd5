//! # Entity Storage Abstraction
//!
//! Every game namespace holds five kinds of entities: users, tasks, files, comments and the
//! many-to-many "is solving" relation between users and tasks, plus the session table the web
//! layer authenticates against. The [`EntityStore`] trait is the uniform interface over them;
//! each call is one atomic unit of work and commits on its own.
//!
//! ## Cascades
//!
//! ```text
//! Task ──┬── Comment ── attached file ids (ordered, duplicates kept)
//!        └── Solving (user, task)
//! User ──┬── avatar file id
//!        ├── Comment (by login, NOT removed with the user)
//!        └── Solving (by login, NOT removed with the user)
//! ```
//!
//! Removing a task removes its comments and returns every file id they carried; removing a
//! comment returns its own file ids. Removing a user returns its avatar id and leaves the user's
//! comments and solvings in place as orphans. Removing a file only removes the file row. The
//! returned ids name physical files the caller may hand to the
//! [`FileJanitor`](crate::FileJanitor).
//!
//! ## Implementations
//!
//! - [`InMemoryEntityStore`]: `Mutex`-protected tables, for tests and embedding
//! - [`PgEntityStore`](crate::PgEntityStore): one PostgreSQL schema per game

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::{Future, ready};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::{
    Comment, EntityId, File, IdAllocator, NewComment, NewTask, NewUser, OvoError, SecretHasher,
    Solving, Task, TaskStatus, User, UserRole,
};

/// Interface over the entities of one game namespace.
///
/// # Errors
///
/// - `AlreadyExists`: duplicate login or duplicate solving pair
/// - `NotFound`: removing or updating an entity that does not exist
/// - `IdsExhausted`: every id candidate collided
/// - `Internal`: storage failure
///
/// References between entities (a comment's task, a user's avatar, the two ends of a solving)
/// are not validated on write.
pub trait EntityStore: Send + Sync {
    // Creation

    /// Adds a task under a freshly allocated id.
    fn add_task(&self, task: &NewTask) -> impl Future<Output = Result<EntityId, OvoError>> + Send;

    /// Registers a file name under a freshly allocated id.
    ///
    /// The bytes must be saved by the caller as `<files folder>/<id>`.
    fn add_file(&self, name: &str) -> impl Future<Output = Result<EntityId, OvoError>> + Send;

    /// Adds a user keyed by login; the password is hashed before it is stored.
    ///
    /// # Returns
    /// * `Ok(())` - User created
    /// * `Err(OvoError::AlreadyExists)` - The login is taken
    fn add_user(&self, user: &NewUser) -> impl Future<Output = Result<(), OvoError>> + Send;

    /// Adds a comment with zero or more attached file ids, kept in the given order.
    fn add_comment(
        &self,
        comment: &NewComment,
    ) -> impl Future<Output = Result<EntityId, OvoError>> + Send;

    // Removal

    /// Removes a task together with all of its comments.
    ///
    /// # Returns
    /// * `Ok(Vec<EntityId>)` - The attached file ids of every removed comment, duplicates kept
    /// * `Err(OvoError::NotFound)` - No such task
    fn remove_task(
        &self,
        id: &EntityId,
    ) -> impl Future<Output = Result<Vec<EntityId>, OvoError>> + Send;

    /// Removes one comment and returns exactly its attached file ids.
    fn remove_comment(
        &self,
        id: &EntityId,
    ) -> impl Future<Output = Result<Vec<EntityId>, OvoError>> + Send;

    /// Removes a user row and returns its avatar id.
    ///
    /// Comments and solvings referencing the login are left untouched.
    fn remove_user(
        &self,
        login: &str,
    ) -> impl Future<Output = Result<Option<EntityId>, OvoError>> + Send;

    /// Removes a file row. Avatars and attachments naming it are not updated.
    fn remove_file(&self, id: &EntityId) -> impl Future<Output = Result<(), OvoError>> + Send;

    // Relations and flags

    /// Records that `user` works on `task`; taking the same pair twice is `AlreadyExists`.
    fn take_task(
        &self,
        task: &EntityId,
        user: &str,
    ) -> impl Future<Output = Result<(), OvoError>> + Send;

    /// Deletes the solving pair; `NotFound` if it was not recorded.
    fn reject_task(
        &self,
        task: &EntityId,
        user: &str,
    ) -> impl Future<Output = Result<(), OvoError>> + Send;

    fn mark_user(
        &self,
        login: &str,
        role: UserRole,
    ) -> impl Future<Output = Result<(), OvoError>> + Send;

    fn mark_task(
        &self,
        id: &EntityId,
        status: TaskStatus,
    ) -> impl Future<Output = Result<(), OvoError>> + Send;

    /// Points a user's avatar at a file id, or clears it with `None`.
    fn update_avatar(
        &self,
        login: &str,
        avatar: Option<&EntityId>,
    ) -> impl Future<Output = Result<(), OvoError>> + Send;

    // Lookups

    fn get_user(&self, login: &str)
    -> impl Future<Output = Result<Option<User>, OvoError>> + Send;
    fn get_task(
        &self,
        id: &EntityId,
    ) -> impl Future<Output = Result<Option<Task>, OvoError>> + Send;
    fn get_file(
        &self,
        id: &EntityId,
    ) -> impl Future<Output = Result<Option<File>, OvoError>> + Send;
    fn get_comment(
        &self,
        id: &EntityId,
    ) -> impl Future<Output = Result<Option<Comment>, OvoError>> + Send;

    fn list_users(&self) -> impl Future<Output = Result<Vec<User>, OvoError>> + Send;
    fn list_tasks(&self) -> impl Future<Output = Result<Vec<Task>, OvoError>> + Send;
    fn list_files(&self) -> impl Future<Output = Result<Vec<File>, OvoError>> + Send;
    /// Comments in creation order.
    fn list_comments(&self) -> impl Future<Output = Result<Vec<Comment>, OvoError>> + Send;
    fn list_solvings(&self) -> impl Future<Output = Result<Vec<Solving>, OvoError>> + Send;

    // Sessions

    /// Starts a session for `login`, replacing any session the user already had.
    fn open_session(
        &self,
        login: &str,
    ) -> impl Future<Output = Result<EntityId, OvoError>> + Send;

    /// Resolves a session id to its user.
    fn user_for_session(
        &self,
        session: &EntityId,
    ) -> impl Future<Output = Result<Option<User>, OvoError>> + Send;

    /// Ends the user's session. Returns whether one existed.
    fn close_session(&self, login: &str) -> impl Future<Output = Result<bool, OvoError>> + Send;

    /// The hasher passwords are stored with.
    fn hasher(&self) -> &dyn SecretHasher;

    /// Checks a login/password pair; unknown logins simply fail to verify.
    fn verify_user(
        &self,
        login: &str,
        password: &str,
    ) -> impl Future<Output = Result<bool, OvoError>> + Send {
        async move {
            Ok(match self.get_user(login).await? {
                Some(user) => self.hasher().verify(password, &user.password_hash),
                None => false,
            })
        }
    }
}

////////////////////////////////////////// InMemoryEntityStore /////////////////////////////////////

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    tasks: Vec<Task>,
    files: Vec<File>,
    comments: Vec<Comment>,
    solvings: BTreeSet<Solving>,
    // login -> session id
    sessions: HashMap<String, EntityId>,
    // every id ever issued; never shrinks
    issued: HashSet<EntityId>,
}

impl Tables {
    fn user_mut(&mut self, login: &str) -> Result<&mut User, OvoError> {
        self.users
            .iter_mut()
            .find(|u| u.login == login)
            .ok_or_else(|| OvoError::NotFound(format!("user {}", login)))
    }

    fn task_mut(&mut self, id: &EntityId) -> Result<&mut Task, OvoError> {
        self.tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| OvoError::NotFound(format!("task {}", id)))
    }

    /// Claims `id` for good, failing like a primary key would if it was ever issued before.
    fn reserve_id(&mut self, id: &EntityId) -> Result<(), OvoError> {
        if !self.issued.insert(id.clone()) {
            return Err(OvoError::AlreadyExists(format!("id {}", id)));
        }
        Ok(())
    }
}

/// Thread-safe in-memory implementation of [`EntityStore`].
///
/// Every call takes the table lock once, so each operation is atomic with respect to the
/// others. Ids share one uniqueness domain across tasks, files, comments and sessions, and
/// stay claimed after their row is removed.
#[derive(Clone)]
pub struct InMemoryEntityStore {
    tables: Arc<Mutex<Tables>>,
    ids: IdAllocator,
    hasher: Arc<dyn SecretHasher>,
}

impl InMemoryEntityStore {
    pub fn new(ids: IdAllocator, hasher: Arc<dyn SecretHasher>) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            ids,
            hasher,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, OvoError> {
        self.tables
            .lock()
            .map_err(|_| OvoError::Internal("entity tables lock poisoned".to_string()))
    }

    /// Inserts a row built from a candidate id, failing like a primary key would.
    fn insert_with_id<F>(&self, id: &EntityId, insert: F) -> Result<(), OvoError>
    where
        F: FnOnce(&mut Tables),
    {
        let mut tables = self.lock()?;
        tables.reserve_id(id)?;
        insert(&mut tables);
        Ok(())
    }

    fn insert_session(&self, login: &str, session: EntityId) -> Result<(), OvoError> {
        let mut tables = self.lock()?;
        if !tables.users.iter().any(|u| u.login == login) {
            return Err(OvoError::NotFound(format!("user {}", login)));
        }
        tables.reserve_id(&session)?;
        tables.sessions.insert(login.to_string(), session);
        Ok(())
    }
}

impl EntityStore for InMemoryEntityStore {
    async fn add_task(&self, task: &NewTask) -> Result<EntityId, OvoError> {
        self.ids
            .allocate(|id| {
                ready(self.insert_with_id(&id, |tables| {
                    tables.tasks.push(Task {
                        id: id.clone(),
                        name: task.name.clone(),
                        solved: false,
                        original_link: task.original_link.clone(),
                        original_id: task.original_id.clone(),
                        text: task.text.clone(),
                    })
                }))
            })
            .await
    }

    async fn add_file(&self, name: &str) -> Result<EntityId, OvoError> {
        self.ids
            .allocate(|id| {
                ready(self.insert_with_id(&id, |tables| {
                    tables.files.push(File {
                        id: id.clone(),
                        name: name.to_string(),
                    })
                }))
            })
            .await
    }

    async fn add_user(&self, user: &NewUser) -> Result<(), OvoError> {
        let password_hash = self.hasher.hash(&user.password)?;
        let mut tables = self.lock()?;
        if tables.users.iter().any(|u| u.login == user.login) {
            return Err(OvoError::AlreadyExists(format!("user {}", user.login)));
        }
        tables.users.push(User {
            login: user.login.clone(),
            password_hash,
            is_captain: user.is_captain,
            avatar: user.avatar.clone(),
        });
        Ok(())
    }

    async fn add_comment(&self, comment: &NewComment) -> Result<EntityId, OvoError> {
        self.ids
            .allocate(|id| {
                ready(self.insert_with_id(&id, |tables| {
                    tables.comments.push(Comment {
                        id: id.clone(),
                        task_id: comment.task_id.clone(),
                        user_id: comment.user_id.clone(),
                        text: comment.text.clone(),
                        attached_files: comment.attached_files.clone(),
                        created_at: Utc::now(),
                    })
                }))
            })
            .await
    }

    async fn remove_task(&self, id: &EntityId) -> Result<Vec<EntityId>, OvoError> {
        let mut tables = self.lock()?;
        let position = tables
            .tasks
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| OvoError::NotFound(format!("task {}", id)))?;
        let orphaned = tables
            .comments
            .iter()
            .filter(|c| &c.task_id == id)
            .flat_map(|c| c.attached_files.iter().cloned())
            .collect();
        tables.comments.retain(|c| &c.task_id != id);
        tables.tasks.remove(position);
        Ok(orphaned)
    }

    async fn remove_comment(&self, id: &EntityId) -> Result<Vec<EntityId>, OvoError> {
        let mut tables = self.lock()?;
        let position = tables
            .comments
            .iter()
            .position(|c| &c.id == id)
            .ok_or_else(|| OvoError::NotFound(format!("comment {}", id)))?;
        Ok(tables.comments.remove(position).attached_files)
    }

    async fn remove_user(&self, login: &str) -> Result<Option<EntityId>, OvoError> {
        let mut tables = self.lock()?;
        let position = tables
            .users
            .iter()
            .position(|u| u.login == login)
            .ok_or_else(|| OvoError::NotFound(format!("user {}", login)))?;
        Ok(tables.users.remove(position).avatar)
    }

    async fn remove_file(&self, id: &EntityId) -> Result<(), OvoError> {
        let mut tables = self.lock()?;
        let position = tables
            .files
            .iter()
            .position(|f| &f.id == id)
            .ok_or_else(|| OvoError::NotFound(format!("file {}", id)))?;
        tables.files.remove(position);
        Ok(())
    }

    async fn take_task(&self, task: &EntityId, user: &str) -> Result<(), OvoError> {
        let mut tables = self.lock()?;
        let solving = Solving {
            user_id: user.to_string(),
            task_id: task.clone(),
        };
        if !tables.solvings.insert(solving) {
            return Err(OvoError::AlreadyExists(format!(
                "user {} already solves task {}",
                user, task
            )));
        }
        Ok(())
    }

    async fn reject_task(&self, task: &EntityId, user: &str) -> Result<(), OvoError> {
        let mut tables = self.lock()?;
        let solving = Solving {
            user_id: user.to_string(),
            task_id: task.clone(),
        };
        if !tables.solvings.remove(&solving) {
            return Err(OvoError::NotFound(format!(
                "user {} does not solve task {}",
                user, task
            )));
        }
        Ok(())
    }

    async fn mark_user(&self, login: &str, role: UserRole) -> Result<(), OvoError> {
        let mut tables = self.lock()?;
        tables.user_mut(login)?.is_captain = role.is_captain();
        Ok(())
    }

    async fn mark_task(&self, id: &EntityId, status: TaskStatus) -> Result<(), OvoError> {
        let mut tables = self.lock()?;
        tables.task_mut(id)?.solved = status.is_solved();
        Ok(())
    }

    async fn update_avatar(&self, login: &str, avatar: Option<&EntityId>) -> Result<(), OvoError> {
        let mut tables = self.lock()?;
        tables.user_mut(login)?.avatar = avatar.cloned();
        Ok(())
    }

    async fn get_user(&self, login: &str) -> Result<Option<User>, OvoError> {
        let tables = self.lock()?;
        Ok(tables.users.iter().find(|u| u.login == login).cloned())
    }

    async fn get_task(&self, id: &EntityId) -> Result<Option<Task>, OvoError> {
        let tables = self.lock()?;
        Ok(tables.tasks.iter().find(|t| &t.id == id).cloned())
    }

    async fn get_file(&self, id: &EntityId) -> Result<Option<File>, OvoError> {
        let tables = self.lock()?;
        Ok(tables.files.iter().find(|f| &f.id == id).cloned())
    }

    async fn get_comment(&self, id: &EntityId) -> Result<Option<Comment>, OvoError> {
        let tables = self.lock()?;
        Ok(tables.comments.iter().find(|c| &c.id == id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, OvoError> {
        Ok(self.lock()?.users.clone())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, OvoError> {
        Ok(self.lock()?.tasks.clone())
    }

    async fn list_files(&self) -> Result<Vec<File>, OvoError> {
        Ok(self.lock()?.files.clone())
    }

    async fn list_comments(&self) -> Result<Vec<Comment>, OvoError> {
        Ok(self.lock()?.comments.clone())
    }

    async fn list_solvings(&self) -> Result<Vec<Solving>, OvoError> {
        Ok(self.lock()?.solvings.iter().cloned().collect())
    }

    async fn open_session(&self, login: &str) -> Result<EntityId, OvoError> {
        self.ids
            .allocate(|session| ready(self.insert_session(login, session)))
            .await
    }

    async fn user_for_session(&self, session: &EntityId) -> Result<Option<User>, OvoError> {
        let tables = self.lock()?;
        let login = tables
            .sessions
            .iter()
            .find(|(_, s)| *s == session)
            .map(|(login, _)| login.clone());
        Ok(login.and_then(|login| tables.users.iter().find(|u| u.login == login).cloned()))
    }

    async fn close_session(&self, login: &str) -> Result<bool, OvoError> {
        Ok(self.lock()?.sessions.remove(login).is_some())
    }

    fn hasher(&self) -> &dyn SecretHasher {
        self.hasher.as_ref()
    }
}
