//! PostgreSQL storage for ovo.
//!
//! Every game is one schema named `OvO_<game id>` holding the tables in `namespace.sql`.
//! Per-table functions take an open transaction; [`PgEntityStore`] and [`PgGameRegistry`]
//! wrap each trait call in exactly one of them. Allocated ids are first claimed in the
//! `entity_ids` ledger within the same transaction, so a collision with any id ever issued in
//! the namespace rolls the insert back and the allocator retries.
//!
//! Operations select their schema structurally, through the per-game pool. Only `CREATE SCHEMA`
//! and `DROP SCHEMA` embed the quoted schema name, since PostgreSQL cannot bind identifiers; a
//! [`GameId`] cannot be constructed from anything but `[A-Za-z0-9_]`.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use crate::{
    Comment, EntityId, EntityStore, File, GameId, GameInfo, GameInfoPatch, GameRegistry,
    IdAllocator, NewComment, NewTask, NewUser, OvoError, SecretHasher, Solving, Task, TaskStatus,
    User, UserRole,
};

/// The singleton configuration row.
pub mod game_info;

pub mod comment;
pub mod entity_id;
pub mod file;
pub mod session;
pub mod solving;
pub mod task;
pub mod user;

/// Result type for database operations.
pub type SqlResult<T> = Result<T, OvoError>;

/// DDL for the tables of one namespace.
pub const NAMESPACE_DDL: &str = include_str!("namespace.sql");

const DUPLICATE_SCHEMA: &str = "42P06";
const INVALID_SCHEMA_NAME: &str = "3F000";

fn optional_id(raw: Option<String>) -> Option<EntityId> {
    raw.map(EntityId::from_trusted)
}

/////////////////////////////////////////// PgEntityStore //////////////////////////////////////////

/// [`EntityStore`] over one game's schema.
///
/// The pool's connections have `search_path` set to the game's schema, so the table modules
/// never name the schema themselves.
#[derive(Clone)]
pub struct PgEntityStore {
    pool: PgPool,
    ids: IdAllocator,
    hasher: Arc<dyn SecretHasher>,
}

impl PgEntityStore {
    pub fn new(pool: PgPool, ids: IdAllocator, hasher: Arc<dyn SecretHasher>) -> Self {
        Self { pool, ids, hasher }
    }
}

impl EntityStore for PgEntityStore {
    async fn add_task(&self, new_task: &NewTask) -> Result<EntityId, OvoError> {
        self.ids
            .allocate(|id| async move {
                let mut tx = self.pool.begin().await?;
                entity_id::reserve(&mut tx, &id).await?;
                task::insert(&mut tx, &id, new_task).await?;
                tx.commit().await?;
                Ok(())
            })
            .await
    }

    async fn add_file(&self, name: &str) -> Result<EntityId, OvoError> {
        self.ids
            .allocate(|id| async move {
                let mut tx = self.pool.begin().await?;
                entity_id::reserve(&mut tx, &id).await?;
                file::insert(&mut tx, &id, name).await?;
                tx.commit().await?;
                Ok(())
            })
            .await
    }

    async fn add_user(&self, new_user: &NewUser) -> Result<(), OvoError> {
        let password_hash = self.hasher.hash(&new_user.password)?;
        let mut tx = self.pool.begin().await?;
        user::insert(
            &mut tx,
            &new_user.login,
            &password_hash,
            new_user.is_captain,
            new_user.avatar.as_ref(),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn add_comment(&self, new_comment: &NewComment) -> Result<EntityId, OvoError> {
        self.ids
            .allocate(|id| async move {
                let mut tx = self.pool.begin().await?;
                entity_id::reserve(&mut tx, &id).await?;
                comment::insert(&mut tx, &id, new_comment).await?;
                tx.commit().await?;
                Ok(())
            })
            .await
    }

    async fn remove_task(&self, id: &EntityId) -> Result<Vec<EntityId>, OvoError> {
        let mut tx = self.pool.begin().await?;
        if task::get(&mut tx, id).await?.is_none() {
            return Err(OvoError::NotFound(format!("task {}", id)));
        }
        let orphaned = comment::delete_for_task(&mut tx, id).await?;
        task::delete(&mut tx, id).await?;
        tx.commit().await?;
        Ok(orphaned)
    }

    async fn remove_comment(&self, id: &EntityId) -> Result<Vec<EntityId>, OvoError> {
        let mut tx = self.pool.begin().await?;
        let attached = comment::delete(&mut tx, id)
            .await?
            .ok_or_else(|| OvoError::NotFound(format!("comment {}", id)))?;
        tx.commit().await?;
        Ok(attached)
    }

    async fn remove_user(&self, login: &str) -> Result<Option<EntityId>, OvoError> {
        let mut tx = self.pool.begin().await?;
        let avatar = user::delete(&mut tx, login)
            .await?
            .ok_or_else(|| OvoError::NotFound(format!("user {}", login)))?;
        tx.commit().await?;
        Ok(avatar)
    }

    async fn remove_file(&self, id: &EntityId) -> Result<(), OvoError> {
        let mut tx = self.pool.begin().await?;
        if !file::delete(&mut tx, id).await? {
            return Err(OvoError::NotFound(format!("file {}", id)));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn take_task(&self, task_id: &EntityId, login: &str) -> Result<(), OvoError> {
        let mut tx = self.pool.begin().await?;
        solving::insert(&mut tx, task_id, login).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn reject_task(&self, task_id: &EntityId, login: &str) -> Result<(), OvoError> {
        let mut tx = self.pool.begin().await?;
        if !solving::delete(&mut tx, task_id, login).await? {
            return Err(OvoError::NotFound(format!(
                "user {} does not solve task {}",
                login, task_id
            )));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn mark_user(&self, login: &str, role: UserRole) -> Result<(), OvoError> {
        let mut tx = self.pool.begin().await?;
        if !user::set_captain(&mut tx, login, role.is_captain()).await? {
            return Err(OvoError::NotFound(format!("user {}", login)));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn mark_task(&self, id: &EntityId, status: TaskStatus) -> Result<(), OvoError> {
        let mut tx = self.pool.begin().await?;
        if !task::set_solved(&mut tx, id, status.is_solved()).await? {
            return Err(OvoError::NotFound(format!("task {}", id)));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_avatar(&self, login: &str, avatar: Option<&EntityId>) -> Result<(), OvoError> {
        let mut tx = self.pool.begin().await?;
        if !user::set_avatar(&mut tx, login, avatar).await? {
            return Err(OvoError::NotFound(format!("user {}", login)));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_user(&self, login: &str) -> Result<Option<User>, OvoError> {
        let mut tx = self.pool.begin().await?;
        let found = user::get(&mut tx, login).await?;
        tx.commit().await?;
        Ok(found)
    }

    async fn get_task(&self, id: &EntityId) -> Result<Option<Task>, OvoError> {
        let mut tx = self.pool.begin().await?;
        let found = task::get(&mut tx, id).await?;
        tx.commit().await?;
        Ok(found)
    }

    async fn get_file(&self, id: &EntityId) -> Result<Option<File>, OvoError> {
        let mut tx = self.pool.begin().await?;
        let found = file::get(&mut tx, id).await?;
        tx.commit().await?;
        Ok(found)
    }

    async fn get_comment(&self, id: &EntityId) -> Result<Option<Comment>, OvoError> {
        let mut tx = self.pool.begin().await?;
        let found = comment::get(&mut tx, id).await?;
        tx.commit().await?;
        Ok(found)
    }

    async fn list_users(&self) -> Result<Vec<User>, OvoError> {
        let mut tx = self.pool.begin().await?;
        let rows = user::list(&mut tx).await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, OvoError> {
        let mut tx = self.pool.begin().await?;
        let rows = task::list(&mut tx).await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn list_files(&self) -> Result<Vec<File>, OvoError> {
        let mut tx = self.pool.begin().await?;
        let rows = file::list(&mut tx).await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn list_comments(&self) -> Result<Vec<Comment>, OvoError> {
        let mut tx = self.pool.begin().await?;
        let rows = comment::list(&mut tx).await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn list_solvings(&self) -> Result<Vec<Solving>, OvoError> {
        let mut tx = self.pool.begin().await?;
        let rows = solving::list(&mut tx).await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn open_session(&self, login: &str) -> Result<EntityId, OvoError> {
        self.ids
            .allocate(|session_id| async move {
                let mut tx = self.pool.begin().await?;
                if user::get(&mut tx, login).await?.is_none() {
                    return Err(OvoError::NotFound(format!("user {}", login)));
                }
                entity_id::reserve(&mut tx, &session_id).await?;
                session::replace(&mut tx, login, &session_id).await?;
                tx.commit().await?;
                Ok(())
            })
            .await
    }

    async fn user_for_session(&self, session_id: &EntityId) -> Result<Option<User>, OvoError> {
        let mut tx = self.pool.begin().await?;
        let found = session::user_for(&mut tx, session_id).await?;
        tx.commit().await?;
        Ok(found)
    }

    async fn close_session(&self, login: &str) -> Result<bool, OvoError> {
        let mut tx = self.pool.begin().await?;
        let existed = session::delete(&mut tx, login).await?;
        tx.commit().await?;
        Ok(existed)
    }

    fn hasher(&self) -> &dyn SecretHasher {
        self.hasher.as_ref()
    }
}

////////////////////////////////////////// PgGameRegistry //////////////////////////////////////////

/// [`GameRegistry`] over one PostgreSQL database, one schema per game.
pub struct PgGameRegistry {
    admin: PgPool,
    connect: PgConnectOptions,
    pools: Mutex<HashMap<GameId, PgPool>>,
    ids: IdAllocator,
    hasher: Arc<dyn SecretHasher>,
}

impl PgGameRegistry {
    /// Connects to the database at `url`.
    pub async fn connect(
        url: &str,
        ids: IdAllocator,
        hasher: Arc<dyn SecretHasher>,
    ) -> Result<Self, OvoError> {
        let connect = PgConnectOptions::from_str(url)?;
        let admin = PgPoolOptions::new()
            .max_connections(2)
            .connect_with(connect.clone())
            .await?;
        Ok(Self {
            admin,
            connect,
            pools: Mutex::new(HashMap::new()),
            ids,
            hasher,
        })
    }

    fn lock_pools(&self) -> Result<MutexGuard<'_, HashMap<GameId, PgPool>>, OvoError> {
        self.pools
            .lock()
            .map_err(|_| OvoError::Internal("namespace pool cache poisoned".to_string()))
    }

    /// A lazily connecting pool whose sessions resolve table names in the game's schema.
    fn namespace_pool(&self, game: &GameId) -> Result<PgPool, OvoError> {
        let mut pools = self.lock_pools()?;
        let pool = pools.entry(game.clone()).or_insert_with(|| {
            let options = self
                .connect
                .clone()
                .options([("search_path", game.quoted_schema())]);
            PgPoolOptions::new()
                .max_connections(5)
                .connect_lazy_with(options)
        });
        Ok(pool.clone())
    }

    async fn game_exists(&self, game: &GameId) -> Result<bool, OvoError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
        )
        .bind(game.schema_name())
        .fetch_one(&self.admin)
        .await?;
        Ok(exists)
    }
}

fn has_code(e: &sqlx::Error, code: &str) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(code))
}

impl GameRegistry for PgGameRegistry {
    type Entities = PgEntityStore;

    async fn exists(&self, game: &GameId) -> Result<bool, OvoError> {
        self.game_exists(game).await
    }

    async fn list(&self) -> Result<Vec<GameId>, OvoError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r"SELECT schema_name FROM information_schema.schemata
              WHERE schema_name LIKE 'OvO\_%' ORDER BY schema_name",
        )
        .fetch_all(&self.admin)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(schema,)| GameId::from_schema_name(&schema))
            .collect())
    }

    async fn create_namespace(&self, game: &GameId) -> Result<(), OvoError> {
        let schema = game.quoted_schema();
        let mut tx = self.admin.begin().await?;
        let created = sqlx::query(&format!("CREATE SCHEMA {}", schema))
            .execute(&mut *tx)
            .await;
        match created {
            Ok(_) => {}
            Err(e) if has_code(&e, DUPLICATE_SCHEMA) => {
                return Err(OvoError::AlreadyExists(format!("game {}", game)));
            }
            Err(e) => {
                tracing::error!(game = %game, error = %e, "database error creating schema");
                return Err(e.into());
            }
        }
        sqlx::query("SELECT set_config('search_path', $1, true)")
            .bind(&schema)
            .execute(&mut *tx)
            .await?;
        sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(NAMESPACE_DDL)).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn drop_namespace(&self, game: &GameId) -> Result<(), OvoError> {
        let cached = self.lock_pools()?.remove(game);
        if let Some(pool) = cached {
            pool.close().await;
        }
        let result = sqlx::query(&format!("DROP SCHEMA {} CASCADE", game.quoted_schema()))
            .execute(&self.admin)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if has_code(&e, INVALID_SCHEMA_NAME) => {
                Err(OvoError::NotFound(format!("game {}", game)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_game_info(&self, game: &GameId, info: &GameInfo) -> Result<(), OvoError> {
        let mut tx = self.namespace_pool(game)?.begin().await?;
        game_info::insert(&mut tx, info).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_game_info(&self, game: &GameId, patch: &GameInfoPatch) -> Result<(), OvoError> {
        let mut tx = self.namespace_pool(game)?.begin().await?;
        if !game_info::update(&mut tx, patch).await? {
            return Err(OvoError::NotFound(format!("configuration of game {}", game)));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn game_info(&self, game: &GameId) -> Result<GameInfo, OvoError> {
        let mut tx = self.namespace_pool(game)?.begin().await?;
        let info = game_info::get(&mut tx).await?;
        tx.commit().await?;
        info.ok_or_else(|| OvoError::NotFound(format!("configuration of game {}", game)))
    }

    fn entities(&self, game: &GameId) -> Result<PgEntityStore, OvoError> {
        Ok(PgEntityStore::new(
            self.namespace_pool(game)?,
            self.ids.clone(),
            self.hasher.clone(),
        ))
    }
}

#[cfg(test)]
/// Test utilities for PostgreSQL storage.
///
/// Tests that need a database return early unless `TEST_DATABASE_URL` is set.
pub mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;
    use crate::Bcrypt;

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    pub async fn setup_test_registry() -> Option<PgGameRegistry> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        Some(
            PgGameRegistry::connect(&url, IdAllocator::default(), Arc::new(Bcrypt::CHEAPEST))
                .await
                .expect("Failed to connect to test database"),
        )
    }

    /// A game id unique to this process, timestamp and call.
    pub fn unique_game() -> GameId {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        GameId::new(&format!(
            "t{}_{}_{}",
            std::process::id(),
            timestamp % 1_000_000_000_000,
            counter
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn namespace_round_trip() {
        let Some(registry) = setup_test_registry().await else {
            return;
        };
        let game = unique_game();
        assert!(!registry.exists(&game).await.unwrap());
        registry.create_namespace(&game).await.unwrap();
        assert!(registry.exists(&game).await.unwrap());
        assert!(registry.list().await.unwrap().contains(&game));
        assert!(matches!(
            registry.create_namespace(&game).await,
            Err(OvoError::AlreadyExists(_))
        ));
        registry.drop_namespace(&game).await.unwrap();
        assert!(!registry.exists(&game).await.unwrap());
        assert!(matches!(
            registry.drop_namespace(&game).await,
            Err(OvoError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn game_info_insert_update_get() {
        let Some(registry) = setup_test_registry().await else {
            return;
        };
        let game = unique_game();
        registry.create_namespace(&game).await.unwrap();
        assert!(matches!(
            registry.game_info(&game).await,
            Err(OvoError::NotFound(_))
        ));
        let info = GameInfo {
            port: 5000,
            files_folder: "/srv/ovo/files".into(),
            register_pass: "h1".into(),
            captain_pass: "h2".into(),
            judge_url: None,
            judge_login: None,
            judge_pass: None,
        };
        registry.insert_game_info(&game, &info).await.unwrap();
        assert!(matches!(
            registry.insert_game_info(&game, &info).await,
            Err(OvoError::AlreadyExists(_))
        ));
        registry
            .update_game_info(
                &game,
                &GameInfoPatch {
                    judge_url: Some("https://ctfd.example".into()),
                    ..GameInfoPatch::default()
                },
            )
            .await
            .unwrap();
        let stored = registry.game_info(&game).await.unwrap();
        assert_eq!(stored.port, 5000);
        assert_eq!(stored.judge_url.as_deref(), Some("https://ctfd.example"));
        registry.drop_namespace(&game).await.unwrap();
    }

    #[tokio::test]
    async fn cascades_match_in_memory_semantics() {
        let Some(registry) = setup_test_registry().await else {
            return;
        };
        let game = unique_game();
        registry.create_namespace(&game).await.unwrap();
        let store = registry.entities(&game).unwrap();

        let task = store.add_task(&NewTask::named("crypto")).await.unwrap();
        let f1 = store.add_file("a").await.unwrap();
        let f2 = store.add_file("b").await.unwrap();
        let comment = |files: Vec<EntityId>| NewComment {
            task_id: task.clone(),
            user_id: "alice".into(),
            text: None,
            attached_files: files,
        };
        store
            .add_comment(&comment(vec![f1.clone(), f2.clone()]))
            .await
            .unwrap();
        store.add_comment(&comment(vec![f1.clone()])).await.unwrap();

        assert_eq!(
            store.remove_task(&task).await.unwrap(),
            vec![f1.clone(), f2.clone(), f1.clone()]
        );
        assert!(store.list_comments().await.unwrap().is_empty());
        assert_eq!(store.list_files().await.unwrap().len(), 2);

        let mut alice = NewUser::new("alice", "pw");
        alice.avatar = Some(f2.clone());
        store.add_user(&alice).await.unwrap();
        assert!(matches!(
            store.add_user(&alice).await,
            Err(OvoError::AlreadyExists(_))
        ));
        assert!(store.verify_user("alice", "pw").await.unwrap());
        let session = store.open_session("alice").await.unwrap();
        assert_eq!(
            store.user_for_session(&session).await.unwrap().unwrap().login,
            "alice"
        );
        assert_eq!(store.remove_user("alice").await.unwrap(), Some(f2));
        assert!(store.user_for_session(&session).await.unwrap().is_none());

        let mut tx = store.pool.begin().await.unwrap();
        assert!(entity_id::is_reserved(&mut tx, &task).await.unwrap());
        assert!(entity_id::is_reserved(&mut tx, &session).await.unwrap());
        tx.rollback().await.unwrap();

        registry.drop_namespace(&game).await.unwrap();
    }

    #[tokio::test]
    async fn removed_ids_are_never_reissued() {
        let Some(registry) = setup_test_registry().await else {
            return;
        };
        let game = unique_game();
        registry.create_namespace(&game).await.unwrap();
        let reused = EntityId::from_bytes(&[3u8; crate::ID_BYTES]);
        let fresh = EntityId::from_bytes(&[4u8; crate::ID_BYTES]);
        let store = PgEntityStore::new(
            registry.namespace_pool(&game).unwrap(),
            IdAllocator::new(
                Arc::new(crate::ScriptedIds::new([
                    reused.clone(),
                    reused.clone(),
                    fresh.clone(),
                    fresh.clone(),
                ])),
                5,
            ),
            Arc::new(Bcrypt::CHEAPEST),
        );

        let first = store.add_file("a").await.unwrap();
        assert_eq!(first, reused);
        store.remove_file(&first).await.unwrap();
        assert_eq!(store.add_file("b").await.unwrap(), fresh);
        // a task may not take an id a file already holds
        assert!(matches!(
            store.add_task(&NewTask::named("t")).await,
            Ok(id) if id != fresh && id != reused
        ));

        registry.drop_namespace(&game).await.unwrap();
    }
}
