//! # OvO: a CTF team's game manager
//!
//! OvO provisions, runs and tears down *games*. A game is one CTF competition a team takes
//! part in: its own isolated storage namespace, a folder of uploaded files and a serving
//! process that exposes the game's data over HTTP.
//!
//! This crate provides:
//!
//! - **Entity storage**: users, tasks, files, comments and "is solving" pairs behind the
//!   [`EntityStore`] trait, with PostgreSQL and in-memory backends
//! - **Id allocation**: 128-hex-character random ids allocated by compare-and-insert with a
//!   bounded retry on collision
//! - **Game lifecycle**: run, rerun, stop and cleanup through [`LifecycleController`]
//! - **File cleanup**: best-effort deletion of physical files through [`FileJanitor`]
//! - **HTTP API**: listings, registration, sessions and player writes served by `ovod`
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ ovo CLI (commands)    │ ovod (web)           │
//! ├──────────────────────────────────────────────┤
//! │ LifecycleController   │ FileJanitor          │
//! ├──────────────────────────────────────────────┤
//! │ GameRegistry          │ EntityStore          │
//! ├──────────────────────────────────────────────┤
//! │ PostgreSQL: one schema per game (sql)        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage Examples
//!
//! ### Working with a game's entities
//!
//! ```rust
//! # use std::sync::Arc;
//! # use ovo::{EntityStore, IdAllocator, InMemoryEntityStore, NewComment, NewTask, Bcrypt};
//! # tokio_test_block_on(async {
//! let store = InMemoryEntityStore::new(IdAllocator::default(), Arc::new(Bcrypt::CHEAPEST));
//!
//! let task = store.add_task(&NewTask::named("pwn100")).await.unwrap();
//! let file = store.add_file("exploit.py").await.unwrap();
//! store
//!     .add_comment(&NewComment {
//!         task_id: task.clone(),
//!         user_id: "alice".to_string(),
//!         text: None,
//!         attached_files: vec![file.clone()],
//!     })
//!     .await
//!     .unwrap();
//!
//! // Removing the task removes its comments and hands back the files they carried.
//! assert_eq!(store.remove_task(&task).await.unwrap(), vec![file]);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod entity_store;
mod errors;
mod game_id;
mod game_info;
mod ids;
mod janitor;
mod launcher;
mod lifecycle;
mod model;
mod registry;
mod secrets;
#[cfg(test)]
mod test_utils;

/// Command-line interface utilities for program termination and output formatting.
pub mod cli_utils;

/// Command handlers behind the `ovo` CLI.
pub mod commands;

/// Operator configuration.
pub mod config;

/// PostgreSQL storage, one schema per game.
pub mod sql;

/// HTTP surface of a running game.
pub mod web;

pub use config::OvoConfig;
pub use entity_store::{EntityStore, InMemoryEntityStore};
pub use errors::OvoError;
pub use game_id::{GameId, GameIdParseError, SCHEMA_PREFIX};
pub use game_info::{GameConfig, GameInfo, GameInfoPatch};
pub use ids::{
    DEFAULT_MAX_ATTEMPTS, EntityId, EntityIdParseError, ID_BYTES, ID_LEN, IdAllocator, IdSource,
    RandomIds, ScriptedIds,
};
pub use janitor::{FailureKind, FileFailure, FileJanitor, JanitorReport};
pub use launcher::{ProcessLauncher, ServerLauncher};
pub use lifecycle::{CleanupReport, GameState, LifecycleController, LifecycleOptions, SENTINEL};
pub use model::{
    Comment, File, NewComment, NewTask, NewUser, Solving, Task, TaskStatus, User, UserRole,
};
pub use registry::{GameRegistry, InMemoryGameRegistry};
pub use secrets::{Bcrypt, SecretHasher};
pub use sql::{PgEntityStore, PgGameRegistry};
pub use web::{create_game_router, serve_game, wait_for_sentinel};
