//! Run, rerun, stop and clean up games.
//!
//! ```text
//!            run                    stop
//! ABSENT ─────────────▶ RUNNING ───────────▶ STOPPED
//!   ▲                    ▲   │ rerun (implicit stop first)
//!   │                    │◀──┘                  │
//!   │                    └──────── rerun ───────┤
//!   └──────────────────── cleanup ──────────────┘  (also from RUNNING)
//!
//!        run (missing setting)
//! ABSENT ─────────────────────▶ UNPROVISIONED ─── cleanup ───▶ ABSENT
//! ```
//!
//! An unprovisioned game has a namespace but no configuration record. It cannot be stopped or
//! rerun; `cleanup` is the only way out.
//!
//! Stopping is a signal, not a handshake: the controller creates the [`SENTINEL`] file in the
//! game's files folder and waits a fixed delay. The serving process watches for the file and
//! shuts itself down. Nothing confirms that it actually did, so a `rerun` issued right after a
//! `stop` can race a server that has not exited yet.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::{
    EntityStore, FileJanitor, GameConfig, GameId, GameInfo, GameRegistry, JanitorReport, OvoError,
    SecretHasher, ServerLauncher,
};

/// File whose presence in a files folder tells the serving process to exit.
///
/// It can never collide with a file id, which is always 128 hex characters.
pub const SENTINEL: &str = "exit";

/// Observable state of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    Absent,
    /// The namespace exists but `run` failed before recording the configuration.
    Unprovisioned,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleOptions {
    /// Pause after launching a server, before `run`/`rerun` return.
    pub startup_grace: Duration,
    /// Pause after creating the stop sentinel.
    pub stop_delay: Duration,
    /// Length of one step of the cleanup countdown.
    pub countdown_tick: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            startup_grace: Duration::from_secs(1),
            stop_delay: Duration::from_secs(1),
            countdown_tick: Duration::from_secs(1),
        }
    }
}

/// What `cleanup` managed to remove.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Whether the stop sentinel reached the files folder before removal started.
    pub stop_signalled: bool,
    pub files: JanitorReport,
    pub folder_removed: bool,
}

pub struct LifecycleController<R, L> {
    registry: R,
    launcher: L,
    hasher: Arc<dyn SecretHasher>,
    options: LifecycleOptions,
}

impl<R: GameRegistry, L: ServerLauncher> LifecycleController<R, L> {
    pub fn new(
        registry: R,
        launcher: L,
        hasher: Arc<dyn SecretHasher>,
        options: LifecycleOptions,
    ) -> Self {
        Self {
            registry,
            launcher,
            hasher,
            options,
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub async fn state(&self, game: &GameId) -> Result<GameState, OvoError> {
        if !self.registry.exists(game).await? {
            return Ok(GameState::Absent);
        }
        let info = match self.registry.game_info(game).await {
            Ok(info) => info,
            Err(OvoError::NotFound(_)) => return Ok(GameState::Unprovisioned),
            Err(e) => return Err(e),
        };
        Ok(if sentinel_present(&info).await? {
            GameState::Stopped
        } else {
            GameState::Running
        })
    }

    pub async fn list(&self) -> Result<Vec<GameId>, OvoError> {
        self.registry.list().await
    }

    /// Provisions a new game and starts its server.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if the game exists; nothing is touched
    /// - `FatalProvisioning` if a required setting is missing; the empty namespace is left
    ///   behind and must be removed with `cleanup`
    /// - `Validation` if the files folder exists and is not empty
    pub async fn run(&self, game: &GameId, config: GameConfig) -> Result<(), OvoError> {
        if self.registry.exists(game).await? {
            return Err(OvoError::AlreadyExists(format!(
                "The game with {} identifier already exists",
                game
            )));
        }
        self.registry.create_namespace(game).await?;
        tracing::info!(game = %game, "created game namespace");

        let info = config.into_info(self.hasher.as_ref()).inspect_err(|e| {
            tracing::error!(
                game = %game,
                error = %e,
                "game left partially provisioned; remove it with cleanup"
            );
        })?;
        self.registry.insert_game_info(game, &info).await?;
        prepare_files_folder(&info.files_folder).await?;

        self.launcher.launch(game)?;
        tokio::time::sleep(self.options.startup_grace).await;
        tracing::info!(game = %game, port = info.port, "game is running");
        Ok(())
    }

    /// Restarts an existing game, overwriting only the settings supplied.
    pub async fn rerun(&self, game: &GameId, config: GameConfig) -> Result<(), OvoError> {
        if !self.registry.exists(game).await? {
            return Err(OvoError::NotFound(format!(
                "The game with {} identifier does not exist",
                game
            )));
        }
        let previous = self.registry.game_info(game).await?;
        if !sentinel_present(&previous).await? {
            self.try_signal_stop(game, &previous).await;
        }

        let patch = config.into_patch(self.hasher.as_ref())?;
        if !patch.is_empty() {
            self.registry.update_game_info(game, &patch).await?;
        }
        let current = self.registry.game_info(game).await?;
        tokio::fs::create_dir_all(&current.files_folder).await?;
        remove_sentinel(&previous.files_folder).await?;
        if current.files_folder != previous.files_folder {
            remove_sentinel(&current.files_folder).await?;
        }

        self.launcher.launch(game)?;
        tokio::time::sleep(self.options.startup_grace).await;
        tracing::info!(game = %game, port = current.port, "game is running again");
        Ok(())
    }

    /// Signals the game's server to exit. Stopping a stopped game is a no-op signal.
    pub async fn stop(&self, game: &GameId) -> Result<(), OvoError> {
        if !self.registry.exists(game).await? {
            return Err(OvoError::NotFound(format!(
                "The game with {} identifier does not exist",
                game
            )));
        }
        let info = self.registry.game_info(game).await?;
        self.signal_stop(game, &info).await
    }

    /// Stops the game and irrevocably removes its files and its namespace.
    ///
    /// Counts down `countdown` ticks first so an operator can interrupt. File and folder
    /// removal is best effort and reported; failing to drop the namespace is an error.
    pub async fn cleanup(&self, game: &GameId, countdown: u32) -> Result<CleanupReport, OvoError> {
        if !self.registry.exists(game).await? {
            return Err(OvoError::NotFound(format!(
                "The game with {} identifier does not exist",
                game
            )));
        }
        for remaining in (1..=countdown).rev() {
            tracing::warn!(
                game = %game,
                remaining,
                "all data of this game will be removed; interrupt to abort"
            );
            tokio::time::sleep(self.options.countdown_tick).await;
        }

        let mut report = CleanupReport::default();
        match self.registry.game_info(game).await {
            Ok(info) => {
                report.stop_signalled = self.try_signal_stop(game, &info).await;
                let files = self.registry.entities(game)?.list_files().await?;
                let janitor = FileJanitor::new(&info.files_folder);
                let names = files
                    .iter()
                    .map(|f| f.id.as_str())
                    .chain(std::iter::once(SENTINEL));
                report.files = janitor.delete_all(names).await;
                report.folder_removed = janitor.remove_folder().await.is_ok();
            }
            Err(OvoError::NotFound(_)) => {
                tracing::warn!(
                    game = %game,
                    "game has no configuration record; skipping stop and file removal"
                );
            }
            Err(e) => return Err(e),
        }

        self.registry.drop_namespace(game).await.inspect_err(|e| {
            tracing::error!(
                game = %game,
                error = %e,
                "could not drop game namespace; the game still exists"
            );
        })?;
        tracing::info!(game = %game, "game removed");
        Ok(report)
    }

    /// Signals a stop, recreating the files folder if it vanished. Failures are logged and
    /// reported as `false`.
    async fn try_signal_stop(&self, game: &GameId, info: &GameInfo) -> bool {
        let signalled = match tokio::fs::create_dir_all(&info.files_folder).await {
            Ok(()) => self.signal_stop(game, info).await,
            Err(e) => Err(OvoError::Io(format!(
                "cannot recreate files folder {}: {}",
                info.files_folder.display(),
                e
            ))),
        };
        signalled
            .inspect_err(|e| {
                tracing::warn!(
                    game = %game,
                    error = %e,
                    "could not signal stop; the server may still be running"
                );
            })
            .is_ok()
    }

    async fn signal_stop(&self, game: &GameId, info: &GameInfo) -> Result<(), OvoError> {
        tokio::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(info.files_folder.join(SENTINEL))
            .await
            .map_err(|e| {
                OvoError::Io(format!(
                    "cannot create stop sentinel in {}: {}",
                    info.files_folder.display(),
                    e
                ))
            })?;
        tracing::info!(game = %game, "stop signalled");
        tokio::time::sleep(self.options.stop_delay).await;
        Ok(())
    }
}

async fn sentinel_present(info: &GameInfo) -> Result<bool, OvoError> {
    Ok(tokio::fs::try_exists(info.files_folder.join(SENTINEL)).await?)
}

async fn remove_sentinel(folder: &Path) -> Result<(), OvoError> {
    match tokio::fs::remove_file(folder.join(SENTINEL)).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Creates the files folder; an existing folder is accepted only when empty.
async fn prepare_files_folder(folder: &Path) -> Result<(), OvoError> {
    match tokio::fs::read_dir(folder).await {
        Ok(mut entries) => {
            if entries.next_entry().await?.is_some() {
                return Err(OvoError::Validation(format!(
                    "The folder for files {} must be empty",
                    folder.display()
                )));
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(folder).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
