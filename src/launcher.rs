//! Starting the per-game serving process.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::{GameId, OvoError};

/// Starts a game's serving process and returns without waiting for it.
pub trait ServerLauncher: Send + Sync {
    fn launch(&self, game: &GameId) -> Result<(), OvoError>;
}

/// Spawns `<program> <game id>` as a detached child.
///
/// The child finds its own configuration through the game id, and exits on its own once the
/// stop sentinel shows up in its files folder. Must be called from within a tokio runtime,
/// which reaps the child once it exits.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ServerLauncher for ProcessLauncher {
    fn launch(&self, game: &GameId) -> Result<(), OvoError> {
        let child = Command::new(&self.program)
            .arg(game.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                OvoError::Io(format!(
                    "failed to start {}: {}",
                    self.program.display(),
                    e
                ))
            })?;
        tracing::info!(
            game = %game,
            pid = child.id(),
            program = %self.program.display(),
            "started game server"
        );
        Ok(())
    }
}
