use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::{
    Bcrypt, GameId, IdAllocator, InMemoryGameRegistry, LifecycleController, LifecycleOptions,
    OvoError, ServerLauncher,
};

static NEXT_DIR: AtomicU64 = AtomicU64::new(0);

/// A scratch directory unique to this process, timestamp and call; removed on drop.
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    pub fn new(module: &str) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "ovo_test_{}_{}_{}_{}",
            module,
            std::process::id(),
            timestamp,
            NEXT_DIR.fetch_add(1, Ordering::SeqCst)
        ));
        std::fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.path).ok();
    }
}

/// Records launches instead of spawning processes.
#[derive(Clone, Default)]
pub struct RecordingLauncher {
    launched: Arc<Mutex<Vec<GameId>>>,
}

impl RecordingLauncher {
    pub fn launched(&self) -> Vec<GameId> {
        self.launched.lock().unwrap().clone()
    }
}

impl ServerLauncher for RecordingLauncher {
    fn launch(&self, game: &GameId) -> Result<(), OvoError> {
        self.launched.lock().unwrap().push(game.clone());
        Ok(())
    }
}

/// A controller over fresh in-memory storage that never sleeps.
pub fn test_controller() -> (
    LifecycleController<InMemoryGameRegistry, RecordingLauncher>,
    RecordingLauncher,
) {
    let launcher = RecordingLauncher::default();
    let hasher = Arc::new(Bcrypt::CHEAPEST);
    let registry = InMemoryGameRegistry::new(IdAllocator::default(), hasher.clone());
    let controller = LifecycleController::new(
        registry,
        launcher.clone(),
        hasher,
        LifecycleOptions {
            startup_grace: Duration::ZERO,
            stop_delay: Duration::ZERO,
            countdown_tick: Duration::ZERO,
        },
    );
    (controller, launcher)
}
