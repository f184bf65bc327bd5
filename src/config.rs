//! Operator configuration shared by the `ovo` CLI and the `ovod` game server.
//!
//! Read from the YAML file named by `OVO_CONFIG` (default [`OvoConfig::DEFAULT_PATH`]).
//! `OVO_DATABASE_URL`, when set, overrides `database_url`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    Bcrypt, DEFAULT_MAX_ATTEMPTS, IdAllocator, LifecycleOptions, OvoError, RandomIds, SecretHasher,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct OvoConfig {
    /// PostgreSQL database holding every game schema.
    pub database_url: String,
    /// Game server executable; defaults to `ovod` next to the running binary.
    pub server_program: Option<PathBuf>,
    pub startup_grace_ms: u64,
    pub stop_delay_ms: u64,
    /// Cap on id candidates tried per insert.
    pub max_id_attempts: u32,
    /// How often `ovod` checks its files folder for the stop sentinel.
    pub sentinel_poll_ms: u64,
    /// bcrypt cost for new password and secret hashes.
    pub password_cost: u32,
}

impl Default for OvoConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/ovo".to_string(),
            server_program: None,
            startup_grace_ms: 1000,
            stop_delay_ms: 1000,
            max_id_attempts: DEFAULT_MAX_ATTEMPTS,
            sentinel_poll_ms: 250,
            password_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl OvoConfig {
    pub const DEFAULT_PATH: &'static str = "/etc/ovo.yaml";

    /// Loads configuration from the environment.
    ///
    /// A missing file at the default path means defaults; a missing file named explicitly by
    /// `OVO_CONFIG` is an error.
    pub fn load() -> Result<Self, OvoError> {
        let explicit = std::env::var_os("OVO_CONFIG").map(PathBuf::from);
        let path = explicit
            .clone()
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_PATH));
        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => Self::from_yaml(&content, &path)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && explicit.is_none() => {
                Self::default()
            }
            Err(e) => {
                return Err(OvoError::Io(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        if let Ok(url) = std::env::var("OVO_DATABASE_URL") {
            config.database_url = url;
        }
        Ok(config)
    }

    pub fn from_yaml(content: &str, origin: &Path) -> Result<Self, OvoError> {
        serde_yml::from_str(content).map_err(|e| {
            OvoError::Validation(format!("invalid configuration in {}: {}", origin.display(), e))
        })
    }

    pub fn lifecycle_options(&self) -> LifecycleOptions {
        LifecycleOptions {
            startup_grace: Duration::from_millis(self.startup_grace_ms),
            stop_delay: Duration::from_millis(self.stop_delay_ms),
            ..LifecycleOptions::default()
        }
    }

    pub fn sentinel_poll(&self) -> Duration {
        Duration::from_millis(self.sentinel_poll_ms.max(1))
    }

    pub fn hasher(&self) -> Arc<dyn SecretHasher> {
        Arc::new(Bcrypt::new(self.password_cost))
    }

    pub fn id_allocator(&self) -> IdAllocator {
        IdAllocator::new(Arc::new(RandomIds), self.max_id_attempts)
    }

    pub fn server_program(&self) -> Result<PathBuf, OvoError> {
        match &self.server_program {
            Some(program) => Ok(program.clone()),
            None => Ok(std::env::current_exe()?.with_file_name("ovod")),
        }
    }
}
