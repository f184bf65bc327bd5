//! The per-game configuration record and the operator input it is built from.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{OvoError, SecretHasher};

/// The persisted configuration of one game: exactly one record per namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInfo {
    /// Port the serving process listens on.
    pub port: u16,
    /// Absolute path of the folder uploaded files live in.
    pub files_folder: PathBuf,
    /// Hash of the secret required to register.
    pub register_pass: String,
    /// Hash of the secret required to register as a team captain.
    pub captain_pass: String,
    /// Base url of the external CTF platform, including protocol and port.
    pub judge_url: Option<String>,
    pub judge_login: Option<String>,
    pub judge_pass: Option<String>,
}

/// Operator-supplied settings for `run` (all required fields present) or `rerun` (any subset).
///
/// Secrets are plaintext here; they are hashed before they reach storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameConfig {
    pub port: Option<u16>,
    pub files_folder: Option<PathBuf>,
    pub register_pass: Option<String>,
    pub captain_pass: Option<String>,
    pub judge_url: Option<String>,
    pub judge_login: Option<String>,
    pub judge_pass: Option<String>,
}

/// Hashed, absolutized subset of [`GameInfo`] fields to overwrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameInfoPatch {
    pub port: Option<u16>,
    pub files_folder: Option<PathBuf>,
    pub register_pass: Option<String>,
    pub captain_pass: Option<String>,
    pub judge_url: Option<String>,
    pub judge_login: Option<String>,
    pub judge_pass: Option<String>,
}

impl GameInfoPatch {
    pub fn is_empty(&self) -> bool {
        self == &GameInfoPatch::default()
    }

    pub fn apply(&self, info: &mut GameInfo) {
        if let Some(port) = self.port {
            info.port = port;
        }
        if let Some(folder) = &self.files_folder {
            info.files_folder = folder.clone();
        }
        if let Some(hash) = &self.register_pass {
            info.register_pass = hash.clone();
        }
        if let Some(hash) = &self.captain_pass {
            info.captain_pass = hash.clone();
        }
        if let Some(url) = &self.judge_url {
            info.judge_url = Some(url.clone());
        }
        if let Some(login) = &self.judge_login {
            info.judge_login = Some(login.clone());
        }
        if let Some(pass) = &self.judge_pass {
            info.judge_pass = Some(pass.clone());
        }
    }
}

impl GameConfig {
    /// Builds the full record for a new game.
    ///
    /// Every missing required field is listed in the returned
    /// [`OvoError::FatalProvisioning`].
    pub fn into_info(self, hasher: &dyn SecretHasher) -> Result<GameInfo, OvoError> {
        let mut missing = Vec::new();
        if self.port.is_none() {
            missing.push("port");
        }
        if self.files_folder.is_none() {
            missing.push("files-folder");
        }
        if self.register_pass.is_none() {
            missing.push("register-pass");
        }
        if self.captain_pass.is_none() {
            missing.push("captain-pass");
        }
        let (Some(port), Some(folder), Some(register_pass), Some(captain_pass)) = (
            self.port,
            self.files_folder,
            self.register_pass,
            self.captain_pass,
        ) else {
            return Err(OvoError::FatalProvisioning(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        };
        Ok(GameInfo {
            port,
            files_folder: absolute(&folder)?,
            register_pass: hasher.hash(&register_pass)?,
            captain_pass: hasher.hash(&captain_pass)?,
            judge_url: self.judge_url,
            judge_login: self.judge_login,
            judge_pass: self.judge_pass,
        })
    }

    /// Builds the patch `rerun` applies; only supplied fields are carried over.
    pub fn into_patch(self, hasher: &dyn SecretHasher) -> Result<GameInfoPatch, OvoError> {
        Ok(GameInfoPatch {
            port: self.port,
            files_folder: self.files_folder.as_deref().map(absolute).transpose()?,
            register_pass: self.register_pass.map(|p| hasher.hash(&p)).transpose()?,
            captain_pass: self.captain_pass.map(|p| hasher.hash(&p)).transpose()?,
            judge_url: self.judge_url,
            judge_login: self.judge_login,
            judge_pass: self.judge_pass,
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf, OvoError> {
    std::path::absolute(path)
        .map_err(|e| OvoError::Io(format!("cannot resolve {}: {}", path.display(), e)))
}
