//! # Command Handlers
//!
//! Handlers behind the `ovo` CLI. Each returns the JSON document the CLI prints, so the same
//! handlers run against in-memory storage in tests.
//!
//! - `lifecycle` - run, rerun, stop, cleanup, status, list
//! - `owo` - entity administration inside one game
//! - `errors` - user-facing error formatting

use std::path::PathBuf;

use arrrg::CommandLine;
use arrrg_derive::CommandLine;

use crate::{GameConfig, GameId, OvoError};

pub mod errors;
pub mod lifecycle;
pub mod owo;

pub use lifecycle::handle_lifecycle_command;
pub use owo::handle_owo_command;

/// Every option the `ovo` CLI understands; each command reads the ones it needs.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct OvoOptions {
    #[arrrg(optional, "Identifier of the game")]
    pub id: Option<String>,
    #[arrrg(optional, "Port the game server listens on")]
    pub port: Option<u16>,
    #[arrrg(optional, "Folder for uploaded files")]
    pub files_folder: Option<String>,
    #[arrrg(optional, "Secret required to register")]
    pub register_pass: Option<String>,
    #[arrrg(optional, "Secret required to register as a team captain")]
    pub captain_pass: Option<String>,
    #[arrrg(optional, "Base URL of the external CTF platform")]
    pub judge_url: Option<String>,
    #[arrrg(optional, "Login on the external CTF platform")]
    pub judge_login: Option<String>,
    #[arrrg(optional, "Password on the external CTF platform")]
    pub judge_pass: Option<String>,
    #[arrrg(optional, "Seconds to count down before cleanup (default: 5)")]
    pub countdown: Option<u32>,
    #[arrrg(optional, "Task or file name")]
    pub name: Option<String>,
    #[arrrg(optional, "Link to the task on the external platform")]
    pub original_link: Option<String>,
    #[arrrg(optional, "Id of the task on the external platform")]
    pub original_id: Option<String>,
    #[arrrg(optional, "Task or comment text")]
    pub text: Option<String>,
    #[arrrg(optional, "User login")]
    pub login: Option<String>,
    #[arrrg(optional, "User password")]
    pub password: Option<String>,
    #[arrrg(optional, "File id of the user's avatar")]
    pub avatar: Option<String>,
    #[arrrg(optional, "Login of the commenting or solving user")]
    pub user_id: Option<String>,
    #[arrrg(optional, "Id of the commented or solved task")]
    pub task_id: Option<String>,
    #[arrrg(flag, "Register the user as team captain")]
    pub is_captain: bool,
    #[arrrg(flag, "Also delete the files freed by rm")]
    pub purge: bool,
}

impl OvoOptions {
    /// The game settings supplied on the command line.
    pub fn game_config(&self) -> GameConfig {
        GameConfig {
            port: self.port,
            files_folder: self.files_folder.as_ref().map(PathBuf::from),
            register_pass: self.register_pass.clone(),
            captain_pass: self.captain_pass.clone(),
            judge_url: self.judge_url.clone(),
            judge_login: self.judge_login.clone(),
            judge_pass: self.judge_pass.clone(),
        }
    }
}

/// The game id from the first positional argument, or from `--id`.
pub fn game_arg(args: &[String], options: &OvoOptions) -> Result<GameId, OvoError> {
    match (args.first(), options.id.as_deref()) {
        (Some(positional), Some(flag)) if positional != flag => Err(OvoError::Validation(
            format!("conflicting game ids {:?} and {:?}", positional, flag),
        )),
        (Some(id), _) => Ok(GameId::new(id)?),
        (None, Some(id)) => Ok(GameId::new(id)?),
        (None, None) => Err(OvoError::Validation("missing game id".to_string())),
    }
}

/// The positional argument at `index`, naming `what` when it is missing.
pub fn required_arg<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str, OvoError> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| OvoError::Validation(format!("missing {}", what)))
}
