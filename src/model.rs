//! Rows of a game namespace and the inputs that create them.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntityId, OvoError};

/////////////////////////////////////////////// Rows ///////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub login: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_captain: bool,
    /// May name a file that has since been removed.
    pub avatar: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: EntityId,
    pub name: String,
    pub solved: bool,
    pub original_link: Option<String>,
    /// Key of the task on the external platform, used to skip re-imports.
    pub original_id: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub id: EntityId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: EntityId,
    pub task_id: EntityId,
    pub user_id: String,
    pub text: Option<String>,
    /// In attachment order; the same file may appear more than once.
    pub attached_files: Vec<EntityId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Solving {
    pub user_id: String,
    pub task_id: EntityId,
}

////////////////////////////////////////////// Inputs //////////////////////////////////////////////

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub original_link: Option<String>,
    pub original_id: Option<String>,
    pub text: Option<String>,
}

impl NewTask {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub login: String,
    pub password: String,
    pub is_captain: bool,
    pub avatar: Option<EntityId>,
}

impl NewUser {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
            is_captain: false,
            avatar: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub task_id: EntityId,
    pub user_id: String,
    pub text: Option<String>,
    pub attached_files: Vec<EntityId>,
}

//////////////////////////////////////////// Enumerations //////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    Captain,
    Default,
}

impl UserRole {
    pub fn is_captain(self) -> bool {
        self == UserRole::Captain
    }
}

impl FromStr for UserRole {
    type Err = OvoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "captain" => Ok(UserRole::Captain),
            "default" => Ok(UserRole::Default),
            _ => Err(OvoError::Validation(format!(
                "Unknown user type {:?}. Must be either captain or default",
                s
            ))),
        }
    }
}

impl Display for UserRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UserRole::Captain => f.write_str("captain"),
            UserRole::Default => f.write_str("default"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Solved,
    Unsolved,
}

impl TaskStatus {
    pub fn is_solved(self) -> bool {
        self == TaskStatus::Solved
    }
}

impl FromStr for TaskStatus {
    type Err = OvoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solved" => Ok(TaskStatus::Solved),
            "unsolved" => Ok(TaskStatus::Unsolved),
            _ => Err(OvoError::Validation(format!(
                "Unknown task type {:?}. Must be either solved or unsolved",
                s
            ))),
        }
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskStatus::Solved => f.write_str("solved"),
            TaskStatus::Unsolved => f.write_str("unsolved"),
        }
    }
}
