use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::OvoError;

/// Prefix shared by every game namespace in the relational store.
pub const SCHEMA_PREFIX: &str = "OvO_";

// PostgreSQL truncates identifiers at 63 bytes; the prefix eats four of them.
const MAX_GAME_ID_LEN: usize = 63 - SCHEMA_PREFIX.len();

static GAME_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("game id pattern compiles"));

////////////////////////////////////////////// GameId //////////////////////////////////////////////

/// Operator-chosen identifier of a game.
///
/// A `GameId` can only be obtained through validation, so every value is safe to embed as a
/// quoted schema identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GameId(String);

impl GameId {
    pub fn new(id: &str) -> Result<Self, GameIdParseError> {
        if id.is_empty() {
            return Err(GameIdParseError::Empty);
        }
        if id.len() > MAX_GAME_ID_LEN {
            return Err(GameIdParseError::TooLong(id.len()));
        }
        if !GAME_ID_PATTERN.is_match(id) {
            let bad = id
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
                .unwrap_or('?');
            return Err(GameIdParseError::InvalidCharacter(bad));
        }
        Ok(GameId(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The schema that holds this game's tables, e.g. `OvO_G1`.
    pub fn schema_name(&self) -> String {
        format!("{}{}", SCHEMA_PREFIX, self.0)
    }

    /// The schema name as a quoted SQL identifier, e.g. `"OvO_G1"`.
    pub fn quoted_schema(&self) -> String {
        format!("\"{}\"", self.schema_name())
    }

    /// Recovers the game id from a schema name, ignoring schemas ovo does not own.
    pub fn from_schema_name(schema: &str) -> Option<Self> {
        schema
            .strip_prefix(SCHEMA_PREFIX)
            .and_then(|id| GameId::new(id).ok())
    }
}

impl Display for GameId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl FromStr for GameId {
    type Err = GameIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GameId::new(s)
    }
}

impl TryFrom<String> for GameId {
    type Error = GameIdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        GameId::new(&s)
    }
}

impl From<GameId> for String {
    fn from(id: GameId) -> Self {
        id.0
    }
}

/////////////////////////////////////////// GameIdParseError ///////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameIdParseError {
    Empty,
    TooLong(usize),
    InvalidCharacter(char),
}

impl Display for GameIdParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            GameIdParseError::Empty => write!(f, "Game identifier must not be empty"),
            GameIdParseError::TooLong(len) => write!(
                f,
                "Game identifier is {} characters long; at most {} are allowed",
                len, MAX_GAME_ID_LEN
            ),
            GameIdParseError::InvalidCharacter(c) => write!(
                f,
                "The identifier can only contain letters, digits, or _ symbols (found {:?})",
                c
            ),
        }
    }
}

impl std::error::Error for GameIdParseError {}

impl From<GameIdParseError> for OvoError {
    fn from(e: GameIdParseError) -> Self {
        OvoError::Validation(e.to_string())
    }
}
