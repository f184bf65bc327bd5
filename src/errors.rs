//! Error types for ovo operations.

/// Errors that can occur while managing games and their entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OvoError {
    /// Malformed identifier or an enumerated value outside its domain.
    Validation(String),
    /// An item with the same key already exists.
    AlreadyExists(String),
    /// The requested game or entity was not found.
    NotFound(String),
    /// A required configuration field was missing while provisioning a game.
    ///
    /// The partially created namespace is left in place for inspection.
    FatalProvisioning(String),
    /// Every id candidate collided with an existing row.
    IdsExhausted(u32),
    /// A filesystem operation failed.
    Io(String),
    /// An internal storage system error occurred.
    Internal(String),
}

impl OvoError {
    /// True for the error kinds an id allocator may retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

impl std::fmt::Display for OvoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "Validation error: {}", msg),
            Self::AlreadyExists(msg) => write!(f, "Already exists: {}", msg),
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
            Self::FatalProvisioning(msg) => write!(f, "Fatal provisioning error: {}", msg),
            Self::IdsExhausted(attempts) => write!(
                f,
                "Could not allocate a unique id after {} attempts",
                attempts
            ),
            Self::Io(msg) => write!(f, "IO error: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<sqlx::Error> for OvoError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => OvoError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                OvoError::AlreadyExists(db_err.message().to_string())
            }
            _ => OvoError::Internal(e.to_string()),
        }
    }
}

impl From<std::io::Error> for OvoError {
    fn from(e: std::io::Error) -> Self {
        OvoError::Io(e.to_string())
    }
}

impl std::error::Error for OvoError {}
