//! # Command Error Handling
//!
//! Turns [`OvoError`] into the message and hint the `ovo` CLI prints, using the handled crate
//! for consistent error property extraction.

use handled::Handle;

use crate::OvoError;

/// User-friendly error information that can be extracted from various error types
#[derive(Debug, Clone)]
pub struct UserError {
    /// The main error message to display to the user
    pub message: String,
    /// Optional usage hint to help the user correct the error
    pub usage_hint: Option<String>,
}

impl std::fmt::Display for UserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Handle<UserError> for UserError {
    fn handle(&self) -> Option<UserError> {
        Some(self.clone())
    }
}

/// The `ovo` command family an error came from; conflict and lookup hints depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    /// `run`, `rerun`, `stop`, `cleanup`, `status`, `list`
    Lifecycle,
    /// `owo`
    Entities,
}

/// An [`OvoError`] tagged with the command family that produced it.
#[derive(Debug)]
pub struct CommandError<'a> {
    pub scope: CommandScope,
    pub error: &'a OvoError,
}

impl<'a> CommandError<'a> {
    pub fn new(scope: CommandScope, error: &'a OvoError) -> Self {
        Self { scope, error }
    }
}

impl std::fmt::Display for CommandError<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl Handle<UserError> for CommandError<'_> {
    fn handle(&self) -> Option<UserError> {
        let usage_hint = match (self.scope, self.error) {
            (CommandScope::Lifecycle, OvoError::AlreadyExists(_)) => {
                Some("Use 'ovo rerun' to restart an existing game".to_string())
            }
            (CommandScope::Lifecycle, OvoError::NotFound(_)) => {
                Some("Use 'ovo list' to see the existing games".to_string())
            }
            (CommandScope::Entities, OvoError::AlreadyExists(_)) => Some(
                "Logins and task solvings must be unique; see them with 'ovo owo <game> show users|solvings'"
                    .to_string(),
            ),
            (CommandScope::Entities, OvoError::NotFound(_)) => Some(
                "Use 'ovo list' to see the games and 'ovo owo <game> show ...' to see their entities"
                    .to_string(),
            ),
            _ => return self.error.handle(),
        };
        Some(UserError {
            message: self.error.to_string(),
            usage_hint,
        })
    }
}

impl Handle<UserError> for OvoError {
    fn handle(&self) -> Option<UserError> {
        let usage_hint = match self {
            OvoError::Validation(_) => {
                Some("Game ids use only letters, digits and underscores; entity ids are 128 hex characters".to_string())
            }
            OvoError::FatalProvisioning(_) => Some(
                "Required: --port --files-folder --register-pass --captain-pass. Remove the half-created game with 'ovo cleanup'".to_string(),
            ),
            OvoError::AlreadyExists(_)
            | OvoError::NotFound(_)
            | OvoError::IdsExhausted(_)
            | OvoError::Io(_)
            | OvoError::Internal(_) => None,
        };
        Some(UserError {
            message: self.to_string(),
            usage_hint,
        })
    }
}

/// Enhanced error formatting for CLI output
pub fn format_cli_error<E>(error: &E) -> String
where
    E: Handle<UserError> + std::fmt::Display,
{
    if let Some(user_error) = error.handle() {
        let mut output = format!("Error: {}", user_error.message);
        if let Some(hint) = user_error.usage_hint {
            output.push_str(&format!("\nHint: {}", hint));
        }
        output
    } else {
        format!("Error: {}", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_conflicts_point_at_rerun() {
        let error = OvoError::AlreadyExists("The game with G1 identifier already exists".into());
        let formatted = format_cli_error(&CommandError::new(CommandScope::Lifecycle, &error));
        assert!(formatted.starts_with("Error: Already exists: The game with G1"));
        assert!(formatted.contains("\nHint: Use 'ovo rerun'"));
    }

    #[test]
    fn entity_conflicts_do_not_mention_rerun() {
        let error = OvoError::AlreadyExists("user alice".into());
        let formatted = format_cli_error(&CommandError::new(CommandScope::Entities, &error));
        assert!(formatted.starts_with("Error: Already exists: user alice"));
        assert!(!formatted.contains("rerun"));
        assert!(formatted.contains("show users"));
    }

    #[test]
    fn unscoped_conflicts_have_no_hint() {
        let formatted = format_cli_error(&OvoError::AlreadyExists("id 00".into()));
        assert!(!formatted.contains("Hint"));
    }

    #[test]
    fn scoped_errors_keep_generic_hints() {
        let error = OvoError::FatalProvisioning("missing port".into());
        let formatted = format_cli_error(&CommandError::new(CommandScope::Lifecycle, &error));
        assert!(formatted.contains("\nHint: Required: --port"));
    }

    #[test]
    fn internal_errors_have_no_hint() {
        let formatted = format_cli_error(&OvoError::Internal("pool timed out".into()));
        assert_eq!(formatted, "Error: Internal error: pool timed out");
    }
}
