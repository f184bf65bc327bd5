use std::process;

use tracing_subscriber::EnvFilter;

use crate::OvoError;
use crate::commands::errors::{CommandError, CommandScope, format_cli_error};

/// Installs the fmt subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
}

/// Exits the program with an error message
pub fn exit_with_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

/// Exits the program with an error message and usage information
pub fn exit_with_usage_error(message: &str, usage: &str) -> ! {
    eprintln!("Error: {}", message);
    eprintln!("{}", usage);
    process::exit(1);
}

/// Exits with the message and hint for an [`OvoError`]
pub fn exit_with_ovo_error(error: &OvoError) -> ! {
    eprintln!("{}", format_cli_error(error));
    process::exit(1);
}

/// Exits with the message and the hint that fits the command family behind `error`
pub fn exit_with_command_error(scope: CommandScope, error: &OvoError) -> ! {
    eprintln!("{}", format_cli_error(&CommandError::new(scope, error)));
    process::exit(1);
}

/// Prints formatted JSON with proper indentation
pub fn print_json<T>(value: &T) -> Result<(), serde_json::Error>
where
    T: serde::Serialize,
{
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints a formatted JSON value or exits with error
pub fn print_json_or_exit<T>(value: &T, context: &str)
where
    T: serde::Serialize,
{
    if let Err(e) = print_json(value) {
        exit_with_error(&format!("Failed to format {} JSON: {}", context, e));
    }
}
