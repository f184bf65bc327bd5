use arrrg::CommandLine;

use ovo::{
    LifecycleController, OvoConfig, PgGameRegistry, ProcessLauncher, cli_utils,
    commands::{OvoOptions, errors::CommandScope, handle_lifecycle_command, handle_owo_command},
};

const USAGE: &str = r#"Usage: ovo [options] <command> [args...]

Game options:
  --id <game>                 Game identifier (or give it as the first argument)
  --port <port>               Port the game server listens on
  --files-folder <path>       Folder for uploaded files; must be empty or absent on run
  --register-pass <secret>    Secret required to register
  --captain-pass <secret>     Secret required to register as a team captain
  --judge-url <url>           Base URL of the external CTF platform
  --judge-login <login>       Login on the external CTF platform
  --judge-pass <password>     Password on the external CTF platform
  --countdown <seconds>       Countdown before cleanup (default: 5)

Commands:
  run [game]                  Create a game and start its server
  rerun [game]                Restart a game, overwriting only the settings given
  stop <game>                 Signal the game's server to exit
  cleanup <game>              Stop the game and remove its files and data for good
  status <game>               Show the game state: running, stopped, unprovisioned or absent
  list                        List every game and its state
  owo <game> <action> ...     Administer the game's users, tasks, files and comments:
      add task [name]         --name --original-link --original-id --text
      add file <name>
      add user [login]        --login --password --is-captain --avatar
      add comment [file-id...]  --task-id --user-id --text
      rm task|comment|user|file <id> [--purge]
      mark user <login> captain|default
      mark task <task-id> solved|unsolved
      update_avatar <login> [file-id]
      take_task|reject_task <task-id> <login>
      show users|tasks|files|comments|solvings

Environment:
  OVO_CONFIG                  Configuration file (default: /etc/ovo.yaml)
  OVO_DATABASE_URL            Overrides database_url from the configuration file
  RUST_LOG                    Log filter (default: info)"#;

#[tokio::main]
async fn main() {
    cli_utils::init_tracing();
    let (options, free) = OvoOptions::from_command_line_relaxed("USAGE: ovo <command> [args...]");

    if free.is_empty() {
        cli_utils::exit_with_usage_error("No command specified", USAGE);
    }
    if free[0] == "help" {
        println!("{}", USAGE);
        return;
    }

    let config = OvoConfig::load().unwrap_or_else(|e| cli_utils::exit_with_ovo_error(&e));
    let hasher = config.hasher();
    let registry =
        PgGameRegistry::connect(&config.database_url, config.id_allocator(), hasher.clone())
            .await
            .unwrap_or_else(|e| cli_utils::exit_with_ovo_error(&e));

    let (scope, result) = match free[0].as_str() {
        "owo" => (
            CommandScope::Entities,
            handle_owo_command(&free[1..], &options, &registry).await,
        ),
        "run" | "rerun" | "stop" | "cleanup" | "status" | "list" => {
            let program = config
                .server_program()
                .unwrap_or_else(|e| cli_utils::exit_with_ovo_error(&e));
            let controller = LifecycleController::new(
                registry,
                ProcessLauncher::new(program),
                hasher,
                config.lifecycle_options(),
            );
            (
                CommandScope::Lifecycle,
                handle_lifecycle_command(&free[0], &free[1..], &options, &controller).await,
            )
        }
        other => cli_utils::exit_with_usage_error(&format!("Unknown command: {}", other), USAGE),
    };

    match result {
        Ok(output) => cli_utils::print_json_or_exit(&output, "command output"),
        Err(e) => cli_utils::exit_with_command_error(scope, &e),
    }
}
