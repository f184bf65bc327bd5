use std::sync::Arc;

use arrrg::CommandLine;
use arrrg_derive::CommandLine;
use tokio::signal;

use ovo::{
    GameId, GameRegistry, OvoConfig, PgGameRegistry, cli_utils, serve_game,
    wait_for_sentinel,
};

#[derive(CommandLine, Default, PartialEq, Eq)]
struct Args {
    #[arrrg(optional, "Port to bind, overriding the game's configuration")]
    port: Option<u16>,
}

const HELP_TEXT: &str = r#"ovod - OvO game server

USAGE:
    ovod [OPTIONS] <game>

OPTIONS:
    --port <PORT>    Port to bind [default: the port stored for the game]

DESCRIPTION:
    Serves one game's API until the file "exit" appears in the game's files
    folder, or until SIGINT. Normally started by "ovo run" and "ovo rerun".

API ENDPOINTS:
    GET    /api/get_users       List users
    GET    /api/get_tasks       List tasks
    GET    /api/get_files       List files
    GET    /api/get_comments    List comments in creation order
    GET    /api/get_solvings    List who solves which task
    GET    /api/get_file/ID     Contents of a stored file
    GET    /api/download_file/ID  The same, as an attachment under its name
    POST   /api/authorize       Exchange {login, password} for a session id cookie
    GET    /api/whoami          Resolve ?session_id= or the cookie to its user
    POST   /api/add_user        Register with the game's secret (captains: both)

  With a session cookie:
    POST   /api/add_file?name=  Upload the request body as a file
    POST   /api/add_comment     Comment on a task as yourself
    POST   /api/rm_comment      Remove your comment (captains: any)
    POST   /api/mark_user       Make a user captain or default (captains only)
    POST   /api/mark_task       Mark a task solved or unsolved
    POST   /api/update_avatar   Change your own avatar
    POST   /api/take_task       Join a task (captains: assign anyone)
    POST   /api/reject_task     Leave a task (captains: unassign anyone)"#;

#[tokio::main]
async fn main() {
    cli_utils::init_tracing();
    let (args, free) = Args::from_command_line("USAGE: ovod [OPTIONS] <game>");

    if !free.is_empty() && free[0] == "help" {
        println!("{}", HELP_TEXT);
        return;
    }
    if free.len() != 1 {
        cli_utils::exit_with_usage_error("expected exactly one game id", HELP_TEXT);
    }
    let game = GameId::new(&free[0])
        .unwrap_or_else(|e| cli_utils::exit_with_ovo_error(&e.into()));

    let config = OvoConfig::load().unwrap_or_else(|e| cli_utils::exit_with_ovo_error(&e));
    let registry = PgGameRegistry::connect(
        &config.database_url,
        config.id_allocator(),
        config.hasher(),
    )
    .await
    .unwrap_or_else(|e| cli_utils::exit_with_ovo_error(&e));
    let info = registry
        .game_info(&game)
        .await
        .unwrap_or_else(|e| cli_utils::exit_with_ovo_error(&e));
    let store = registry
        .entities(&game)
        .unwrap_or_else(|e| cli_utils::exit_with_ovo_error(&e));

    let folder = info.files_folder.clone();
    let poll = config.sentinel_poll();
    let shutdown = async move {
        tokio::select! {
            _ = wait_for_sentinel(&folder, poll) => {}
            _ = signal::ctrl_c() => {
                tracing::info!("received interrupt");
            }
        }
    };

    let port = args.port.unwrap_or(info.port);
    tracing::info!(game = %game, port, "starting game server");
    if let Err(e) = serve_game(Arc::new(store), info, port, shutdown).await {
        cli_utils::exit_with_ovo_error(&e);
    }
}
