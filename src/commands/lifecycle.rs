//! `ovo run|rerun|stop|cleanup|status|list`.

use serde_json::{Value, json};

use super::{OvoOptions, game_arg};
use crate::{GameRegistry, LifecycleController, OvoError, ServerLauncher};

/// Countdown before `cleanup` when `--countdown` is not given.
pub const DEFAULT_COUNTDOWN: u32 = 5;

pub async fn handle_lifecycle_command<R, L>(
    command: &str,
    args: &[String],
    options: &OvoOptions,
    controller: &LifecycleController<R, L>,
) -> Result<Value, OvoError>
where
    R: GameRegistry,
    L: ServerLauncher,
{
    if command == "list" {
        let mut games = Vec::new();
        for game in controller.list().await? {
            let state = controller.state(&game).await?;
            games.push(json!({"game": game, "state": state}));
        }
        return Ok(Value::Array(games));
    }

    let game = game_arg(args, options)?;
    match command {
        "run" => controller.run(&game, options.game_config()).await?,
        "rerun" => controller.rerun(&game, options.game_config()).await?,
        "stop" => controller.stop(&game).await?,
        "status" => {}
        "cleanup" => {
            let countdown = options.countdown.unwrap_or(DEFAULT_COUNTDOWN);
            let report = controller.cleanup(&game, countdown).await?;
            return Ok(json!({"game": game, "state": "absent", "cleanup": report}));
        }
        _ => {
            return Err(OvoError::Validation(format!(
                "unknown command {:?}",
                command
            )));
        }
    }
    let state = controller.state(&game).await?;
    Ok(json!({"game": game, "state": state}))
}
