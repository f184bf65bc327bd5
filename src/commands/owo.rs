//! `ovo owo <game> <action> ...`: administer the entities of one game.
//!
//! ```text
//! add task [name]              --name --original-link --original-id --text
//! add file <name>
//! add user [login]             --login --password --is-captain --avatar
//! add comment [file-id...]     --task-id --user-id --text
//! rm task|comment|user|file <id> [--purge]
//! mark user <login> captain|default
//! mark task <task-id> solved|unsolved
//! update_avatar <login> [file-id]
//! take_task|reject_task [task-id] [login]      --task-id --user-id
//! show users|tasks|files|comments|solvings
//! ```

use serde_json::{Value, json};

use super::{OvoOptions, game_arg, required_arg};
use crate::{
    EntityId, EntityStore, FileJanitor, GameId, GameRegistry, NewComment, NewTask, NewUser, OvoError,
    TaskStatus, UserRole,
};

fn parse_id(raw: &str) -> Result<EntityId, OvoError> {
    Ok(raw.parse::<EntityId>()?)
}

/// Flag value if given, otherwise the positional argument at `index`.
fn flag_or_arg<'a>(
    flag: &'a Option<String>,
    args: &'a [String],
    index: usize,
    what: &str,
) -> Result<&'a str, OvoError> {
    match flag {
        Some(value) => Ok(value),
        None => required_arg(args, index, what),
    }
}

pub async fn handle_owo_command<R: GameRegistry>(
    args: &[String],
    options: &OvoOptions,
    registry: &R,
) -> Result<Value, OvoError> {
    let game = game_arg(args, options)?;
    if !registry.exists(&game).await? {
        return Err(OvoError::NotFound(format!(
            "The game with {} identifier does not exist",
            game
        )));
    }
    let store = registry.entities(&game)?;
    let action = required_arg(args, 1, "action")?;

    match action {
        "add" => add(&args[2..], options, &store, registry, &game).await,
        "rm" => {
            let kind = required_arg(args, 2, "entity kind")?;
            let id = required_arg(args, 3, "id or login")?;
            let freed = remove(kind, id, &store).await?;
            if !options.purge {
                return Ok(json!({"freed": freed}));
            }
            let folder = registry.game_info(&game).await?.files_folder;
            for file in &freed {
                match store.remove_file(file).await {
                    Ok(()) | Err(OvoError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            let report = FileJanitor::new(folder)
                .delete_all(freed.iter().map(EntityId::as_str))
                .await;
            Ok(json!({"freed": freed, "purged": report}))
        }
        "mark" => {
            let kind = required_arg(args, 2, "entity kind")?;
            let target = required_arg(args, 3, "id or login")?;
            let value = required_arg(args, 4, "new value")?;
            match kind {
                "user" => store.mark_user(target, value.parse::<UserRole>()?).await?,
                "task" => {
                    store
                        .mark_task(&parse_id(target)?, value.parse::<TaskStatus>()?)
                        .await?
                }
                _ => {
                    return Err(OvoError::Validation(format!(
                        "cannot mark {:?}; expected user or task",
                        kind
                    )));
                }
            }
            Ok(json!({"marked": target, "value": value}))
        }
        "update_avatar" => {
            let login = flag_or_arg(&options.login, args, 2, "login")?;
            let avatar = match options.avatar.as_deref().or(args.get(3).map(String::as_str)) {
                Some(raw) => Some(parse_id(raw)?),
                None => None,
            };
            store.update_avatar(login, avatar.as_ref()).await?;
            Ok(json!({"login": login, "avatar": avatar}))
        }
        "take_task" | "reject_task" => {
            let task = parse_id(flag_or_arg(&options.task_id, args, 2, "task id")?)?;
            let login = flag_or_arg(&options.user_id, args, 3, "user login")?;
            if action == "take_task" {
                store.take_task(&task, login).await?;
            } else {
                store.reject_task(&task, login).await?;
            }
            Ok(json!({"task_id": task, "user_id": login}))
        }
        "show" => match required_arg(args, 2, "entity kind")? {
            "users" => Ok(json!(store.list_users().await?)),
            "tasks" => Ok(json!(store.list_tasks().await?)),
            "files" => Ok(json!(store.list_files().await?)),
            "comments" => Ok(json!(store.list_comments().await?)),
            "solvings" => Ok(json!(store.list_solvings().await?)),
            other => Err(OvoError::Validation(format!(
                "cannot show {:?}; expected users, tasks, files, comments or solvings",
                other
            ))),
        },
        other => Err(OvoError::Validation(format!("unknown action {:?}", other))),
    }
}

async fn add<S: EntityStore, R: GameRegistry>(
    args: &[String],
    options: &OvoOptions,
    store: &S,
    registry: &R,
    game: &GameId,
) -> Result<Value, OvoError> {
    match required_arg(args, 0, "entity kind")? {
        "task" => {
            let task = NewTask {
                name: flag_or_arg(&options.name, args, 1, "task name")?.to_string(),
                original_link: options.original_link.clone(),
                original_id: options.original_id.clone(),
                text: options.text.clone(),
            };
            Ok(json!({"id": store.add_task(&task).await?}))
        }
        "file" => {
            let name = flag_or_arg(&options.name, args, 1, "file name")?;
            let id = store.add_file(name).await?;
            let folder = registry.game_info(game).await?.files_folder;
            Ok(json!({"id": id, "path": folder.join(id.as_str())}))
        }
        "user" => {
            let user = NewUser {
                login: flag_or_arg(&options.login, args, 1, "login")?.to_string(),
                password: options
                    .password
                    .clone()
                    .ok_or_else(|| OvoError::Validation("missing --password".to_string()))?,
                is_captain: options.is_captain,
                avatar: options.avatar.as_deref().map(parse_id).transpose()?,
            };
            store.add_user(&user).await?;
            Ok(json!({"login": user.login}))
        }
        "comment" => {
            let comment = NewComment {
                task_id: parse_id(options.task_id.as_deref().ok_or_else(|| {
                    OvoError::Validation("missing --task-id".to_string())
                })?)?,
                user_id: options
                    .user_id
                    .clone()
                    .ok_or_else(|| OvoError::Validation("missing --user-id".to_string()))?,
                text: options.text.clone(),
                attached_files: args[1..]
                    .iter()
                    .map(|raw| parse_id(raw))
                    .collect::<Result<_, _>>()?,
            };
            Ok(json!({"id": store.add_comment(&comment).await?}))
        }
        other => Err(OvoError::Validation(format!(
            "cannot add {:?}; expected task, file, user or comment",
            other
        ))),
    }
}

/// Removes one entity and returns the file ids it freed.
async fn remove<S: EntityStore>(kind: &str, id: &str, store: &S) -> Result<Vec<EntityId>, OvoError> {
    match kind {
        "task" => store.remove_task(&parse_id(id)?).await,
        "comment" => store.remove_comment(&parse_id(id)?).await,
        "user" => Ok(store.remove_user(id).await?.into_iter().collect()),
        "file" => {
            let file = parse_id(id)?;
            store.remove_file(&file).await?;
            Ok(vec![file])
        }
        other => Err(OvoError::Validation(format!(
            "cannot remove {:?}; expected task, comment, user or file",
            other
        ))),
    }
}
