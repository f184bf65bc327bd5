//! The singleton configuration row of a game.

use std::path::PathBuf;

use sqlx::{Postgres, QueryBuilder, Transaction};

use super::SqlResult;
use crate::{GameInfo, GameInfoPatch, OvoError};

type GameInfoRow = (
    i32,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

/// Inserts the game's configuration.
///
/// # Returns
/// * `Ok(())` - Row created
/// * `Err(OvoError::AlreadyExists)` - The game already has a configuration row
pub async fn insert(tx: &mut Transaction<'_, Postgres>, info: &GameInfo) -> SqlResult<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO game_info
            (port, files_folder, register_pass, captain_pass, judge_url, judge_login, judge_pass)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(i32::from(info.port))
    .bind(info.files_folder.to_string_lossy().into_owned())
    .bind(&info.register_pass)
    .bind(&info.captain_pass)
    .bind(&info.judge_url)
    .bind(&info.judge_login)
    .bind(&info.judge_pass)
    .execute(&mut **tx)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
            OvoError::AlreadyExists("game configuration".to_string()),
        ),
        Err(e) => {
            tracing::error!(error = %e, "database error inserting game configuration");
            Err(e.into())
        }
    }
}

/// Overwrites the columns the patch carries. An empty patch is a no-op.
///
/// # Returns
/// * `Ok(true)` - The row was updated
/// * `Ok(false)` - No configuration row exists
pub async fn update(tx: &mut Transaction<'_, Postgres>, patch: &GameInfoPatch) -> SqlResult<bool> {
    if patch.is_empty() {
        return Ok(true);
    }
    let mut query = QueryBuilder::<Postgres>::new("UPDATE game_info SET ");
    let mut columns = query.separated(", ");
    if let Some(port) = patch.port {
        columns.push("port = ").push_bind_unseparated(i32::from(port));
    }
    if let Some(folder) = &patch.files_folder {
        columns
            .push("files_folder = ")
            .push_bind_unseparated(folder.to_string_lossy().into_owned());
    }
    if let Some(hash) = &patch.register_pass {
        columns.push("register_pass = ").push_bind_unseparated(hash.clone());
    }
    if let Some(hash) = &patch.captain_pass {
        columns.push("captain_pass = ").push_bind_unseparated(hash.clone());
    }
    if let Some(url) = &patch.judge_url {
        columns.push("judge_url = ").push_bind_unseparated(url.clone());
    }
    if let Some(login) = &patch.judge_login {
        columns.push("judge_login = ").push_bind_unseparated(login.clone());
    }
    if let Some(pass) = &patch.judge_pass {
        columns.push("judge_pass = ").push_bind_unseparated(pass.clone());
    }
    let result = query.build().execute(&mut **tx).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get(tx: &mut Transaction<'_, Postgres>) -> SqlResult<Option<GameInfo>> {
    let row: Option<GameInfoRow> = sqlx::query_as(
        r#"
        SELECT port, files_folder, register_pass, captain_pass, judge_url, judge_login, judge_pass
        FROM game_info
        "#,
    )
    .fetch_optional(&mut **tx)
    .await?;

    row.map(
        |(port, files_folder, register_pass, captain_pass, judge_url, judge_login, judge_pass)| {
            Ok(GameInfo {
                port: u16::try_from(port)
                    .map_err(|_| OvoError::Internal(format!("stored port {} out of range", port)))?,
                files_folder: PathBuf::from(files_folder),
                register_pass,
                captain_pass,
                judge_url,
                judge_login,
                judge_pass,
            })
        },
    )
    .transpose()
}
