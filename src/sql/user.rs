//! Users, keyed by login.

use sqlx::{Postgres, Transaction};

use super::{SqlResult, optional_id};
use crate::{EntityId, OvoError, User};

type UserRow = (String, String, bool, Option<String>);

fn from_row((login, password_hash, is_captain, avatar): UserRow) -> User {
    User {
        login,
        password_hash,
        is_captain,
        avatar: optional_id(avatar),
    }
}

/// Creates a user row; `password_hash` must already be hashed.
///
/// # Returns
/// * `Ok(())` - User created
/// * `Err(OvoError::AlreadyExists)` - The login is taken
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    login: &str,
    password_hash: &str,
    is_captain: bool,
    avatar: Option<&EntityId>,
) -> SqlResult<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (login, password_hash, is_captain, avatar)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(login)
    .bind(password_hash)
    .bind(is_captain)
    .bind(avatar.map(EntityId::as_str))
    .execute(&mut **tx)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(OvoError::AlreadyExists(format!("user {}", login)))
        }
        Err(e) => {
            tracing::error!(error = %e, "database error creating user");
            Err(e.into())
        }
    }
}

pub async fn get(tx: &mut Transaction<'_, Postgres>, login: &str) -> SqlResult<Option<User>> {
    let row: Option<UserRow> = sqlx::query_as(
        "SELECT login, password_hash, is_captain, avatar FROM users WHERE login = $1",
    )
    .bind(login)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(from_row))
}

pub async fn list(tx: &mut Transaction<'_, Postgres>) -> SqlResult<Vec<User>> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "SELECT login, password_hash, is_captain, avatar FROM users ORDER BY login",
    )
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows.into_iter().map(from_row).collect())
}

/// Deletes the user row.
///
/// # Returns
/// * `Ok(Some(avatar))` - Row deleted; `avatar` is the id the row pointed at, if any
/// * `Ok(None)` - No such user
pub async fn delete(
    tx: &mut Transaction<'_, Postgres>,
    login: &str,
) -> SqlResult<Option<Option<EntityId>>> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("DELETE FROM users WHERE login = $1 RETURNING avatar")
            .bind(login)
            .fetch_optional(&mut **tx)
            .await?;
    Ok(row.map(|(avatar,)| optional_id(avatar)))
}

/// Returns whether a row was updated.
pub async fn set_captain(
    tx: &mut Transaction<'_, Postgres>,
    login: &str,
    is_captain: bool,
) -> SqlResult<bool> {
    let result = sqlx::query("UPDATE users SET is_captain = $2 WHERE login = $1")
        .bind(login)
        .bind(is_captain)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Returns whether a row was updated.
pub async fn set_avatar(
    tx: &mut Transaction<'_, Postgres>,
    login: &str,
    avatar: Option<&EntityId>,
) -> SqlResult<bool> {
    let result = sqlx::query("UPDATE users SET avatar = $2 WHERE login = $1")
        .bind(login)
        .bind(avatar.map(EntityId::as_str))
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected() > 0)
}
