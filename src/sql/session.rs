//! Web sessions: at most one per user.

use sqlx::{Postgres, Transaction};

use super::{SqlResult, optional_id};
use crate::{EntityId, User};

/// Replaces the user's session with `session`.
pub async fn replace(
    tx: &mut Transaction<'_, Postgres>,
    login: &str,
    session: &EntityId,
) -> SqlResult<()> {
    sqlx::query(
        r#"
        INSERT INTO session_data (user_id, session_id) VALUES ($1, $2)
        ON CONFLICT (user_id) DO UPDATE SET session_id = EXCLUDED.session_id
        "#,
    )
    .bind(login)
    .bind(session.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn user_for(
    tx: &mut Transaction<'_, Postgres>,
    session: &EntityId,
) -> SqlResult<Option<User>> {
    let row: Option<(String, String, bool, Option<String>)> = sqlx::query_as(
        r#"
        SELECT u.login, u.password_hash, u.is_captain, u.avatar
        FROM session_data s JOIN users u ON u.login = s.user_id
        WHERE s.session_id = $1
        "#,
    )
    .bind(session.as_str())
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(|(login, password_hash, is_captain, avatar)| User {
        login,
        password_hash,
        is_captain,
        avatar: optional_id(avatar),
    }))
}

/// Returns whether a session existed.
pub async fn delete(tx: &mut Transaction<'_, Postgres>, login: &str) -> SqlResult<bool> {
    let result = sqlx::query("DELETE FROM session_data WHERE user_id = $1")
        .bind(login)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected() > 0)
}
