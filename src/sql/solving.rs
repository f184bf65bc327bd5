use sqlx::{Postgres, Transaction};

use super::SqlResult;
use crate::{EntityId, OvoError, Solving};

/// Records a (user, task) pair.
///
/// # Returns
/// * `Ok(())` - Pair recorded
/// * `Err(OvoError::AlreadyExists)` - The pair is already recorded
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    task_id: &EntityId,
    user_id: &str,
) -> SqlResult<()> {
    let result = sqlx::query("INSERT INTO solvings (user_id, task_id) VALUES ($1, $2)")
        .bind(user_id)
        .bind(task_id.as_str())
        .execute(&mut **tx)
        .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(OvoError::AlreadyExists(format!(
                "user {} already solves task {}",
                user_id, task_id
            )))
        }
        Err(e) => {
            tracing::error!(error = %e, "database error recording solving");
            Err(e.into())
        }
    }
}

/// Returns whether the pair existed.
pub async fn delete(
    tx: &mut Transaction<'_, Postgres>,
    task_id: &EntityId,
    user_id: &str,
) -> SqlResult<bool> {
    let result = sqlx::query("DELETE FROM solvings WHERE user_id = $1 AND task_id = $2")
        .bind(user_id)
        .bind(task_id.as_str())
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list(tx: &mut Transaction<'_, Postgres>) -> SqlResult<Vec<Solving>> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT user_id, task_id FROM solvings ORDER BY user_id, task_id")
            .fetch_all(&mut **tx)
            .await?;
    Ok(rows
        .into_iter()
        .map(|(user_id, task_id)| Solving {
            user_id,
            task_id: EntityId::from_trusted(task_id),
        })
        .collect())
}
