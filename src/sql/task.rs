use sqlx::{Postgres, Transaction};

use super::SqlResult;
use crate::{EntityId, NewTask, Task};

type TaskRow = (
    String,
    String,
    bool,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn from_row((id, name, solved, original_link, original_id, text): TaskRow) -> Task {
    Task {
        id: EntityId::from_trusted(id),
        name,
        solved,
        original_link,
        original_id,
        text,
    }
}

/// Inserts a task under `id`. A taken id surfaces as `AlreadyExists` for the allocator.
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    id: &EntityId,
    task: &NewTask,
) -> SqlResult<()> {
    sqlx::query(
        r#"
        INSERT INTO tasks (id, name, original_link, original_id, text)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id.as_str())
    .bind(&task.name)
    .bind(&task.original_link)
    .bind(&task.original_id)
    .bind(&task.text)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn get(tx: &mut Transaction<'_, Postgres>, id: &EntityId) -> SqlResult<Option<Task>> {
    let row: Option<TaskRow> = sqlx::query_as(
        "SELECT id, name, solved, original_link, original_id, text FROM tasks WHERE id = $1",
    )
    .bind(id.as_str())
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(from_row))
}

pub async fn list(tx: &mut Transaction<'_, Postgres>) -> SqlResult<Vec<Task>> {
    let rows: Vec<TaskRow> = sqlx::query_as(
        "SELECT id, name, solved, original_link, original_id, text FROM tasks ORDER BY name, id",
    )
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows.into_iter().map(from_row).collect())
}

/// Returns whether a row was deleted.
pub async fn delete(tx: &mut Transaction<'_, Postgres>, id: &EntityId) -> SqlResult<bool> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(id.as_str())
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Returns whether a row was updated.
pub async fn set_solved(
    tx: &mut Transaction<'_, Postgres>,
    id: &EntityId,
    solved: bool,
) -> SqlResult<bool> {
    let result = sqlx::query("UPDATE tasks SET solved = $2 WHERE id = $1")
        .bind(id.as_str())
        .bind(solved)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected() > 0)
}
