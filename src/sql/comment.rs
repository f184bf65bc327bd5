//! Comments and their ordered attachment lists.
//!
//! Attachments live in a `TEXT[]` column so order and duplicates survive a round trip; `seq`
//! orders comments by creation.

use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};

use super::SqlResult;
use crate::{Comment, EntityId, NewComment};

type CommentRow = (
    String,
    String,
    String,
    Option<String>,
    Vec<String>,
    DateTime<Utc>,
);

fn from_row((id, task_id, user_id, text, attached, created_at): CommentRow) -> Comment {
    Comment {
        id: EntityId::from_trusted(id),
        task_id: EntityId::from_trusted(task_id),
        user_id,
        text,
        attached_files: ids(attached),
        created_at,
    }
}

fn ids(raw: Vec<String>) -> Vec<EntityId> {
    raw.into_iter().map(EntityId::from_trusted).collect()
}

pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    id: &EntityId,
    comment: &NewComment,
) -> SqlResult<()> {
    let attached: Vec<&str> = comment.attached_files.iter().map(EntityId::as_str).collect();
    sqlx::query(
        r#"
        INSERT INTO comments (id, task_id, user_id, text, attached_files_ids)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id.as_str())
    .bind(comment.task_id.as_str())
    .bind(&comment.user_id)
    .bind(&comment.text)
    .bind(attached)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn get(tx: &mut Transaction<'_, Postgres>, id: &EntityId) -> SqlResult<Option<Comment>> {
    let row: Option<CommentRow> = sqlx::query_as(
        r#"
        SELECT id, task_id, user_id, text, attached_files_ids, created_at
        FROM comments WHERE id = $1
        "#,
    )
    .bind(id.as_str())
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(from_row))
}

pub async fn list(tx: &mut Transaction<'_, Postgres>) -> SqlResult<Vec<Comment>> {
    let rows: Vec<CommentRow> = sqlx::query_as(
        r#"
        SELECT id, task_id, user_id, text, attached_files_ids, created_at
        FROM comments ORDER BY seq
        "#,
    )
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows.into_iter().map(from_row).collect())
}

/// Deletes one comment.
///
/// # Returns
/// * `Ok(Some(files))` - Row deleted; `files` are its attachments in order
/// * `Ok(None)` - No such comment
pub async fn delete(
    tx: &mut Transaction<'_, Postgres>,
    id: &EntityId,
) -> SqlResult<Option<Vec<EntityId>>> {
    let row: Option<(Vec<String>,)> =
        sqlx::query_as("DELETE FROM comments WHERE id = $1 RETURNING attached_files_ids")
            .bind(id.as_str())
            .fetch_optional(&mut **tx)
            .await?;
    Ok(row.map(|(attached,)| ids(attached)))
}

/// Deletes every comment on a task and returns the concatenation of their attachments,
/// comment by comment in creation order.
pub async fn delete_for_task(
    tx: &mut Transaction<'_, Postgres>,
    task_id: &EntityId,
) -> SqlResult<Vec<EntityId>> {
    let mut rows: Vec<(i64, Vec<String>)> = sqlx::query_as(
        "DELETE FROM comments WHERE task_id = $1 RETURNING seq, attached_files_ids",
    )
    .bind(task_id.as_str())
    .fetch_all(&mut **tx)
    .await?;
    rows.sort_by_key(|(seq, _)| *seq);
    Ok(rows
        .into_iter()
        .flat_map(|(_, attached)| ids(attached))
        .collect())
}
