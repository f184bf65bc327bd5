use sqlx::{Postgres, Transaction};

use super::SqlResult;
use crate::{EntityId, File};

fn from_row((id, name): (String, String)) -> File {
    File {
        id: EntityId::from_trusted(id),
        name,
    }
}

pub async fn insert(tx: &mut Transaction<'_, Postgres>, id: &EntityId, name: &str) -> SqlResult<()> {
    sqlx::query("INSERT INTO files (id, name) VALUES ($1, $2)")
        .bind(id.as_str())
        .bind(name)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn get(tx: &mut Transaction<'_, Postgres>, id: &EntityId) -> SqlResult<Option<File>> {
    let row: Option<(String, String)> = sqlx::query_as("SELECT id, name FROM files WHERE id = $1")
        .bind(id.as_str())
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row.map(from_row))
}

pub async fn list(tx: &mut Transaction<'_, Postgres>) -> SqlResult<Vec<File>> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT id, name FROM files ORDER BY name, id")
        .fetch_all(&mut **tx)
        .await?;
    Ok(rows.into_iter().map(from_row).collect())
}

/// Returns whether a row was deleted.
pub async fn delete(tx: &mut Transaction<'_, Postgres>, id: &EntityId) -> SqlResult<bool> {
    let result = sqlx::query("DELETE FROM files WHERE id = $1")
        .bind(id.as_str())
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected() > 0)
}
