//! The namespace-wide ledger of issued ids.

use sqlx::{Postgres, Transaction};

use super::SqlResult;
use crate::EntityId;

/// Claims `id` for the rest of the namespace's life.
///
/// # Returns
/// * `Ok(())` - The id was never issued before
/// * `Err(OvoError::AlreadyExists)` - The id was issued before, possibly to a removed row
pub async fn reserve(tx: &mut Transaction<'_, Postgres>, id: &EntityId) -> SqlResult<()> {
    sqlx::query("INSERT INTO entity_ids (id) VALUES ($1)")
        .bind(id.as_str())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Returns whether `id` was ever issued.
pub async fn is_reserved(tx: &mut Transaction<'_, Postgres>, id: &EntityId) -> SqlResult<bool> {
    let (reserved,): (bool,) =
        sqlx::query_as("SELECT EXISTS (SELECT 1 FROM entity_ids WHERE id = $1)")
            .bind(id.as_str())
            .fetch_one(&mut **tx)
            .await?;
    Ok(reserved)
}
