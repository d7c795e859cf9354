//! Processed gateway webhook events (delivery de-duplication)

use super::RepoResult;
use sqlx::SqliteConnection;

/// Record an event id. Returns `false` when the event was already processed.
///
/// INSERT first and inspect `rows_affected`, so two concurrent deliveries of
/// the same event cannot both pass.
pub async fn mark_processed(
    conn: &mut SqliteConnection,
    event_id: &str,
    event_type: &str,
) -> RepoResult<bool> {
    let now = shared::util::now_millis();
    let result = sqlx::query(
        "INSERT INTO processed_webhook_events (event_id, event_type, processed_at) VALUES (?1, ?2, ?3) ON CONFLICT DO NOTHING",
    )
    .bind(event_id)
    .bind(event_type)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Drop the record again so a redelivery is processed
pub async fn forget(conn: &mut SqliteConnection, event_id: &str) -> RepoResult<()> {
    sqlx::query("DELETE FROM processed_webhook_events WHERE event_id = ?")
        .bind(event_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
