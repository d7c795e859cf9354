//! Change Request Repository

use super::{RepoError, RepoResult};
use shared::models::{ChangeRequest, ChangeRequestStatus, RequestedChanges};
use sqlx::SqliteConnection;
use sqlx::types::Json;

const COLUMNS: &str = "id, invoice_id, quote_id, customer_email, request_type, requested_changes, customer_comments, status, admin_response, estimated_cost_change_cents, final_cost_change_cents, reviewed_by, reviewed_at, created_at, updated_at";

pub async fn find_by_id(
    conn: &mut SqliteConnection,
    id: i64,
) -> RepoResult<Option<ChangeRequest>> {
    let row = sqlx::query_as::<_, ChangeRequest>(&format!(
        "SELECT {COLUMNS} FROM change_requests WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

pub async fn find_by_invoice(
    conn: &mut SqliteConnection,
    invoice_id: i64,
) -> RepoResult<Vec<ChangeRequest>> {
    let rows = sqlx::query_as::<_, ChangeRequest>(&format!(
        "SELECT {COLUMNS} FROM change_requests WHERE invoice_id = ? ORDER BY created_at DESC, id DESC"
    ))
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// Fields of a freshly submitted request
#[derive(Debug, Clone)]
pub struct NewChangeRequest<'a> {
    pub invoice_id: i64,
    pub quote_id: i64,
    pub customer_email: &'a str,
    pub requested_changes: &'a RequestedChanges,
    pub customer_comments: Option<&'a str>,
    pub estimated_cost_change_cents: i64,
}

pub async fn insert_pending(
    conn: &mut SqliteConnection,
    data: &NewChangeRequest<'_>,
) -> RepoResult<ChangeRequest> {
    let id = shared::util::snowflake_id();
    let now = shared::util::now_millis();

    sqlx::query(
        "INSERT INTO change_requests (id, invoice_id, quote_id, customer_email, request_type, requested_changes, customer_comments, status, estimated_cost_change_cents, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9, ?9)",
    )
    .bind(id)
    .bind(data.invoice_id)
    .bind(data.quote_id)
    .bind(data.customer_email)
    .bind(data.requested_changes.request_type())
    .bind(Json(data.requested_changes))
    .bind(data.customer_comments)
    .bind(data.estimated_cost_change_cents)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    find_by_id(conn, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create change request".into()))
}

/// Reviewer decision written onto a pending request
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
    pub status: ChangeRequestStatus,
    pub reviewed_by: &'a str,
    pub admin_response: Option<&'a str>,
    pub final_cost_change_cents: Option<i64>,
}

/// Finalize a request. Only a row still in `pending` is touched; a zero-row
/// update is reported as [`RepoError::Conflict`].
pub async fn resolve(
    conn: &mut SqliteConnection,
    id: i64,
    resolution: &Resolution<'_>,
) -> RepoResult<()> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE change_requests SET status = ?1, reviewed_by = ?2, admin_response = ?3, final_cost_change_cents = ?4, reviewed_at = ?5, updated_at = ?5 WHERE id = ?6 AND status = 'pending'",
    )
    .bind(resolution.status)
    .bind(resolution.reviewed_by)
    .bind(resolution.admin_response)
    .bind(resolution.final_cost_change_cents)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if rows.rows_affected() == 0 {
        return Err(RepoError::Conflict(format!(
            "Change request {id} is no longer pending"
        )));
    }
    Ok(())
}
