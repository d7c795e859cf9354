//! Payment Transaction Repository (append-only ledger)

use super::{RepoError, RepoResult};
use shared::models::{PaymentTransaction, TransactionStatus};
use sqlx::SqliteConnection;

const COLUMNS: &str =
    "id, invoice_id, amount_cents, status, gateway_ref, method, created_at, updated_at";

pub async fn find_by_invoice(
    conn: &mut SqliteConnection,
    invoice_id: i64,
) -> RepoResult<Vec<PaymentTransaction>> {
    let rows = sqlx::query_as::<_, PaymentTransaction>(&format!(
        "SELECT {COLUMNS} FROM payment_transactions WHERE invoice_id = ? ORDER BY created_at, id"
    ))
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn find_by_gateway_ref(
    conn: &mut SqliteConnection,
    gateway_ref: &str,
) -> RepoResult<Option<PaymentTransaction>> {
    let row = sqlx::query_as::<_, PaymentTransaction>(&format!(
        "SELECT {COLUMNS} FROM payment_transactions WHERE gateway_ref = ?"
    ))
    .bind(gateway_ref)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// Insert a ledger row. Returns `false` when the gateway reference was
/// already recorded (duplicate delivery).
pub async fn insert(
    conn: &mut SqliteConnection,
    invoice_id: i64,
    amount_cents: i64,
    status: TransactionStatus,
    gateway_ref: &str,
    method: &str,
) -> RepoResult<bool> {
    if amount_cents <= 0 {
        return Err(RepoError::Validation(format!(
            "Payment amount must be positive, got {amount_cents}"
        )));
    }
    let now = shared::util::now_millis();
    let result = sqlx::query(
        "INSERT INTO payment_transactions (id, invoice_id, amount_cents, status, gateway_ref, method, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) ON CONFLICT(gateway_ref) DO NOTHING",
    )
    .bind(shared::util::snowflake_id())
    .bind(invoice_id)
    .bind(amount_cents)
    .bind(status)
    .bind(gateway_ref)
    .bind(method)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Settle a pending row. Returns `false` if it was already settled.
pub async fn settle(
    conn: &mut SqliteConnection,
    gateway_ref: &str,
    status: TransactionStatus,
) -> RepoResult<bool> {
    let now = shared::util::now_millis();
    let result = sqlx::query(
        "UPDATE payment_transactions SET status = ?1, updated_at = ?2 WHERE gateway_ref = ?3 AND status = 'pending'",
    )
    .bind(status)
    .bind(now)
    .bind(gateway_ref)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Authoritative paid amount for an invoice
pub async fn sum_completed(conn: &mut SqliteConnection, invoice_id: i64) -> RepoResult<i64> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_cents), 0) FROM payment_transactions WHERE invoice_id = ? AND status = 'completed'",
    )
    .bind(invoice_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(total)
}
