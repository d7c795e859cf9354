//! Invoice Repository
//!
//! Every write is guarded by the caller's `expected_version` and bumps
//! `version` by one. A zero-row update means another writer got there first.

use super::{RepoError, RepoResult};
use chrono::NaiveDate;
use shared::models::{DocumentType, Invoice, InvoiceStatus};
use sqlx::SqliteConnection;

const COLUMNS: &str = "id, quote_id, document_type, subtotal_cents, tax_rate_bps, tax_amount_cents, total_cents, workflow_status, is_draft, access_token, version, sent_at, viewed_at, approved_at, paid_at, created_at, updated_at";

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> RepoResult<Option<Invoice>> {
    let invoice =
        sqlx::query_as::<_, Invoice>(&format!("SELECT {COLUMNS} FROM invoices WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(invoice)
}

pub async fn find_by_token(
    conn: &mut SqliteConnection,
    access_token: &str,
) -> RepoResult<Option<Invoice>> {
    let invoice = sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {COLUMNS} FROM invoices WHERE access_token = ?"
    ))
    .bind(access_token)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(invoice)
}

pub async fn find_by_quote(
    conn: &mut SqliteConnection,
    quote_id: i64,
) -> RepoResult<Option<Invoice>> {
    let invoice =
        sqlx::query_as::<_, Invoice>(&format!("SELECT {COLUMNS} FROM invoices WHERE quote_id = ?"))
            .bind(quote_id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(invoice)
}

/// Insert an empty draft; totals are filled in by [`update_totals`]
pub async fn create(
    conn: &mut SqliteConnection,
    quote_id: i64,
    document_type: DocumentType,
    tax_rate_bps: i64,
) -> RepoResult<Invoice> {
    let id = shared::util::snowflake_id();
    let now = shared::util::now_millis();
    let token = shared::util::access_token();

    sqlx::query(
        "INSERT INTO invoices (id, quote_id, document_type, tax_rate_bps, workflow_status, is_draft, access_token, version, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, 'draft', 1, ?5, 1, ?6, ?6)",
    )
    .bind(id)
    .bind(quote_id)
    .bind(document_type)
    .bind(tax_rate_bps)
    .bind(&token)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| match RepoError::from(e) {
        RepoError::Duplicate(_) => {
            RepoError::Duplicate(format!("Quote {quote_id} already has an invoice"))
        }
        other => other,
    })?;

    find_by_id(conn, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create invoice".into()))
}

/// Version-checked repricing. Returns the new version.
pub async fn update_totals(
    conn: &mut SqliteConnection,
    id: i64,
    expected_version: i64,
    subtotal_cents: i64,
    tax_amount_cents: i64,
) -> RepoResult<i64> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE invoices SET subtotal_cents = ?1, tax_amount_cents = ?2, total_cents = ?1 + ?2, version = version + 1, updated_at = ?3 WHERE id = ?4 AND version = ?5",
    )
    .bind(subtotal_cents)
    .bind(tax_amount_cents)
    .bind(now)
    .bind(id)
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;

    if rows.rows_affected() == 0 {
        return Err(RepoError::Conflict(format!(
            "Invoice {id} is no longer at version {expected_version}"
        )));
    }
    Ok(expected_version + 1)
}

/// Version-checked status write. Returns the new version.
///
/// Stamps the matching lifecycle timestamp the first time a status is
/// reached, and clears `is_draft` once the invoice leaves `draft`.
pub async fn update_status(
    conn: &mut SqliteConnection,
    id: i64,
    expected_version: i64,
    next: InvoiceStatus,
) -> RepoResult<i64> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE invoices SET \
            workflow_status = ?1, \
            is_draft = CASE WHEN ?1 = 'draft' THEN is_draft ELSE 0 END, \
            sent_at = CASE WHEN ?1 = 'sent' THEN COALESCE(sent_at, ?2) ELSE sent_at END, \
            viewed_at = CASE WHEN ?1 = 'viewed' THEN COALESCE(viewed_at, ?2) ELSE viewed_at END, \
            approved_at = CASE WHEN ?1 = 'approved' THEN COALESCE(approved_at, ?2) ELSE approved_at END, \
            paid_at = CASE WHEN ?1 = 'paid' THEN COALESCE(paid_at, ?2) ELSE paid_at END, \
            version = version + 1, \
            updated_at = ?2 \
         WHERE id = ?3 AND version = ?4",
    )
    .bind(next)
    .bind(now)
    .bind(id)
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;

    if rows.rows_affected() == 0 {
        return Err(RepoError::Conflict(format!(
            "Invoice {id} is no longer at version {expected_version}"
        )));
    }
    Ok(expected_version + 1)
}

/// Invoices with an unpaid milestone due before `today` that are not yet
/// flagged overdue
pub async fn find_past_due(
    conn: &mut SqliteConnection,
    today: NaiveDate,
) -> RepoResult<Vec<Invoice>> {
    let cols = COLUMNS
        .split(", ")
        .map(|c| format!("i.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let invoices = sqlx::query_as::<_, Invoice>(&format!(
        "SELECT DISTINCT {cols} FROM invoices i \
         JOIN payment_milestones m ON m.invoice_id = i.id \
         WHERE i.workflow_status IN ('approved', 'payment_pending', 'partially_paid') \
           AND m.status != 'paid' \
           AND m.due_date IS NOT NULL AND m.due_date < ? \
         ORDER BY i.id"
    ))
    .bind(today)
    .fetch_all(&mut *conn)
    .await?;
    Ok(invoices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DbService, quotes};
    use shared::models::{CustomerType, QuoteCreate};

    async fn seed_quote(conn: &mut SqliteConnection) -> i64 {
        let quote = quotes::create(
            conn,
            &QuoteCreate {
                customer_name: "Ari Novak".into(),
                customer_email: "ari@example.com".into(),
                customer_phone: None,
                customer_type: CustomerType::Standard,
                event_date: NaiveDate::from_ymd_opt(2027, 3, 20).unwrap(),
                event_time: None,
                location: "Grand Hall".into(),
                guest_count: 80,
                service_type: "buffet".into(),
                menu_selections: vec![],
            },
        )
        .await
        .unwrap();
        quote.id
    }

    #[tokio::test]
    async fn test_create_draft() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let quote_id = seed_quote(&mut conn).await;

        let invoice = create(&mut conn, quote_id, DocumentType::Estimate, 825).await.unwrap();
        assert_eq!(invoice.workflow_status, InvoiceStatus::Draft);
        assert!(invoice.is_draft);
        assert_eq!(invoice.version, 1);
        assert_eq!(invoice.total_cents, 0);

        let by_token = find_by_token(&mut conn, &invoice.access_token).await.unwrap().unwrap();
        assert_eq!(by_token.id, invoice.id);
        let by_quote = find_by_quote(&mut conn, quote_id).await.unwrap().unwrap();
        assert_eq!(by_quote.id, invoice.id);
    }

    #[tokio::test]
    async fn test_one_invoice_per_quote() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let quote_id = seed_quote(&mut conn).await;

        create(&mut conn, quote_id, DocumentType::Estimate, 0).await.unwrap();
        let err = create(&mut conn, quote_id, DocumentType::Invoice, 0).await.unwrap_err();
        assert!(matches!(err, RepoError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_update_totals_version_check() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let quote_id = seed_quote(&mut conn).await;
        let invoice = create(&mut conn, quote_id, DocumentType::Estimate, 825).await.unwrap();

        let v2 = update_totals(&mut conn, invoice.id, 1, 1_000_000, 82_500).await.unwrap();
        assert_eq!(v2, 2);

        // Stale version
        let err = update_totals(&mut conn, invoice.id, 1, 5, 0).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));

        let stored = find_by_id(&mut conn, invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.subtotal_cents, 1_000_000);
        assert_eq!(stored.total_cents, 1_082_500);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_update_status_stamps_timestamps() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let quote_id = seed_quote(&mut conn).await;
        let invoice = create(&mut conn, quote_id, DocumentType::Estimate, 0).await.unwrap();

        let v = update_status(&mut conn, invoice.id, 1, InvoiceStatus::Sent).await.unwrap();
        let v = update_status(&mut conn, invoice.id, v, InvoiceStatus::Approved).await.unwrap();
        assert_eq!(v, 3);

        let stored = find_by_id(&mut conn, invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.workflow_status, InvoiceStatus::Approved);
        assert!(!stored.is_draft);
        assert!(stored.sent_at.is_some());
        assert!(stored.approved_at.is_some());
        assert!(stored.viewed_at.is_none());
        assert!(stored.paid_at.is_none());
    }
}
