//! Payment Milestone Repository

use super::RepoResult;
use chrono::NaiveDate;
use shared::models::{MilestoneStatus, MilestoneType, PaymentMilestone};
use sqlx::SqliteConnection;

const COLUMNS: &str = "id, invoice_id, milestone_type, description, percentage_bps, amount_cents, due_date, status, sort_order, created_at, updated_at";

/// Row to insert, produced by the schedule generator
#[derive(Debug, Clone)]
pub struct NewMilestone {
    pub milestone_type: MilestoneType,
    pub description: String,
    pub percentage_bps: i64,
    pub amount_cents: i64,
    pub due_date: Option<NaiveDate>,
    pub sort_order: i32,
}

/// Milestones in waterfall order: due-now first, then by due date
pub async fn find_by_invoice(
    conn: &mut SqliteConnection,
    invoice_id: i64,
) -> RepoResult<Vec<PaymentMilestone>> {
    let milestones = sqlx::query_as::<_, PaymentMilestone>(&format!(
        "SELECT {COLUMNS} FROM payment_milestones WHERE invoice_id = ? ORDER BY due_date IS NOT NULL, due_date, sort_order"
    ))
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(milestones)
}

pub async fn count_by_invoice(conn: &mut SqliteConnection, invoice_id: i64) -> RepoResult<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM payment_milestones WHERE invoice_id = ?")
            .bind(invoice_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(count)
}

pub async fn insert_batch(
    conn: &mut SqliteConnection,
    invoice_id: i64,
    rows: &[NewMilestone],
) -> RepoResult<()> {
    let now = shared::util::now_millis();
    for row in rows {
        sqlx::query(
            "INSERT INTO payment_milestones (id, invoice_id, milestone_type, description, percentage_bps, amount_cents, due_date, status, sort_order, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9, ?9)",
        )
        .bind(shared::util::snowflake_id())
        .bind(invoice_id)
        .bind(row.milestone_type)
        .bind(&row.description)
        .bind(row.percentage_bps)
        .bind(row.amount_cents)
        .bind(row.due_date)
        .bind(row.sort_order)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Status is the only mutable field once a schedule exists
pub async fn update_status(
    conn: &mut SqliteConnection,
    id: i64,
    status: MilestoneStatus,
) -> RepoResult<()> {
    let now = shared::util::now_millis();
    sqlx::query("UPDATE payment_milestones SET status = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(status)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
