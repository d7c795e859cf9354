//! Line Item Repository

use super::{RepoError, RepoResult};
use shared::models::{LineItem, LineItemInput};
use sqlx::SqliteConnection;

const COLUMNS: &str = "id, invoice_id, title, description, category, quantity, unit_price_cents, total_price_cents, sort_order, created_at";

pub async fn find_by_invoice(
    conn: &mut SqliteConnection,
    invoice_id: i64,
) -> RepoResult<Vec<LineItem>> {
    let items = sqlx::query_as::<_, LineItem>(&format!(
        "SELECT {COLUMNS} FROM line_items WHERE invoice_id = ? ORDER BY sort_order, id"
    ))
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

/// Append an item after the current last one
pub async fn insert(
    conn: &mut SqliteConnection,
    invoice_id: i64,
    input: &LineItemInput,
) -> RepoResult<LineItem> {
    let id = shared::util::snowflake_id();
    let now = shared::util::now_millis();

    let next_order: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM line_items WHERE invoice_id = ?",
    )
    .bind(invoice_id)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT INTO line_items (id, invoice_id, title, description, category, quantity, unit_price_cents, total_price_cents, sort_order, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )
    .bind(id)
    .bind(invoice_id)
    .bind(&input.title)
    .bind(&input.description)
    .bind(&input.category)
    .bind(input.quantity)
    .bind(input.unit_price_cents)
    .bind(input.total_price_cents())
    .bind(next_order)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let item = sqlx::query_as::<_, LineItem>(&format!("SELECT {COLUMNS} FROM line_items WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    item.ok_or_else(|| RepoError::Database("Failed to create line item".into()))
}

pub async fn delete(conn: &mut SqliteConnection, invoice_id: i64, item_id: i64) -> RepoResult<()> {
    let rows = sqlx::query("DELETE FROM line_items WHERE id = ? AND invoice_id = ?")
        .bind(item_id)
        .bind(invoice_id)
        .execute(&mut *conn)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!(
            "Line item {item_id} not found on invoice {invoice_id}"
        )));
    }
    Ok(())
}

/// Sum of line item totals: the invoice subtotal
pub async fn subtotal(conn: &mut SqliteConnection, invoice_id: i64) -> RepoResult<i64> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(total_price_cents), 0) FROM line_items WHERE invoice_id = ?",
    )
    .bind(invoice_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DbService, invoices, quotes};
    use chrono::NaiveDate;
    use shared::models::{CustomerType, DocumentType, QuoteCreate};

    async fn seed_invoice(conn: &mut SqliteConnection) -> i64 {
        let quote = quotes::create(
            conn,
            &QuoteCreate {
                customer_name: "Mina Ortiz".into(),
                customer_email: "mina@example.com".into(),
                customer_phone: Some("555-0101".into()),
                customer_type: CustomerType::Standard,
                event_date: NaiveDate::from_ymd_opt(2027, 5, 1).unwrap(),
                event_time: None,
                location: "Rooftop Garden".into(),
                guest_count: 40,
                service_type: "family_style".into(),
                menu_selections: vec![],
            },
        )
        .await
        .unwrap();
        invoices::create(conn, quote.id, DocumentType::Estimate, 0)
            .await
            .unwrap()
            .id
    }

    fn item(title: &str, quantity: i32, unit_price_cents: i64) -> LineItemInput {
        LineItemInput {
            title: title.into(),
            description: None,
            category: None,
            quantity,
            unit_price_cents,
        }
    }

    #[tokio::test]
    async fn test_insert_orders_and_sums() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let invoice_id = seed_invoice(&mut conn).await;

        let first = insert(&mut conn, invoice_id, &item("Dinner", 40, 4_500)).await.unwrap();
        let second = insert(&mut conn, invoice_id, &item("Bar service", 1, 60_000)).await.unwrap();
        assert_eq!(first.sort_order, 0);
        assert_eq!(second.sort_order, 1);
        assert_eq!(first.total_price_cents, 180_000);

        assert_eq!(subtotal(&mut conn, invoice_id).await.unwrap(), 240_000);
        let items = find_by_invoice(&mut conn, invoice_id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Dinner");
    }

    #[tokio::test]
    async fn test_delete_scoped_to_invoice() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let invoice_id = seed_invoice(&mut conn).await;
        let li = insert(&mut conn, invoice_id, &item("Dessert", 40, 800)).await.unwrap();

        let err = delete(&mut conn, invoice_id + 1, li.id).await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound(_)));

        delete(&mut conn, invoice_id, li.id).await.unwrap();
        assert_eq!(subtotal(&mut conn, invoice_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_negative_adjustment_reduces_subtotal() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let invoice_id = seed_invoice(&mut conn).await;
        insert(&mut conn, invoice_id, &item("Dinner", 40, 4_500)).await.unwrap();
        insert(&mut conn, invoice_id, &item("Guest count adjustment", 1, -9_000))
            .await
            .unwrap();
        assert_eq!(subtotal(&mut conn, invoice_id).await.unwrap(), 171_000);
    }
}
