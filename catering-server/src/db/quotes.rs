//! Quote Repository

use super::{RepoError, RepoResult};
use chrono::{NaiveDate, NaiveTime};
use shared::models::{MenuSelection, Quote, QuoteCreate, QuoteStatus};
use sqlx::SqliteConnection;
use sqlx::types::Json;

const COLUMNS: &str = "id, customer_name, customer_email, customer_phone, customer_type, event_date, event_time, location, guest_count, service_type, menu_selections, workflow_status, status_changed_by, status_changed_at, created_at, updated_at";

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> RepoResult<Option<Quote>> {
    let quote = sqlx::query_as::<_, Quote>(&format!("SELECT {COLUMNS} FROM quotes WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(quote)
}

pub async fn create(conn: &mut SqliteConnection, data: &QuoteCreate) -> RepoResult<Quote> {
    let id = shared::util::snowflake_id();
    let now = shared::util::now_millis();

    sqlx::query(
        "INSERT INTO quotes (id, customer_name, customer_email, customer_phone, customer_type, event_date, event_time, location, guest_count, service_type, menu_selections, workflow_status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'pending', ?12, ?12)",
    )
    .bind(id)
    .bind(&data.customer_name)
    .bind(&data.customer_email)
    .bind(&data.customer_phone)
    .bind(data.customer_type)
    .bind(data.event_date)
    .bind(data.event_time)
    .bind(&data.location)
    .bind(data.guest_count)
    .bind(&data.service_type)
    .bind(Json(&data.menu_selections))
    .bind(now)
    .execute(&mut *conn)
    .await?;

    find_by_id(conn, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create quote".into()))
}

/// Conditional status write: only applies when the stored status is still `expected`.
pub async fn update_status(
    conn: &mut SqliteConnection,
    id: i64,
    expected: QuoteStatus,
    next: QuoteStatus,
    changed_by: &str,
) -> RepoResult<()> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE quotes SET workflow_status = ?1, status_changed_by = ?2, status_changed_at = ?3, updated_at = ?3 WHERE id = ?4 AND workflow_status = ?5",
    )
    .bind(next)
    .bind(changed_by)
    .bind(now)
    .bind(id)
    .bind(expected)
    .execute(&mut *conn)
    .await?;

    if rows.rows_affected() == 0 {
        return Err(RepoError::Conflict(format!(
            "Quote {id} is no longer {expected}"
        )));
    }
    Ok(())
}

/// Event details touched by an approved change request
#[derive(Debug, Clone)]
pub struct QuoteEventDetails {
    pub guest_count: i32,
    pub event_date: NaiveDate,
    pub event_time: Option<NaiveTime>,
    pub location: String,
    pub menu_selections: Vec<MenuSelection>,
}

impl From<&Quote> for QuoteEventDetails {
    fn from(quote: &Quote) -> Self {
        Self {
            guest_count: quote.guest_count,
            event_date: quote.event_date,
            event_time: quote.event_time,
            location: quote.location.clone(),
            menu_selections: quote.menu_selections.clone(),
        }
    }
}

pub async fn update_event_details(
    conn: &mut SqliteConnection,
    id: i64,
    details: &QuoteEventDetails,
) -> RepoResult<()> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE quotes SET guest_count = ?1, event_date = ?2, event_time = ?3, location = ?4, menu_selections = ?5, updated_at = ?6 WHERE id = ?7",
    )
    .bind(details.guest_count)
    .bind(details.event_date)
    .bind(details.event_time)
    .bind(&details.location)
    .bind(Json(&details.menu_selections))
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Quote {id} not found")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use shared::models::CustomerType;

    fn sample_quote() -> QuoteCreate {
        QuoteCreate {
            customer_name: "Dana Whitfield".into(),
            customer_email: "dana@example.com".into(),
            customer_phone: None,
            customer_type: CustomerType::Standard,
            event_date: NaiveDate::from_ymd_opt(2026, 12, 12).unwrap(),
            event_time: NaiveTime::from_hms_opt(18, 30, 0),
            location: "Harbor Pavilion".into(),
            guest_count: 100,
            service_type: "plated".into(),
            menu_selections: vec![MenuSelection::new("mains", "Braised short rib")],
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();

        let quote = create(&mut conn, &sample_quote()).await.unwrap();
        assert_eq!(quote.workflow_status, QuoteStatus::Pending);
        assert_eq!(quote.guest_count, 100);
        assert_eq!(quote.menu_selections.len(), 1);

        let found = find_by_id(&mut conn, quote.id).await.unwrap().unwrap();
        assert_eq!(found.customer_email, "dana@example.com");
        assert_eq!(found.event_time, NaiveTime::from_hms_opt(18, 30, 0));
    }

    #[tokio::test]
    async fn test_update_status_is_conditional() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let quote = create(&mut conn, &sample_quote()).await.unwrap();

        update_status(&mut conn, quote.id, QuoteStatus::Pending, QuoteStatus::UnderReview, "admin")
            .await
            .unwrap();

        // Stale expectation no longer matches
        let err = update_status(&mut conn, quote.id, QuoteStatus::Pending, QuoteStatus::Estimated, "admin")
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));

        let found = find_by_id(&mut conn, quote.id).await.unwrap().unwrap();
        assert_eq!(found.workflow_status, QuoteStatus::UnderReview);
        assert_eq!(found.status_changed_by.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn test_update_event_details_missing_quote() {
        let db = DbService::in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let quote = create(&mut conn, &sample_quote()).await.unwrap();
        let details = QuoteEventDetails::from(&quote);

        let err = update_event_details(&mut conn, quote.id + 1, &details).await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound(_)));
    }
}
