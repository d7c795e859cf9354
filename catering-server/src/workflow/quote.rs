//! Quote intake and admin status changes

use chrono::Utc;
use shared::models::{Quote, QuoteCreate, QuoteStatus, QuoteStatusUpdate};

use super::WorkflowService;
use super::sync::required_quote_status;
use crate::db::{RepoError, invoices, quotes};
use crate::error::{Entity, WorkflowError, WorkflowResult};
use crate::validation::{
    MAX_ADDRESS_LEN, MAX_NAME_LEN, MAX_SHORT_TEXT_LEN, validate_email, validate_event_date,
    validate_optional_text, validate_required_text,
};

/// Largest guest count accepted at intake
const MAX_GUEST_COUNT: i32 = 10_000;

fn validate_quote(data: &QuoteCreate) -> WorkflowResult<()> {
    validate_required_text(&data.customer_name, "customer_name", MAX_NAME_LEN)?;
    validate_email(&data.customer_email, "customer_email")?;
    validate_optional_text(&data.customer_phone, "customer_phone", MAX_SHORT_TEXT_LEN)?;
    validate_required_text(&data.location, "location", MAX_ADDRESS_LEN)?;
    validate_required_text(&data.service_type, "service_type", MAX_SHORT_TEXT_LEN)?;
    validate_event_date(data.event_date, Utc::now().date_naive())?;
    if !(1..=MAX_GUEST_COUNT).contains(&data.guest_count) {
        return Err(WorkflowError::Validation(format!(
            "guest_count must be between 1 and {MAX_GUEST_COUNT}, got {}",
            data.guest_count
        )));
    }
    for selection in &data.menu_selections {
        validate_required_text(&selection.category, "menu category", MAX_SHORT_TEXT_LEN)?;
        validate_required_text(&selection.item, "menu item", MAX_NAME_LEN)?;
    }
    Ok(())
}

impl WorkflowService {
    pub async fn create_quote(&self, data: &QuoteCreate) -> WorkflowResult<Quote> {
        validate_quote(data)?;
        let mut conn = self.pool().acquire().await?;
        let quote = quotes::create(&mut conn, data).await?;
        tracing::info!(
            quote_id = quote.id,
            event_date = %quote.event_date,
            guest_count = quote.guest_count,
            customer_type = ?quote.customer_type,
            "Quote created"
        );
        Ok(quote)
    }

    pub async fn find_quote(&self, id: i64) -> WorkflowResult<Quote> {
        let mut conn = self.pool().acquire().await?;
        quotes::find_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(Entity::Quote, id))
    }

    /// Admin transition: forward only, cancel from any non-terminal status
    pub async fn update_quote_status(
        &self,
        id: i64,
        update: &QuoteStatusUpdate,
    ) -> WorkflowResult<Quote> {
        validate_required_text(&update.changed_by, "changed_by", MAX_NAME_LEN)?;

        let mut conn = self.pool().acquire().await?;
        let quote = quotes::find_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(Entity::Quote, id))?;
        let current: QuoteStatus = quote.workflow_status;
        if !current.can_transition_to(update.status) {
            tracing::warn!(quote_id = id, from = %current, to = %update.status, "Rejected quote transition");
            return Err(WorkflowError::invalid_transition(Entity::Quote, current, update.status));
        }
        // A booking is only confirmed by a paid invoice (or accepted Net-30 terms)
        if matches!(update.status, QuoteStatus::Confirmed | QuoteStatus::Completed)
            && let Some(invoice) = invoices::find_by_quote(&mut conn, id).await?
            && required_quote_status(invoice.workflow_status, quote.customer_type)
                != Some(QuoteStatus::Confirmed)
        {
            tracing::warn!(
                quote_id = id,
                invoice_id = invoice.id,
                invoice_status = %invoice.workflow_status,
                to = %update.status,
                "Rejected quote confirmation, invoice not settled"
            );
            return Err(WorkflowError::invalid_transition(Entity::Quote, current, update.status));
        }

        quotes::update_status(&mut conn, id, current, update.status, &update.changed_by)
            .await
            .map_err(|e| match e {
                // Someone else moved it first; report against what is stored now
                RepoError::Conflict(_) => {
                    WorkflowError::invalid_transition(Entity::Quote, current, update.status)
                }
                other => other.into(),
            })?;

        tracing::info!(
            quote_id = id,
            from = %current,
            to = %update.status,
            changed_by = %update.changed_by,
            "Quote status updated"
        );
        quotes::find_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(Entity::Quote, id))
    }
}
