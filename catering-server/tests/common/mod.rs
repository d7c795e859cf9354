//! Shared fixtures: in-memory service with fake mail and payment collaborators
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use catering_server::db::DbService;
use catering_server::email::{BoxError, Mailer, Notifier};
use catering_server::stripe::{CheckoutRequest, CheckoutSession, PaymentLinks};
use catering_server::workflow::{WorkflowService, WorkflowSettings};
use chrono::{Days, Utc};
use shared::models::{
    CustomerType, Invoice, InvoiceCreate, LineItemInput, MenuSelection, Quote, QuoteCreate,
};

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const CUSTOMER_EMAIL: &str = "robin@example.com";

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    pub fn subjects_to(&self, to: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(recipient, _)| recipient == to)
            .map(|(_, subject)| subject.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, _html_body: &str) -> Result<(), BoxError> {
        self.sent.lock().unwrap().push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _to: &str, _subject: &str, _html_body: &str) -> Result<(), BoxError> {
        Err("mail relay unavailable".into())
    }
}

/// Records requested amounts and hands out sequential session ids
#[derive(Default)]
pub struct FakeCheckout {
    pub amounts: Mutex<Vec<i64>>,
}

#[async_trait]
impl PaymentLinks for FakeCheckout {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest<'_>,
    ) -> Result<CheckoutSession, BoxError> {
        let mut amounts = self.amounts.lock().unwrap();
        amounts.push(request.amount_cents);
        let id = format!("cs_test_{}_{}", request.invoice_id, amounts.len());
        Ok(CheckoutSession {
            url: format!("https://checkout.test/{id}"),
            id,
        })
    }
}

pub struct FailingCheckout;

#[async_trait]
impl PaymentLinks for FailingCheckout {
    async fn create_checkout_session(
        &self,
        _request: &CheckoutRequest<'_>,
    ) -> Result<CheckoutSession, BoxError> {
        Err("gateway timeout".into())
    }
}

pub struct Harness {
    pub svc: WorkflowService,
    pub mailer: Arc<RecordingMailer>,
    pub checkout: Arc<FakeCheckout>,
}

pub async fn build(mailer: Arc<dyn Mailer>, payments: Arc<dyn PaymentLinks>) -> WorkflowService {
    let db = DbService::in_memory().await.unwrap();
    let notifier = Notifier::new(mailer, ADMIN_EMAIL, "https://portal.test");
    WorkflowService::new(db.pool, notifier, payments, WorkflowSettings::default())
}

pub async fn setup() -> Harness {
    let mailer = Arc::new(RecordingMailer::default());
    let checkout = Arc::new(FakeCheckout::default());
    let svc = build(mailer.clone(), checkout.clone()).await;
    Harness { svc, mailer, checkout }
}

pub fn quote_data(days_out: u64, customer_type: CustomerType, guest_count: i32) -> QuoteCreate {
    QuoteCreate {
        customer_name: "Robin Hale".into(),
        customer_email: CUSTOMER_EMAIL.into(),
        customer_phone: Some("555-0100".into()),
        customer_type,
        event_date: Utc::now().date_naive() + Days::new(days_out),
        event_time: None,
        location: "Cedar Hall".into(),
        guest_count,
        service_type: "buffet".into(),
        menu_selections: vec![
            MenuSelection::new("mains", "Chicken"),
            MenuSelection::new("desserts", "Tiramisu"),
        ],
    }
}

/// Quote with a tax-free draft invoice of exactly `total_cents`
pub async fn draft_invoice(
    svc: &WorkflowService,
    days_out: u64,
    customer_type: CustomerType,
    total_cents: i64,
) -> (Quote, Invoice) {
    let quote = svc
        .create_quote(&quote_data(days_out, customer_type, 100))
        .await
        .unwrap();
    let invoice = svc
        .create_invoice(&InvoiceCreate {
            quote_id: quote.id,
            document_type: Default::default(),
            tax_rate_bps: 0,
            line_items: vec![LineItemInput {
                title: "Event catering".into(),
                description: None,
                category: Some("package".into()),
                quantity: 1,
                unit_price_cents: total_cents,
            }],
        })
        .await
        .unwrap();
    (quote, invoice)
}

/// Draft invoice taken through send and customer approval
pub async fn booked_invoice(
    svc: &WorkflowService,
    days_out: u64,
    customer_type: CustomerType,
    total_cents: i64,
) -> (Quote, Invoice) {
    let (quote, invoice) = draft_invoice(svc, days_out, customer_type, total_cents).await;
    svc.send_invoice(invoice.id).await.unwrap();
    let approval = svc.customer_approve(&invoice.access_token).await.unwrap();
    (quote, approval.invoice)
}
