//! End-to-end booking flows against an in-memory database

mod common;

use chrono::{Days, Utc};
use common::{CUSTOMER_EMAIL, booked_invoice, draft_invoice, setup};
use shared::models::{
    Change, ChangeRequestStatus, ChangeRequestSubmit, CustomerType, InvoiceStatus,
    MilestoneStatus, MilestoneType, PaymentInput, QuoteStatus, RequestedChanges,
};

#[tokio::test]
async fn test_long_lead_booking_splits_deposit_and_balance() {
    let h = setup().await;
    let (quote, invoice) = draft_invoice(&h.svc, 60, CustomerType::Standard, 1_000_000).await;

    let sent = h.svc.send_invoice(invoice.id).await.unwrap();
    assert_eq!(sent.invoice.workflow_status, InvoiceStatus::Sent);
    assert!(sent.warnings.is_empty());
    assert_eq!(
        h.svc.find_quote(quote.id).await.unwrap().workflow_status,
        QuoteStatus::Estimated
    );

    let viewed = h.svc.record_view(&invoice.access_token).await.unwrap();
    assert_eq!(viewed.workflow_status, InvoiceStatus::Viewed);

    let approval = h.svc.customer_approve(&invoice.access_token).await.unwrap();
    assert!(approval.warnings.is_empty());

    let ms = &approval.milestones;
    assert_eq!(ms.len(), 2);
    assert_eq!(ms[0].milestone_type, MilestoneType::Deposit);
    assert_eq!(ms[0].amount_cents, 400_000);
    assert_eq!(ms[0].due_date, None);
    assert_eq!(ms[1].milestone_type, MilestoneType::Balance);
    assert_eq!(ms[1].amount_cents, 600_000);
    assert_eq!(ms[1].due_date, Some(quote.event_date - Days::new(14)));
    assert_eq!(ms.iter().map(|m| m.amount_cents).sum::<i64>(), approval.invoice.total_cents);

    // Deposit is due now, so a checkout link comes back for exactly that amount
    let session = approval.checkout.expect("checkout session for the deposit");
    assert_eq!(*h.checkout.amounts.lock().unwrap(), vec![400_000]);
    assert!(session.url.contains(&session.id));
    assert_eq!(approval.invoice.workflow_status, InvoiceStatus::PaymentPending);

    // Approval alone does not confirm a standard booking
    assert_eq!(
        h.svc.find_quote(quote.id).await.unwrap().workflow_status,
        QuoteStatus::Estimated
    );
}

#[tokio::test]
async fn test_government_booking_is_net_thirty_and_confirmed_on_approval() {
    let h = setup().await;
    let (quote, invoice) = draft_invoice(&h.svc, 45, CustomerType::Government, 1_000_000).await;
    h.svc.send_invoice(invoice.id).await.unwrap();

    let approval = h.svc.customer_approve(&invoice.access_token).await.unwrap();
    assert_eq!(approval.milestones.len(), 1);
    let net = &approval.milestones[0];
    assert_eq!(net.milestone_type, MilestoneType::Net30);
    assert_eq!(net.amount_cents, 1_000_000);
    assert_eq!(net.due_date, Some(quote.event_date + Days::new(30)));

    // Nothing due now: no payment link
    assert!(approval.checkout.is_none());
    assert!(h.checkout.amounts.lock().unwrap().is_empty());
    assert_eq!(approval.invoice.workflow_status, InvoiceStatus::Approved);

    assert_eq!(
        h.svc.find_quote(quote.id).await.unwrap().workflow_status,
        QuoteStatus::Confirmed
    );
    assert!(
        h.mailer
            .subjects_to(CUSTOMER_EMAIL)
            .contains(&"Your booking is confirmed".to_string())
    );
}

#[tokio::test]
async fn test_full_payment_marks_everything_paid_and_confirms() {
    let h = setup().await;
    let (quote, invoice) = booked_invoice(&h.svc, 60, CustomerType::Standard, 1_000_000).await;

    let outcome = h
        .svc
        .record_payment(
            invoice.id,
            &PaymentInput {
                amount_cents: 1_000_000,
                gateway_ref: "bank-transfer-1".into(),
                method: "manual".into(),
            },
        )
        .await
        .unwrap();

    assert!(outcome.recorded);
    assert_eq!(outcome.waterfall.total_paid_cents, 1_000_000);
    assert_eq!(outcome.waterfall.invoice_status, InvoiceStatus::Paid);
    assert!(
        outcome
            .waterfall
            .milestones
            .iter()
            .all(|m| m.status == MilestoneStatus::Paid)
    );

    let detail = h.svc.invoice_detail(invoice.id).await.unwrap();
    assert_eq!(detail.invoice.workflow_status, InvoiceStatus::Paid);
    assert!(detail.invoice.paid_at.is_some());
    assert_eq!(detail.total_paid_cents, 1_000_000);

    assert_eq!(
        h.svc.find_quote(quote.id).await.unwrap().workflow_status,
        QuoteStatus::Confirmed
    );
    assert!(
        h.mailer
            .subjects_to(CUSTOMER_EMAIL)
            .contains(&"Your booking is confirmed".to_string())
    );
}

#[tokio::test]
async fn test_partial_payment_fills_deposit_then_balance() {
    let h = setup().await;
    let (quote, invoice) = booked_invoice(&h.svc, 60, CustomerType::Standard, 1_000_000).await;

    let outcome = h
        .svc
        .record_payment(
            invoice.id,
            &PaymentInput {
                amount_cents: 600_000,
                gateway_ref: "cheque-118".into(),
                method: "manual".into(),
            },
        )
        .await
        .unwrap();

    let statuses: Vec<_> = outcome.waterfall.milestones.iter().map(|m| m.status).collect();
    assert_eq!(statuses, vec![MilestoneStatus::Paid, MilestoneStatus::Partial]);
    assert_eq!(outcome.waterfall.invoice_status, InvoiceStatus::PartiallyPaid);

    // Partially paid is still only an estimate
    assert_eq!(
        h.svc.find_quote(quote.id).await.unwrap().workflow_status,
        QuoteStatus::Estimated
    );
}

#[tokio::test]
async fn test_small_guest_increase_is_auto_approved_and_repriced() {
    let h = setup().await;
    let (quote, invoice) = draft_invoice(&h.svc, 60, CustomerType::Standard, 1_000_000).await;
    h.svc.send_invoice(invoice.id).await.unwrap();

    let outcome = h
        .svc
        .submit_change_request(&ChangeRequestSubmit {
            quote_id: quote.id,
            invoice_id: invoice.id,
            customer_email: CUSTOMER_EMAIL.into(),
            requested_changes: RequestedChanges::new(vec![Change::GuestCount {
                new_guest_count: 108,
            }]),
            customer_comments: Some("Eight more colleagues are coming".into()),
        })
        .await
        .unwrap();

    let decision = outcome.decision.expect("rule engine decision");
    assert!(decision.auto_approve);
    assert_eq!(decision.cost_impact_cents, Some(36_000));

    let cr = &outcome.change_request;
    assert_eq!(cr.status, ChangeRequestStatus::Approved);
    assert_eq!(cr.reviewed_by.as_deref(), Some("system"));
    assert_eq!(cr.final_cost_change_cents, Some(36_000));
    assert!(cr.reviewed_at.is_some());

    let repriced = outcome.invoice.expect("repriced invoice");
    assert_eq!(repriced.total_cents, 1_036_000);
    assert!(repriced.version > invoice.version);

    let quote = h.svc.find_quote(quote.id).await.unwrap();
    assert_eq!(quote.guest_count, 108);

    let detail = h.svc.invoice_detail(invoice.id).await.unwrap();
    assert_eq!(detail.line_items.len(), 2);
    assert_eq!(detail.line_items.iter().map(|i| i.total_price_cents).sum::<i64>(), 1_036_000);

    assert!(
        h.mailer
            .subjects_to(CUSTOMER_EMAIL)
            .contains(&"Your change request was approved".to_string())
    );
}

#[tokio::test]
async fn test_rush_booking_is_paid_in_full_up_front() {
    let h = setup().await;
    let (_, invoice) = draft_invoice(&h.svc, 5, CustomerType::Standard, 250_000).await;
    h.svc.send_invoice(invoice.id).await.unwrap();

    let approval = h.svc.customer_approve(&invoice.access_token).await.unwrap();
    assert_eq!(approval.milestones.len(), 1);
    assert_eq!(approval.milestones[0].milestone_type, MilestoneType::Full);
    assert_eq!(approval.milestones[0].amount_cents, 250_000);
    assert_eq!(*h.checkout.amounts.lock().unwrap(), vec![250_000]);
}

#[tokio::test]
async fn test_medium_lead_final_payment_due_a_week_before() {
    let h = setup().await;
    let (quote, invoice) = draft_invoice(&h.svc, 20, CustomerType::Standard, 1_000_000).await;
    h.svc.send_invoice(invoice.id).await.unwrap();

    let approval = h.svc.customer_approve(&invoice.access_token).await.unwrap();
    let ms = &approval.milestones;
    assert_eq!(ms[0].milestone_type, MilestoneType::Combined);
    assert_eq!(ms[0].amount_cents, 750_000);
    assert_eq!(ms[1].milestone_type, MilestoneType::Final);
    assert_eq!(ms[1].amount_cents, 250_000);
    assert_eq!(ms[1].due_date, Some(quote.event_date - Days::new(7)));
    assert!(quote.event_date > Utc::now().date_naive());
}
