//! Payment milestone scheduler
//!
//! Lead time (days from `now` to the event) picks the schedule shape:
//!
//! | lead time                 | schedule                                   |
//! |---------------------------|--------------------------------------------|
//! | `>= long_lead_days`       | deposit now + balance before the event     |
//! | `rush_days..long_lead`    | combined payment now + final before event  |
//! | `< rush_days` (or past)   | full payment now                           |
//! | government customer       | single Net-30 after the event              |
//!
//! Amounts are floored per milestone; the final milestone takes the
//! remainder so the schedule always sums to the invoice total exactly.

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use shared::models::{CustomerType, MilestoneType};

use crate::db::milestones::NewMilestone;

/// Schedule thresholds and splits
#[derive(Debug, Clone)]
pub struct SchedulePolicy {
    /// At or beyond this lead time a small deposit is enough
    pub long_lead_days: i64,
    /// Below this lead time the booking is a rush and is paid in full
    pub rush_days: i64,
    /// Up-front share on long lead bookings (percent)
    pub deposit_percent: Decimal,
    /// Up-front share on medium lead bookings (percent)
    pub combined_percent: Decimal,
    /// Balance due this many days before the event (long lead)
    pub balance_due_days_before_event: u64,
    /// Final payment due this many days before the event (medium lead)
    pub final_due_days_before_event: u64,
    /// Government net terms after the event
    pub net_terms_days: u64,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            long_lead_days: 30,
            rush_days: 14,
            deposit_percent: Decimal::from(40),
            combined_percent: Decimal::from(75),
            balance_due_days_before_event: 14,
            final_due_days_before_event: 7,
            net_terms_days: 30,
        }
    }
}

/// When a milestone falls due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DueMarker {
    Now,
    OnDate(NaiveDate),
    /// Days after the event date
    AfterEvent(u64),
}

/// One entry of a schedule before amounts are assigned
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRule {
    pub milestone_type: MilestoneType,
    pub description: String,
    /// Share of the total in percent
    pub percentage: Decimal,
    pub due: DueMarker,
}

/// A rule with its amount and concrete due date
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledMilestone {
    pub rule: PaymentRule,
    pub amount_cents: i64,
    /// `None` means due now
    pub due_date: Option<NaiveDate>,
}

impl ScheduledMilestone {
    pub fn to_new_milestone(&self, sort_order: i32) -> NewMilestone {
        let bps = (self.rule.percentage * Decimal::ONE_HUNDRED)
            .round()
            .to_i64()
            .unwrap_or(0);
        NewMilestone {
            milestone_type: self.rule.milestone_type,
            description: self.rule.description.clone(),
            percentage_bps: bps,
            amount_cents: self.amount_cents,
            due_date: self.due_date,
            sort_order,
        }
    }
}

/// Days from `now` (UTC date) until the event; negative for past events
pub fn lead_days(event_date: NaiveDate, now: DateTime<Utc>) -> i64 {
    (event_date - now.date_naive()).num_days()
}

/// Schedule shape for a booking, without amounts
pub fn payment_rules(
    event_date: NaiveDate,
    now: DateTime<Utc>,
    customer_type: CustomerType,
    policy: &SchedulePolicy,
) -> Vec<PaymentRule> {
    if customer_type == CustomerType::Government {
        return vec![PaymentRule {
            milestone_type: MilestoneType::Net30,
            description: format!("Net {} after event", policy.net_terms_days),
            percentage: Decimal::ONE_HUNDRED,
            due: DueMarker::AfterEvent(policy.net_terms_days),
        }];
    }

    let lead = lead_days(event_date, now);
    if lead >= policy.long_lead_days {
        let balance_due = event_date
            .checked_sub_days(Days::new(policy.balance_due_days_before_event))
            .unwrap_or(event_date);
        vec![
            PaymentRule {
                milestone_type: MilestoneType::Deposit,
                description: format!("{}% deposit to reserve the date", policy.deposit_percent),
                percentage: policy.deposit_percent,
                due: DueMarker::Now,
            },
            PaymentRule {
                milestone_type: MilestoneType::Balance,
                description: format!(
                    "Balance due {} days before the event",
                    policy.balance_due_days_before_event
                ),
                percentage: Decimal::ONE_HUNDRED - policy.deposit_percent,
                due: DueMarker::OnDate(balance_due),
            },
        ]
    } else if lead >= policy.rush_days {
        let final_due = event_date
            .checked_sub_days(Days::new(policy.final_due_days_before_event))
            .unwrap_or(event_date);
        vec![
            PaymentRule {
                milestone_type: MilestoneType::Combined,
                description: format!("{}% combined deposit", policy.combined_percent),
                percentage: policy.combined_percent,
                due: DueMarker::Now,
            },
            PaymentRule {
                milestone_type: MilestoneType::Final,
                description: format!(
                    "Final payment due {} days before the event",
                    policy.final_due_days_before_event
                ),
                percentage: Decimal::ONE_HUNDRED - policy.combined_percent,
                due: DueMarker::OnDate(final_due),
            },
        ]
    } else {
        vec![PaymentRule {
            milestone_type: MilestoneType::Full,
            description: "Full payment due now (rush booking)".to_string(),
            percentage: Decimal::ONE_HUNDRED,
            due: DueMarker::Now,
        }]
    }
}

/// Full schedule with amounts. Empty when there is nothing to collect.
pub fn generate_schedule(
    total_amount_cents: i64,
    event_date: NaiveDate,
    now: DateTime<Utc>,
    customer_type: CustomerType,
    policy: &SchedulePolicy,
) -> Vec<ScheduledMilestone> {
    if total_amount_cents <= 0 {
        return Vec::new();
    }

    let rules = payment_rules(event_date, now, customer_type, policy);
    let last = rules.len().saturating_sub(1);
    let total = Decimal::from(total_amount_cents);
    let mut allocated = 0i64;

    rules
        .into_iter()
        .enumerate()
        .map(|(i, rule)| {
            let amount_cents = if i == last {
                total_amount_cents - allocated
            } else {
                (total * rule.percentage / Decimal::ONE_HUNDRED)
                    .floor()
                    .to_i64()
                    .unwrap_or(0)
            };
            allocated += amount_cents;
            let due_date = match rule.due {
                DueMarker::Now => None,
                DueMarker::OnDate(date) => Some(date),
                DueMarker::AfterEvent(days) => event_date.checked_add_days(Days::new(days)),
            };
            ScheduledMilestone {
                rule,
                amount_cents,
                due_date,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 15, 0, 0).unwrap()
    }

    fn days_out(days: u64) -> NaiveDate {
        now().date_naive().checked_add_days(Days::new(days)).unwrap()
    }

    fn sum(schedule: &[ScheduledMilestone]) -> i64 {
        schedule.iter().map(|m| m.amount_cents).sum()
    }

    #[test]
    fn test_long_lead_deposit_and_balance() {
        let policy = SchedulePolicy::default();
        let event = days_out(60);
        let schedule = generate_schedule(1_000_000, event, now(), CustomerType::Standard, &policy);

        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule[0].rule.milestone_type, MilestoneType::Deposit);
        assert_eq!(schedule[0].amount_cents, 400_000);
        assert_eq!(schedule[0].due_date, None);
        assert_eq!(schedule[1].rule.milestone_type, MilestoneType::Balance);
        assert_eq!(schedule[1].amount_cents, 600_000);
        assert_eq!(schedule[1].due_date, Some(days_out(46)));
        assert_eq!(sum(&schedule), 1_000_000);
    }

    #[test]
    fn test_lead_time_boundaries() {
        let policy = SchedulePolicy::default();
        let shape = |days| {
            payment_rules(days_out(days), now(), CustomerType::Standard, &policy)
                .into_iter()
                .map(|r| r.milestone_type)
                .collect::<Vec<_>>()
        };
        assert_eq!(shape(30), vec![MilestoneType::Deposit, MilestoneType::Balance]);
        assert_eq!(shape(29), vec![MilestoneType::Combined, MilestoneType::Final]);
        assert_eq!(shape(14), vec![MilestoneType::Combined, MilestoneType::Final]);
        assert_eq!(shape(13), vec![MilestoneType::Full]);
        assert_eq!(shape(0), vec![MilestoneType::Full]);
    }

    #[test]
    fn test_past_event_is_rush() {
        let policy = SchedulePolicy::default();
        let past = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        let schedule = generate_schedule(50_000, past, now(), CustomerType::Standard, &policy);
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule[0].rule.milestone_type, MilestoneType::Full);
        assert_eq!(schedule[0].amount_cents, 50_000);
    }

    #[test]
    fn test_government_single_net30_regardless_of_lead() {
        let policy = SchedulePolicy::default();
        for days in [2, 20, 90] {
            let event = days_out(days);
            let schedule =
                generate_schedule(1_000_000, event, now(), CustomerType::Government, &policy);
            assert_eq!(schedule.len(), 1);
            assert_eq!(schedule[0].rule.milestone_type, MilestoneType::Net30);
            assert_eq!(schedule[0].amount_cents, 1_000_000);
            assert_eq!(schedule[0].due_date, Some(days_out(days + 30)));
        }
    }

    #[test]
    fn test_remainder_goes_to_final_milestone() {
        let policy = SchedulePolicy::default();
        // 75% of 999 = 749.25 -> 749, final takes 250
        let schedule = generate_schedule(999, days_out(20), now(), CustomerType::Standard, &policy);
        assert_eq!(schedule[0].amount_cents, 749);
        assert_eq!(schedule[1].amount_cents, 250);

        // 40% of 1 = 0.4 -> 0, balance takes everything
        let schedule = generate_schedule(1, days_out(45), now(), CustomerType::Standard, &policy);
        assert_eq!(schedule[0].amount_cents, 0);
        assert_eq!(schedule[1].amount_cents, 1);
    }

    #[test]
    fn test_sum_invariant_across_inputs() {
        let policy = SchedulePolicy::default();
        for total in [1, 3, 7, 99, 1_001, 123_457, 1_000_000, 9_999_999] {
            for days in [0, 5, 13, 14, 21, 29, 30, 31, 200] {
                for customer in [CustomerType::Standard, CustomerType::Government] {
                    let schedule = generate_schedule(total, days_out(days), now(), customer, &policy);
                    assert_eq!(sum(&schedule), total, "total={total} days={days}");
                    let pct: Decimal = schedule.iter().map(|m| m.rule.percentage).sum();
                    assert_eq!(pct, Decimal::ONE_HUNDRED);
                }
            }
        }
    }

    #[test]
    fn test_non_positive_total_is_empty() {
        let policy = SchedulePolicy::default();
        assert!(generate_schedule(0, days_out(60), now(), CustomerType::Standard, &policy).is_empty());
        assert!(generate_schedule(-5, days_out(60), now(), CustomerType::Government, &policy).is_empty());
    }

    #[test]
    fn test_custom_policy_thresholds() {
        let policy = SchedulePolicy {
            long_lead_days: 60,
            deposit_percent: Decimal::from(25),
            ..SchedulePolicy::default()
        };
        let rules = payment_rules(days_out(45), now(), CustomerType::Standard, &policy);
        assert_eq!(rules[0].milestone_type, MilestoneType::Combined);

        let schedule = generate_schedule(10_000, days_out(90), now(), CustomerType::Standard, &policy);
        assert_eq!(schedule[0].amount_cents, 2_500);
        assert_eq!(schedule[1].amount_cents, 7_500);
    }

    #[test]
    fn test_to_new_milestone_basis_points() {
        let policy = SchedulePolicy::default();
        let schedule = generate_schedule(1_000_000, days_out(60), now(), CustomerType::Standard, &policy);
        let row = schedule[0].to_new_milestone(0);
        assert_eq!(row.percentage_bps, 4_000);
        assert_eq!(row.amount_cents, 400_000);
        assert_eq!(row.due_date, None);
    }
}
