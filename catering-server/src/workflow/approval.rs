//! Auto-approval rule engine
//!
//! Pure: no I/O, `now` passed in. The request is classified by the set of
//! change kinds it carries, then the matching rule decides.
//!
//! | kinds                       | rule                                   |
//! |-----------------------------|----------------------------------------|
//! | menu                        | N-for-N swap of selected items, N <= 3 |
//! | guest count                 | <= 10% and <= 15 guests                |
//! | date (with or without time) | old and new start both > 48h away      |
//! | time                        | always                                 |
//! | location                    | never (travel fee review)              |
//! | anything else               | never                                  |

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::models::{Change, ChangeKind, MenuSelection, Quote, RequestedChanges};

/// Approval thresholds
#[derive(Debug, Clone)]
pub struct ApprovalPolicy {
    /// Flat per-guest price used for guest count cost impact
    pub per_guest_rate_cents: i64,
    /// Relative guest count change allowed (percent of the original)
    pub max_guest_change_percent: i64,
    /// Absolute guest count change allowed
    pub max_guest_change: i64,
    /// Both event starts must be further away than this
    pub min_notice_hours: i64,
    /// Largest menu swap approved without review
    pub max_menu_substitutions: usize,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            per_guest_rate_cents: 4_500,
            max_guest_change_percent: 10,
            max_guest_change: 15,
            min_notice_hours: 48,
            max_menu_substitutions: 3,
        }
    }
}

/// Which rule produced the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalRule {
    MenuSubstitution,
    GuestCount,
    DateChange,
    TimeOnly,
    LocationOnly,
    Complex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalDecision {
    pub auto_approve: bool,
    pub rule: ApprovalRule,
    pub reason: String,
    /// Signed price impact when it can be determined
    pub cost_impact_cents: Option<i64>,
}

impl ApprovalDecision {
    fn approve(rule: ApprovalRule, reason: impl Into<String>, cost: i64) -> Self {
        Self {
            auto_approve: true,
            rule,
            reason: reason.into(),
            cost_impact_cents: Some(cost),
        }
    }

    fn review(rule: ApprovalRule, reason: impl Into<String>, cost: Option<i64>) -> Self {
        Self {
            auto_approve: false,
            rule,
            reason: reason.into(),
            cost_impact_cents: cost,
        }
    }
}

/// Decide whether a change request can be approved without review
pub fn evaluate_auto_approval(
    changes: &RequestedChanges,
    quote: &Quote,
    now: DateTime<Utc>,
    policy: &ApprovalPolicy,
) -> ApprovalDecision {
    let kinds = changes.kinds();
    let only = |set: &[ChangeKind]| kinds == set.iter().copied().collect::<HashSet<_>>();

    if only(&[ChangeKind::Menu]) {
        if let Some(Change::Menu { removed, added }) = changes.find(ChangeKind::Menu) {
            return menu_rule(removed, added, &quote.menu_selections, policy);
        }
    } else if only(&[ChangeKind::GuestCount]) {
        if let Some(Change::GuestCount { new_guest_count }) = changes.find(ChangeKind::GuestCount)
        {
            return guest_rule(quote.guest_count, *new_guest_count, policy);
        }
    } else if only(&[ChangeKind::EventDate]) || only(&[ChangeKind::EventDate, ChangeKind::EventTime])
    {
        if let Some(Change::EventDate { new_date }) = changes.find(ChangeKind::EventDate) {
            let new_time = match changes.find(ChangeKind::EventTime) {
                Some(Change::EventTime { new_time }) => Some(*new_time),
                _ => quote.event_time,
            };
            return date_rule(
                event_start(quote.event_date, quote.event_time),
                event_start(*new_date, new_time),
                now,
                policy,
            );
        }
    } else if only(&[ChangeKind::EventTime]) {
        return ApprovalDecision::approve(ApprovalRule::TimeOnly, "Time-only change", 0);
    } else if only(&[ChangeKind::Location]) {
        return ApprovalDecision::review(
            ApprovalRule::LocationOnly,
            "Location changes require travel fee review",
            None,
        );
    }

    ApprovalDecision::review(
        ApprovalRule::Complex,
        "Multiple or complex changes require manual review",
        None,
    )
}

fn menu_rule(
    removed: &[MenuSelection],
    added: &[MenuSelection],
    current: &[MenuSelection],
    policy: &ApprovalPolicy,
) -> ApprovalDecision {
    let missing = removed.iter().filter(|s| !current.contains(s)).count();
    if missing > 0 {
        return ApprovalDecision::review(
            ApprovalRule::MenuSubstitution,
            format!("Menu change removes {missing} item(s) not on the quote"),
            None,
        );
    }
    let (removed, added) = (removed.len(), added.len());
    if removed == added && (1..=policy.max_menu_substitutions).contains(&removed) {
        ApprovalDecision::approve(
            ApprovalRule::MenuSubstitution,
            format!("Menu substitution of {removed} item(s)"),
            0,
        )
    } else if removed == added {
        ApprovalDecision::review(
            ApprovalRule::MenuSubstitution,
            format!(
                "Menu substitution of {removed} items exceeds the limit of {}",
                policy.max_menu_substitutions
            ),
            None,
        )
    } else {
        ApprovalDecision::review(
            ApprovalRule::MenuSubstitution,
            format!("Menu change removes {removed} and adds {added} item(s); pricing review needed"),
            None,
        )
    }
}

fn guest_rule(original: i32, requested: i32, policy: &ApprovalPolicy) -> ApprovalDecision {
    if original <= 0 {
        return ApprovalDecision::review(
            ApprovalRule::GuestCount,
            format!("Original guest count {original} is not usable for comparison"),
            None,
        );
    }

    let diff = i64::from(requested) - i64::from(original);
    let abs = diff.abs();
    let cost = diff * policy.per_guest_rate_cents;
    // Integer comparison keeps the 10% boundary exact
    let within_percent = abs * 100 <= i64::from(original) * policy.max_guest_change_percent;
    let within_count = abs <= policy.max_guest_change;
    let percent = (Decimal::from(abs * 100) / Decimal::from(original)).round_dp(2);

    if within_percent && within_count {
        ApprovalDecision::approve(
            ApprovalRule::GuestCount,
            format!("Guest count change of {diff:+} ({percent}%) is within limits"),
            cost,
        )
    } else if !within_percent {
        ApprovalDecision::review(
            ApprovalRule::GuestCount,
            format!(
                "Guest count change of {percent}% exceeds the {}% limit",
                policy.max_guest_change_percent
            ),
            Some(cost),
        )
    } else {
        ApprovalDecision::review(
            ApprovalRule::GuestCount,
            format!(
                "Guest count change of {abs} guests exceeds the limit of {}",
                policy.max_guest_change
            ),
            Some(cost),
        )
    }
}

fn date_rule(
    original_start: DateTime<Utc>,
    new_start: DateTime<Utc>,
    now: DateTime<Utc>,
    policy: &ApprovalPolicy,
) -> ApprovalDecision {
    let notice = TimeDelta::hours(policy.min_notice_hours);
    if original_start - now > notice && new_start - now > notice {
        ApprovalDecision::approve(
            ApprovalRule::DateChange,
            format!("Date change with more than {}h notice", policy.min_notice_hours),
            0,
        )
    } else {
        ApprovalDecision::review(
            ApprovalRule::DateChange,
            format!(
                "Date changes within {}h of the event require manual review",
                policy.min_notice_hours
            ),
            None,
        )
    }
}

/// Event start in UTC; an event without a time starts at midnight
pub fn event_start(date: NaiveDate, time: Option<NaiveTime>) -> DateTime<Utc> {
    date.and_time(time.unwrap_or(NaiveTime::MIN)).and_utc()
}
