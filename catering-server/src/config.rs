//! Server configuration
//!
//! Read once at startup from the environment (after `.env`). Business
//! parameters end up in [`WorkflowSettings`].

use rust_decimal::Decimal;

use crate::workflow::{ApprovalPolicy, SchedulePolicy, WorkflowSettings};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file
    pub database_path: String,
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    pub log_level: String,
    /// Daily rolling log files go here when set
    pub log_dir: Option<String>,
    pub log_json: bool,
    /// SES sender email address
    pub ses_from_email: String,
    /// Recipient of change requests that need review
    pub admin_email: String,
    /// Base URL of the customer portal (invoice links, checkout redirects)
    pub portal_base_url: String,
    /// Stripe secret key
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
    /// Seconds between overdue sweeps
    pub overdue_sweep_secs: u64,
    pub workflow: WorkflowSettings,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

/// Parse an optional variable; a present but malformed value is an error
fn env_parse<T>(name: &str, default: T) -> Result<T, BoxError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| format!("{name}={raw:?} is invalid: {e}").into()),
        _ => Ok(default),
    }
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = env_or("ENVIRONMENT", "development");

        let defaults = SchedulePolicy::default();
        let schedule = SchedulePolicy {
            long_lead_days: env_parse("LONG_LEAD_DAYS", defaults.long_lead_days)?,
            rush_days: env_parse("RUSH_DAYS", defaults.rush_days)?,
            deposit_percent: env_parse::<Decimal>("DEPOSIT_PERCENT", defaults.deposit_percent)?,
            combined_percent: env_parse::<Decimal>("COMBINED_PERCENT", defaults.combined_percent)?,
            balance_due_days_before_event: env_parse(
                "BALANCE_DUE_DAYS_BEFORE_EVENT",
                defaults.balance_due_days_before_event,
            )?,
            final_due_days_before_event: env_parse(
                "FINAL_DUE_DAYS_BEFORE_EVENT",
                defaults.final_due_days_before_event,
            )?,
            net_terms_days: env_parse("NET_TERMS_DAYS", defaults.net_terms_days)?,
        };
        validate_schedule(&schedule)?;

        let approval = ApprovalPolicy {
            per_guest_rate_cents: env_parse(
                "PER_GUEST_RATE_CENTS",
                ApprovalPolicy::default().per_guest_rate_cents,
            )?,
            ..ApprovalPolicy::default()
        };

        Ok(Self {
            database_path: env_or("DATABASE_PATH", "catering.db"),
            http_port: env_parse("HTTP_PORT", 8080)?,
            environment: environment.clone(),
            log_level: env_or("LOG_LEVEL", "info"),
            log_dir: std::env::var("LOG_DIR").ok().filter(|s| !s.is_empty()),
            log_json: env_parse("LOG_JSON", false)?,
            ses_from_email: env_or("SES_FROM_EMAIL", "events@example.com"),
            admin_email: env_or("ADMIN_EMAIL", "admin@example.com"),
            portal_base_url: env_or("PORTAL_BASE_URL", "http://localhost:5173"),
            stripe_secret_key: Self::require_secret("STRIPE_SECRET_KEY", &environment)?,
            stripe_webhook_secret: Self::require_secret("STRIPE_WEBHOOK_SECRET", &environment)?,
            overdue_sweep_secs: env_parse("OVERDUE_SWEEP_SECS", 3600)?,
            workflow: WorkflowSettings { schedule, approval },
        })
    }
}

fn validate_schedule(policy: &SchedulePolicy) -> Result<(), BoxError> {
    let hundred = Decimal::ONE_HUNDRED;
    for (name, pct) in [
        ("DEPOSIT_PERCENT", policy.deposit_percent),
        ("COMBINED_PERCENT", policy.combined_percent),
    ] {
        if pct <= Decimal::ZERO || pct >= hundred {
            return Err(format!("{name} must be between 0 and 100 (exclusive), got {pct}").into());
        }
    }
    if policy.rush_days > policy.long_lead_days {
        return Err(format!(
            "RUSH_DAYS ({}) must not exceed LONG_LEAD_DAYS ({})",
            policy.rush_days, policy.long_lead_days
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_is_valid() {
        assert!(validate_schedule(&SchedulePolicy::default()).is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_percent() {
        let policy = SchedulePolicy {
            deposit_percent: Decimal::from(100),
            ..SchedulePolicy::default()
        };
        assert!(validate_schedule(&policy).is_err());
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let policy = SchedulePolicy {
            rush_days: 45,
            ..SchedulePolicy::default()
        };
        assert!(validate_schedule(&policy).is_err());
    }
}
