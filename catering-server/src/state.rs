//! Application state shared by the HTTP handlers and background jobs

use std::sync::Arc;

use aws_sdk_sesv2::Client as SesClient;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db::DbService;
use crate::email::{Notifier, SesMailer};
use crate::stripe::StripeCheckout;
use crate::workflow::WorkflowService;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    /// SQLite connection pool
    pub pool: SqlitePool,
    /// Workflow operations (owns the collaborators)
    pub workflow: WorkflowService,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
}

impl AppState {
    /// Open the database and wire SES + Stripe from the configuration
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let db = DbService::new(&config.database_path).await?;

        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let ses = if let Ok(ses_region) = std::env::var("SES_REGION") {
            let ses_config = aws_config
                .to_builder()
                .region(aws_config::Region::new(ses_region))
                .build();
            SesClient::new(&ses_config)
        } else {
            SesClient::new(&aws_config)
        };

        let notifier = Notifier::new(
            Arc::new(SesMailer::new(ses, config.ses_from_email.clone())),
            config.admin_email.clone(),
            config.portal_base_url.clone(),
        );
        let payments = Arc::new(StripeCheckout::new(config.stripe_secret_key.clone()));
        let workflow = WorkflowService::new(
            db.pool.clone(),
            notifier,
            payments,
            config.workflow.clone(),
        );

        Ok(Self::from_parts(workflow, config.stripe_webhook_secret.clone()))
    }

    /// State around an already wired workflow service
    pub fn from_parts(workflow: WorkflowService, stripe_webhook_secret: impl Into<String>) -> Self {
        Self {
            pool: workflow.pool().clone(),
            workflow,
            stripe_webhook_secret: stripe_webhook_secret.into(),
        }
    }
}
