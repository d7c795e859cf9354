//! catering-server: quote-to-invoice workflow for a catering business
//!
//! - [`workflow`]: payment scheduling, waterfall, change-request approval,
//!   status reconciliation
//! - [`db`]: SQLite repositories
//! - [`email`] / [`stripe`]: outbound collaborators
//! - [`api`]: axum HTTP surface

pub mod api;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod logger;
pub mod state;
pub mod stripe;
pub mod validation;
pub mod workflow;

pub use error::{DownstreamError, WorkflowError, WorkflowResult};
pub use state::AppState;
pub use workflow::{WorkflowService, WorkflowSettings};
