//! Data models
//!
//! Shared between catering-server and API consumers.
//! DB row types use `#[cfg_attr(feature = "db", derive(sqlx::FromRow))]`.
//! All IDs are `i64` snowflakes, money is `i64` cents, timestamps are Unix millis.

pub mod change_request;
pub mod invoice;
pub mod payment;
pub mod quote;

// Re-exports
pub use change_request::*;
pub use invoice::*;
pub use payment::*;
pub use quote::*;
