//! Business services for billing-service.

pub mod checkout;
pub mod database;
pub mod gateway;
pub mod ledger;
pub mod metrics;
pub mod reconciler;
pub mod store;

pub use database::Database;
pub use gateway::{CallbackUrls, GatewayClient};
pub use reconciler::Reconciler;
