//! Payment ledger entry model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A settled gateway payment applied to an invoice. Ledger rows are
/// append-only: nothing updates or deletes them once written.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentRecord {
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    /// The gateway's transaction id. Unique across the ledger; redelivered
    /// notifications resolve to the record that already carries it.
    pub gateway_transaction_id: String,
    /// SHA-256 hex of the verified notification payload, kept for audit.
    pub notification_fingerprint: String,
    pub received_utc: DateTime<Utc>,
}

/// Input for appending a ledger entry.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub gateway_transaction_id: String,
    pub notification_fingerprint: String,
}
