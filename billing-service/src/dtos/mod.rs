use crate::models::{Invoice, PaymentRecord};
use crate::services::ledger;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound gateway payment notification, in the gateway's native form
/// encoding. The signature travels alongside these fields and is checked
/// against the raw body before this type is ever constructed.
#[derive(Debug, Deserialize)]
pub struct PaymentNotification {
    /// Merchant payment identifier: the invoice id we handed the gateway.
    pub m_payment_id: String,
    /// The gateway's own transaction id.
    pub transaction_id: String,
    pub amount: Decimal,
}

/// Staff request to create a draft invoice.
#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub client_id: Uuid,
    pub client_name: String,
    pub client_email: Option<String>,
    pub description: Option<String>,
    pub total: Decimal,
    pub due_date: NaiveDate,
}

/// Invoice summary with balances derived from the ledger.
#[derive(Debug, Serialize)]
pub struct InvoiceView {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub status: String,
    pub client_name: String,
    pub description: Option<String>,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub outstanding: Decimal,
    pub issue_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
}

impl InvoiceView {
    pub fn from_parts(invoice: &Invoice, records: &[PaymentRecord]) -> Self {
        Self {
            invoice_id: invoice.invoice_id,
            invoice_number: invoice.invoice_number.clone(),
            status: invoice.status.clone(),
            client_name: invoice.client_name.clone(),
            description: invoice.description.clone(),
            total: invoice.total,
            amount_paid: ledger::amount_paid(invoice, records),
            outstanding: ledger::outstanding_balance(invoice, records),
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
        }
    }
}
