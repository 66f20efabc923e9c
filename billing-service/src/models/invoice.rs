//! Invoice model and status lifecycle.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Overdue,
    Paid,
    Cancelled,
}

/// A status change the invoice lifecycle does not allow. Reaching this from
/// a request handler means routing let something through that it should not
/// have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid invoice transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: InvoiceStatus,
    pub to: InvoiceStatus,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "sent" => InvoiceStatus::Sent,
            "overdue" => InvoiceStatus::Overdue,
            "paid" => InvoiceStatus::Paid,
            "cancelled" => InvoiceStatus::Cancelled,
            _ => InvoiceStatus::Draft,
        }
    }

    /// Paid and Cancelled accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }

    /// Only sent and overdue invoices may take payments or start a gateway
    /// checkout.
    pub fn accepts_payment(&self) -> bool {
        matches!(self, InvoiceStatus::Sent | InvoiceStatus::Overdue)
    }

    /// Validate a status change against the lifecycle.
    pub fn transition(self, to: InvoiceStatus) -> Result<InvoiceStatus, InvalidTransition> {
        use InvoiceStatus::*;
        match (self, to) {
            (Draft, Sent)
            | (Sent, Overdue)
            | (Sent, Paid)
            | (Overdue, Paid)
            | (Draft, Cancelled)
            | (Sent, Cancelled) => Ok(to),
            (from, to) => Err(InvalidTransition { from, to }),
        }
    }
}

/// Invoice row. The total is fixed once the invoice leaves draft; the paid
/// and outstanding views are always derived from the payment ledger, never
/// stored here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    /// Capability token for unauthenticated client access to the portal.
    pub portal_token: String,
    pub client_id: Uuid,
    pub client_name: String,
    pub client_email: Option<String>,
    pub description: Option<String>,
    pub total: Decimal,
    pub status: String,
    pub issue_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub created_utc: DateTime<Utc>,
    pub sent_utc: Option<DateTime<Utc>>,
    pub paid_utc: Option<DateTime<Utc>>,
    pub cancelled_utc: Option<DateTime<Utc>>,
}

impl Invoice {
    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }
}

/// Input for creating a draft invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub client_id: Uuid,
    pub client_name: String,
    pub client_email: Option<String>,
    pub description: Option<String>,
    pub total: Decimal,
    pub due_date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_transitions() {
        use InvoiceStatus::*;

        assert_eq!(Draft.transition(Sent), Ok(Sent));
        assert_eq!(Draft.transition(Cancelled), Ok(Cancelled));
        assert_eq!(Sent.transition(Cancelled), Ok(Cancelled));
    }

    #[test]
    fn test_payment_driven_transitions() {
        use InvoiceStatus::*;

        assert_eq!(Sent.transition(Overdue), Ok(Overdue));
        assert_eq!(Sent.transition(Paid), Ok(Paid));
        assert_eq!(Overdue.transition(Paid), Ok(Paid));
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        use InvoiceStatus::*;

        for to in [Draft, Sent, Overdue, Paid, Cancelled] {
            assert!(Paid.transition(to).is_err());
            assert!(Cancelled.transition(to).is_err());
        }
        assert!(Paid.is_terminal());
        assert!(Cancelled.is_terminal());
    }

    #[test]
    fn test_disallowed_transitions() {
        use InvoiceStatus::*;

        assert_eq!(
            Draft.transition(Paid),
            Err(InvalidTransition {
                from: Draft,
                to: Paid
            })
        );
        assert!(Draft.transition(Overdue).is_err());
        assert!(Overdue.transition(Cancelled).is_err());
        assert!(Overdue.transition(Sent).is_err());
        assert!(Sent.transition(Draft).is_err());
    }

    #[test]
    fn test_payment_eligibility() {
        use InvoiceStatus::*;

        assert!(Sent.accepts_payment());
        assert!(Overdue.accepts_payment());
        assert!(!Draft.accepts_payment());
        assert!(!Paid.accepts_payment());
        assert!(!Cancelled.accepts_payment());
    }

    #[test]
    fn test_status_string_mapping() {
        for status in [
            InvoiceStatus::Draft,
            InvoiceStatus::Sent,
            InvoiceStatus::Overdue,
            InvoiceStatus::Paid,
            InvoiceStatus::Cancelled,
        ] {
            assert_eq!(InvoiceStatus::from_string(status.as_str()), status);
        }
    }
}
