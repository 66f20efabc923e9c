//! Outstanding-balance derivation over the payment ledger.
//!
//! The ledger is the single source of truth for how much of an invoice has
//! been settled. No paid or outstanding amount is ever cached; every caller
//! recomputes from the records.

use crate::models::{Invoice, PaymentRecord};
use rust_decimal::Decimal;
use thiserror::Error;

/// Ledger invariant violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("ledger amounts must be strictly positive")]
    NonPositiveAmount,
}

/// Total settled amount across `records` for `invoice`.
pub fn amount_paid(invoice: &Invoice, records: &[PaymentRecord]) -> Decimal {
    records
        .iter()
        .filter(|r| r.invoice_id == invoice.invoice_id)
        .map(|r| r.amount)
        .sum()
}

/// Remaining balance on `invoice`, clamped at zero.
///
/// A raw negative result means the ledger holds more than the invoice
/// total; that is reported as zero outstanding and logged as an overpayment
/// anomaly for manual review rather than silently absorbed.
pub fn outstanding_balance(invoice: &Invoice, records: &[PaymentRecord]) -> Decimal {
    let paid = amount_paid(invoice, records);
    let raw = invoice.total - paid;

    if raw < Decimal::ZERO {
        tracing::warn!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            total = %invoice.total,
            paid = %paid,
            "Ledger exceeds invoice total; reporting zero outstanding"
        );
        return Decimal::ZERO;
    }

    raw
}

/// Reject non-positive amounts before they reach the store.
pub fn validate_amount(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::NonPositiveAmount);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn invoice(total: &str) -> Invoice {
        Invoice {
            invoice_id: Uuid::new_v4(),
            invoice_number: "INV-001042".to_string(),
            portal_token: "t".repeat(40),
            client_id: Uuid::new_v4(),
            client_name: "Acme Studios".to_string(),
            client_email: None,
            description: None,
            total: dec(total),
            status: "sent".to_string(),
            issue_date: None,
            due_date: NaiveDate::from_ymd_opt(2026, 2, 5).unwrap(),
            created_utc: Utc::now(),
            sent_utc: None,
            paid_utc: None,
            cancelled_utc: None,
        }
    }

    fn record(invoice_id: Uuid, amount: &str) -> PaymentRecord {
        PaymentRecord {
            payment_id: Uuid::new_v4(),
            invoice_id,
            amount: dec(amount),
            gateway_transaction_id: Uuid::new_v4().to_string(),
            notification_fingerprint: "0".repeat(64),
            received_utc: Utc::now(),
        }
    }

    #[test]
    fn test_balance_with_no_payments_is_total() {
        let inv = invoice("1000.00");
        assert_eq!(outstanding_balance(&inv, &[]), dec("1000.00"));
    }

    #[test]
    fn test_partial_payments_reduce_balance() {
        let inv = invoice("1000.00");
        let records = vec![
            record(inv.invoice_id, "400.00"),
            record(inv.invoice_id, "250.00"),
        ];
        assert_eq!(amount_paid(&inv, &records), dec("650.00"));
        assert_eq!(outstanding_balance(&inv, &records), dec("350.00"));
    }

    #[test]
    fn test_other_invoices_records_are_ignored() {
        let inv = invoice("1000.00");
        let records = vec![
            record(inv.invoice_id, "400.00"),
            record(Uuid::new_v4(), "9999.00"),
        ];
        assert_eq!(outstanding_balance(&inv, &records), dec("600.00"));
    }

    #[test]
    fn test_exact_settlement_reaches_zero() {
        let inv = invoice("1000.00");
        let records = vec![
            record(inv.invoice_id, "400.00"),
            record(inv.invoice_id, "600.00"),
        ];
        assert_eq!(outstanding_balance(&inv, &records), Decimal::ZERO);
    }

    #[test]
    fn test_overpayment_clamps_to_zero() {
        let inv = invoice("500.00");
        let records = vec![record(inv.invoice_id, "500.01")];
        assert_eq!(outstanding_balance(&inv, &records), Decimal::ZERO);
    }

    #[test]
    fn test_amount_validation() {
        assert!(validate_amount(dec("0.01")).is_ok());
        assert_eq!(
            validate_amount(Decimal::ZERO),
            Err(LedgerError::NonPositiveAmount)
        );
        assert_eq!(
            validate_amount(dec("-10.00")),
            Err(LedgerError::NonPositiveAmount)
        );
    }
}
