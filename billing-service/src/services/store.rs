//! Storage seam for the billing flow.

use crate::models::{CreateInvoice, Invoice, InvoiceStatus, NewPayment, PaymentRecord};
use async_trait::async_trait;
use chrono::NaiveDate;
use hub_core::error::AppError;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Result of an atomic ledger append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The record was stored; `outstanding` and `status` reflect the
    /// post-append invoice state.
    Applied {
        outstanding: Decimal,
        status: InvoiceStatus,
    },
    /// A record with this gateway transaction id already exists; nothing
    /// was written.
    Duplicate,
}

/// Persistence operations for invoices and the payment ledger.
///
/// `append_payment` must enforce gateway-transaction-id uniqueness and the
/// paid-status flip atomically: concurrent deliveries of one notification
/// race to at most one stored record, and a crash can never separate a
/// zero-balance ledger from a Paid status.
#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn invoice_by_id(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError>;

    async fn invoice_by_token(&self, portal_token: &str) -> Result<Option<Invoice>, AppError>;

    async fn payments_for_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<PaymentRecord>, AppError>;

    /// Create a draft invoice.
    async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError>;

    /// Dispatch a draft invoice to the client (Draft -> Sent).
    async fn send_invoice(
        &self,
        invoice_id: Uuid,
        issue_date: NaiveDate,
    ) -> Result<Option<Invoice>, AppError>;

    /// Cancel a draft or sent invoice. Rejected once any payment exists.
    async fn cancel_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError>;

    /// Flip sent invoices past their due date with money still owing to
    /// Overdue. Called by the external scheduler, not by this service.
    async fn mark_overdue_invoices(&self, today: NaiveDate) -> Result<u64, AppError>;

    /// Append a ledger entry and recheck the invoice status in one
    /// transaction.
    async fn append_payment(&self, new: NewPayment) -> Result<AppendOutcome, AppError>;
}

#[async_trait]
impl<S: BillingStore + ?Sized> BillingStore for Arc<S> {
    async fn invoice_by_id(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        (**self).invoice_by_id(invoice_id).await
    }

    async fn invoice_by_token(&self, portal_token: &str) -> Result<Option<Invoice>, AppError> {
        (**self).invoice_by_token(portal_token).await
    }

    async fn payments_for_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<PaymentRecord>, AppError> {
        (**self).payments_for_invoice(invoice_id).await
    }

    async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError> {
        (**self).create_invoice(input).await
    }

    async fn send_invoice(
        &self,
        invoice_id: Uuid,
        issue_date: NaiveDate,
    ) -> Result<Option<Invoice>, AppError> {
        (**self).send_invoice(invoice_id, issue_date).await
    }

    async fn cancel_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        (**self).cancel_invoice(invoice_id).await
    }

    async fn mark_overdue_invoices(&self, today: NaiveDate) -> Result<u64, AppError> {
        (**self).mark_overdue_invoices(today).await
    }

    async fn append_payment(&self, new: NewPayment) -> Result<AppendOutcome, AppError> {
        (**self).append_payment(new).await
    }
}
