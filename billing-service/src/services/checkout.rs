//! Portal checkout flow: the "pay" action behind the client portal.

use crate::services::gateway::{CallbackUrls, GatewayClient, GatewayError};
use crate::services::ledger;
use crate::services::store::BillingStore;
use hub_core::error::AppError;
use rust_decimal::Decimal;
use url::Url;

/// Where the portal sends the client after a pay request.
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    /// Signed redirect to the external gateway.
    RedirectToGateway(Url),
    /// Back to the read-only invoice view. Routine for draft, cancelled,
    /// already-paid, or fully settled invoices (double clicks included).
    RedirectToInvoice,
}

/// Resolve a portal pay request to a redirect target.
///
/// Never mutates the ledger; the notification path is the only writer.
pub async fn initiate_payment<S: BillingStore>(
    store: &S,
    gateway: &GatewayClient,
    callbacks: &CallbackUrls,
    portal_token: &str,
) -> Result<CheckoutOutcome, AppError> {
    let invoice = store
        .invoice_by_token(portal_token)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    if !invoice.status().accepts_payment() {
        tracing::info!(
            invoice_id = %invoice.invoice_id,
            status = %invoice.status,
            "Pay request on a non-payable invoice; returning to the portal view"
        );
        return Ok(CheckoutOutcome::RedirectToInvoice);
    }

    let records = store.payments_for_invoice(invoice.invoice_id).await?;
    let outstanding = ledger::outstanding_balance(&invoice, &records);
    if outstanding <= Decimal::ZERO {
        tracing::info!(
            invoice_id = %invoice.invoice_id,
            "Invoice already settled; returning to the portal view"
        );
        return Ok(CheckoutOutcome::RedirectToInvoice);
    }

    match gateway.checkout_url(&invoice, outstanding, callbacks) {
        Ok(url) => Ok(CheckoutOutcome::RedirectToGateway(url)),
        Err(GatewayError::NotConfigured) => {
            tracing::error!(
                invoice_id = %invoice.invoice_id,
                "Payment gateway not configured; checkout unavailable"
            );
            Ok(CheckoutOutcome::RedirectToInvoice)
        }
        Err(e) => Err(AppError::InternalError(anyhow::anyhow!(e))),
    }
}
