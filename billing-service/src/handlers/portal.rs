//! Client portal handlers: invoice view and the pay action.
//!
//! Portal access is capability-based: whoever holds the invoice's portal
//! token may view and pay it. Routine failure cases (already paid,
//! cancelled, double click) fall back to the read-only view rather than
//! erroring.

use axum::{
    extract::{Path, State},
    response::Redirect,
    Json,
};
use hub_core::error::AppError;

use crate::dtos::InvoiceView;
use crate::services::checkout::{self, CheckoutOutcome};
use crate::services::metrics::CHECKOUTS_TOTAL;
use crate::services::store::BillingStore;
use crate::startup::AppState;

/// Read-only invoice view behind the portal capability token.
pub async fn view_invoice(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<InvoiceView>, AppError> {
    let invoice = state
        .db
        .invoice_by_token(&token)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    let records = state.db.payments_for_invoice(invoice.invoice_id).await?;

    Ok(Json(InvoiceView::from_parts(&invoice, &records)))
}

/// Start a gateway checkout for the invoice, or fall back to the view.
pub async fn pay_invoice(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Redirect, AppError> {
    let callbacks = state.portal_callbacks(&token);
    let outcome =
        checkout::initiate_payment(&state.db, &state.gateway, &callbacks, &token).await?;

    match outcome {
        CheckoutOutcome::RedirectToGateway(url) => {
            CHECKOUTS_TOTAL.with_label_values(&["gateway"]).inc();
            Ok(Redirect::to(url.as_str()))
        }
        CheckoutOutcome::RedirectToInvoice => {
            CHECKOUTS_TOTAL.with_label_values(&["portal_view"]).inc();
            Ok(Redirect::to(&format!("/portal/invoice/{}", token)))
        }
    }
}
