//! Staff (Hub) invoice handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use hub_core::error::AppError;
use uuid::Uuid;

use crate::dtos::{CreateInvoiceRequest, InvoiceView};
use crate::models::CreateInvoice;
use crate::services::store::BillingStore;
use crate::startup::AppState;

/// Create a draft invoice.
pub async fn create_invoice(
    State(state): State<AppState>,
    Json(payload): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceView>), AppError> {
    let invoice = state
        .db
        .create_invoice(&CreateInvoice {
            client_id: payload.client_id,
            client_name: payload.client_name,
            client_email: payload.client_email,
            description: payload.description,
            total: payload.total,
            due_date: payload.due_date,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(InvoiceView::from_parts(&invoice, &[])),
    ))
}

/// Invoice detail with ledger-derived balances.
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceView>, AppError> {
    let invoice = state
        .db
        .invoice_by_id(invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    let records = state.db.payments_for_invoice(invoice.invoice_id).await?;

    Ok(Json(InvoiceView::from_parts(&invoice, &records)))
}

/// Dispatch a draft invoice to the client.
pub async fn send_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceView>, AppError> {
    let invoice = state
        .db
        .send_invoice(invoice_id, Utc::now().date_naive())
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    Ok(Json(InvoiceView::from_parts(&invoice, &[])))
}

/// Flip past-due sent invoices with money owing to overdue.
///
/// Driven by the external scheduler; the sweep itself is not part of the
/// payment flow.
pub async fn sweep_overdue(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let flipped = state
        .db
        .mark_overdue_invoices(Utc::now().date_naive())
        .await?;

    Ok(Json(serde_json::json!({ "marked_overdue": flipped })))
}

/// Cancel a draft or sent invoice.
pub async fn cancel_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceView>, AppError> {
    let invoice = state
        .db
        .cancel_invoice(invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    let records = state.db.payments_for_invoice(invoice.invoice_id).await?;

    Ok(Json(InvoiceView::from_parts(&invoice, &records)))
}
