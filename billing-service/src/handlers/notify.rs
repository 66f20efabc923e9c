//! Gateway notification webhook.

use axum::{extract::State, http::StatusCode};
use hub_core::error::AppError;

use crate::services::reconciler::{ReconcileError, ReconcileOutcome};
use crate::startup::AppState;

/// Receive a payment notification from the gateway.
///
/// The bare 200 acknowledgment is what stops the gateway's redelivery, so
/// verification and reconciliation failures must answer non-2xx. The
/// gateway retrying or flagging the delivery is the only safety net.
pub async fn gateway_notify(
    State(state): State<AppState>,
    body: String,
) -> Result<StatusCode, AppError> {
    match state.reconciler.process(&body).await {
        Ok(ReconcileOutcome::Applied { paid }) => {
            if paid {
                tracing::info!("Invoice settled in full");
            }
            Ok(StatusCode::OK)
        }
        Ok(ReconcileOutcome::Duplicate) => Ok(StatusCode::OK),
        Err(ReconcileError::InvalidSignature) => Err(AppError::Unauthorized(anyhow::anyhow!(
            "Invalid notification signature"
        ))),
        Err(ReconcileError::MalformedPayload(msg)) => Err(AppError::BadRequest(anyhow::anyhow!(
            "Invalid notification payload: {}",
            msg
        ))),
        Err(e @ ReconcileError::UnknownInvoice { .. }) => {
            Err(AppError::NotFound(anyhow::anyhow!(e)))
        }
        Err(e @ ReconcileError::AmountMismatch { .. }) => {
            Err(AppError::BadRequest(anyhow::anyhow!(e)))
        }
        Err(ReconcileError::Store(e)) => Err(e),
    }
}
