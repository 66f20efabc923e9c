//! Gateway notification reconciler.
//!
//! The sole trusted path by which the payment ledger learns about settled
//! payments. Verifies authenticity, deduplicates redeliveries, validates the
//! notified amount against the outstanding balance, then applies the record
//! and drives the invoice status. Success is acknowledged only after the
//! append commits; the gateway's own redelivery is the retry layer for
//! everything that answers non-2xx.

use crate::dtos::PaymentNotification;
use crate::models::{InvoiceStatus, NewPayment};
use crate::services::gateway::GatewayClient;
use crate::services::ledger;
use crate::services::metrics::NOTIFICATIONS_TOTAL;
use crate::services::store::{AppendOutcome, BillingStore};
use hub_core::error::AppError;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::form_urlencoded;
use uuid::Uuid;

/// Absolute tolerance between the notified amount and the outstanding
/// balance. Covers gateway-side rounding of the two-decimal wire format.
const AMOUNT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("notification payload is malformed: {0}")]
    MalformedPayload(String),

    #[error("notification signature is invalid")]
    InvalidSignature,

    #[error("no invoice matches merchant payment id {m_payment_id}")]
    UnknownInvoice { m_payment_id: String },

    #[error("notified amount {notified} does not reconcile against outstanding balance {outstanding}")]
    AmountMismatch {
        notified: Decimal,
        outstanding: Decimal,
    },

    #[error(transparent)]
    Store(#[from] AppError),
}

/// Result of a successfully acknowledged notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The ledger gained a record; `paid` reports whether the invoice
    /// settled in full.
    Applied { paid: bool },
    /// Redelivery of an already-applied transaction, acknowledged without a
    /// second record.
    Duplicate,
}

#[derive(Clone)]
pub struct Reconciler<S> {
    store: S,
    gateway: GatewayClient,
}

impl<S: BillingStore> Reconciler<S> {
    pub fn new(store: S, gateway: GatewayClient) -> Self {
        Self { store, gateway }
    }

    /// Process a raw notification body in the gateway's native urlencoded
    /// encoding. `Ok` is the only outcome that warrants a success
    /// acknowledgment to the gateway.
    pub async fn process(&self, raw_body: &str) -> Result<ReconcileOutcome, ReconcileError> {
        // Field order matters for the signature, so the parse must preserve it.
        let pairs: Vec<(String, String)> = form_urlencoded::parse(raw_body.as_bytes())
            .into_owned()
            .collect();

        let signature = pairs
            .iter()
            .find(|(key, _)| key == "signature")
            .map(|(_, value)| value.clone())
            .ok_or_else(|| {
                tracing::warn!("Gateway notification without a signature field");
                NOTIFICATIONS_TOTAL
                    .with_label_values(&["invalid_signature"])
                    .inc();
                ReconcileError::InvalidSignature
            })?;

        let signed_fields: Vec<(String, String)> = pairs
            .iter()
            .filter(|(key, _)| key != "signature")
            .cloned()
            .collect();

        let valid = self
            .gateway
            .verify_notification(&signed_fields, &signature)
            .map_err(|e| {
                tracing::error!(error = %e, "Notification signature verification errored");
                ReconcileError::InvalidSignature
            })?;
        if !valid {
            tracing::warn!("Gateway notification failed signature verification");
            NOTIFICATIONS_TOTAL
                .with_label_values(&["invalid_signature"])
                .inc();
            return Err(ReconcileError::InvalidSignature);
        }

        let notification: PaymentNotification =
            serde_urlencoded::from_str(raw_body).map_err(|e| {
                NOTIFICATIONS_TOTAL.with_label_values(&["malformed"]).inc();
                ReconcileError::MalformedPayload(e.to_string())
            })?;

        let invoice = match notification.m_payment_id.parse::<Uuid>() {
            Ok(invoice_id) => self.store.invoice_by_id(invoice_id).await?,
            Err(_) => None,
        };
        let invoice = invoice.ok_or_else(|| {
            tracing::warn!(
                m_payment_id = %notification.m_payment_id,
                transaction_id = %notification.transaction_id,
                "Notification references an unknown invoice"
            );
            NOTIFICATIONS_TOTAL
                .with_label_values(&["unknown_invoice"])
                .inc();
            ReconcileError::UnknownInvoice {
                m_payment_id: notification.m_payment_id.clone(),
            }
        })?;

        let fingerprint = hex::encode(Sha256::digest(raw_body.as_bytes()));

        let records = self.store.payments_for_invoice(invoice.invoice_id).await?;
        if records
            .iter()
            .any(|r| r.gateway_transaction_id == notification.transaction_id)
        {
            tracing::info!(
                invoice_id = %invoice.invoice_id,
                transaction_id = %notification.transaction_id,
                "Duplicate gateway notification; acknowledging without a new record"
            );
            NOTIFICATIONS_TOTAL.with_label_values(&["duplicate"]).inc();
            return Ok(ReconcileOutcome::Duplicate);
        }

        let outstanding = ledger::outstanding_balance(&invoice, &records);
        if notification.amount <= Decimal::ZERO
            || notification.amount > outstanding + AMOUNT_TOLERANCE
        {
            tracing::warn!(
                invoice_id = %invoice.invoice_id,
                transaction_id = %notification.transaction_id,
                notified = %notification.amount,
                outstanding = %outstanding,
                "Notification amount does not reconcile; flagged for manual review"
            );
            NOTIFICATIONS_TOTAL
                .with_label_values(&["amount_mismatch"])
                .inc();
            return Err(ReconcileError::AmountMismatch {
                notified: notification.amount,
                outstanding,
            });
        }

        // The store enforces transaction-id uniqueness atomically, so a
        // concurrent redelivery that slipped past the read above still
        // resolves to at most one stored record.
        let outcome = self
            .store
            .append_payment(NewPayment {
                invoice_id: invoice.invoice_id,
                amount: notification.amount,
                gateway_transaction_id: notification.transaction_id.clone(),
                notification_fingerprint: fingerprint,
            })
            .await?;

        match outcome {
            AppendOutcome::Applied {
                outstanding,
                status,
            } => {
                let paid = status == InvoiceStatus::Paid;
                tracing::info!(
                    invoice_id = %invoice.invoice_id,
                    transaction_id = %notification.transaction_id,
                    amount = %notification.amount,
                    outstanding = %outstanding,
                    paid = paid,
                    "Payment reconciled"
                );
                NOTIFICATIONS_TOTAL.with_label_values(&["applied"]).inc();
                Ok(ReconcileOutcome::Applied { paid })
            }
            AppendOutcome::Duplicate => {
                tracing::info!(
                    invoice_id = %invoice.invoice_id,
                    transaction_id = %notification.transaction_id,
                    "Lost the append race to a concurrent delivery; acknowledging"
                );
                NOTIFICATIONS_TOTAL.with_label_values(&["duplicate"]).inc();
                Ok(ReconcileOutcome::Duplicate)
            }
        }
    }
}
