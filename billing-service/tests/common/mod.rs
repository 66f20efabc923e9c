//! Shared test support: in-memory store and fixtures.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use billing_service::config::GatewayConfig;
use billing_service::models::{CreateInvoice, Invoice, InvoiceStatus, NewPayment, PaymentRecord};
use billing_service::services::gateway::{GatewayClient, GatewaySigner, HmacSigner};
use billing_service::services::ledger;
use billing_service::services::store::{AppendOutcome, BillingStore};
use chrono::{NaiveDate, Utc};
use hub_core::error::AppError;
use rust_decimal::Decimal;
use secrecy::Secret;
use uuid::Uuid;

pub const TEST_MERCHANT_KEY: &str = "test-merchant-key";

pub fn test_gateway_config() -> GatewayConfig {
    GatewayConfig {
        merchant_id: "merchant-001".to_string(),
        merchant_key: Secret::new(TEST_MERCHANT_KEY.to_string()),
        process_url: "https://gateway.example.com/pay".to_string(),
    }
}

pub fn test_gateway() -> GatewayClient {
    GatewayClient::new(test_gateway_config())
}

pub fn dec(s: &str) -> Decimal {
    s.parse().expect("bad decimal literal")
}

pub fn invoice_with_status(total: &str, status: InvoiceStatus) -> Invoice {
    let invoice_id = Uuid::new_v4();
    Invoice {
        invoice_id,
        invoice_number: format!("INV-{:06}", 1000),
        portal_token: format!("tok{}", invoice_id.simple()),
        client_id: Uuid::new_v4(),
        client_name: "Acme Studios".to_string(),
        client_email: Some("billing@acme.example".to_string()),
        description: Some("Monthly retainer".to_string()),
        total: dec(total),
        status: status.as_str().to_string(),
        issue_date: Some(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()),
        due_date: NaiveDate::from_ymd_opt(2026, 2, 5).unwrap(),
        created_utc: Utc::now(),
        sent_utc: Some(Utc::now()),
        paid_utc: None,
        cancelled_utc: None,
    }
}

pub fn sent_invoice(total: &str) -> Invoice {
    invoice_with_status(total, InvoiceStatus::Sent)
}

/// Build a signed, urlencoded notification body the way the gateway would.
pub fn signed_notification(invoice: &Invoice, transaction_id: &str, amount: &str) -> String {
    notification_for_payment_id(&invoice.invoice_id.to_string(), transaction_id, amount)
}

pub fn notification_for_payment_id(
    m_payment_id: &str,
    transaction_id: &str,
    amount: &str,
) -> String {
    let fields: Vec<(String, String)> = vec![
        ("m_payment_id".to_string(), m_payment_id.to_string()),
        ("transaction_id".to_string(), transaction_id.to_string()),
        ("amount".to_string(), amount.to_string()),
    ];

    let signer = HmacSigner::new(Secret::new(TEST_MERCHANT_KEY.to_string()));
    let signature = signer.sign(&fields).expect("failed to sign notification");

    let mut pairs = fields;
    pairs.push(("signature".to_string(), signature));
    serde_urlencoded::to_string(&pairs).expect("failed to encode notification")
}

/// In-memory `BillingStore`. The duplicate check and the insert in
/// `append_payment` happen under one lock, matching the atomicity the
/// Postgres store gets from its unique constraint and transaction.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    invoices: HashMap<Uuid, Invoice>,
    payments: Vec<PaymentRecord>,
    next_number: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_invoice(invoice: Invoice) -> Self {
        let store = Self::new();
        store.insert_invoice(invoice);
        store
    }

    pub fn insert_invoice(&self, invoice: Invoice) {
        self.state
            .lock()
            .unwrap()
            .invoices
            .insert(invoice.invoice_id, invoice);
    }

    pub fn payment_count(&self) -> usize {
        self.state.lock().unwrap().payments.len()
    }

    pub fn invoice(&self, invoice_id: Uuid) -> Invoice {
        self.state.lock().unwrap().invoices[&invoice_id].clone()
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn invoice_by_id(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        Ok(self.state.lock().unwrap().invoices.get(&invoice_id).cloned())
    }

    async fn invoice_by_token(&self, portal_token: &str) -> Result<Option<Invoice>, AppError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .invoices
            .values()
            .find(|i| i.portal_token == portal_token)
            .cloned())
    }

    async fn payments_for_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<PaymentRecord>, AppError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .payments
            .iter()
            .filter(|p| p.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError> {
        ledger::validate_amount(input.total)
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

        let mut state = self.state.lock().unwrap();
        state.next_number += 1;
        let invoice_id = Uuid::new_v4();
        let invoice = Invoice {
            invoice_id,
            invoice_number: format!("INV-{:06}", 1000 + state.next_number),
            portal_token: format!("tok{}", invoice_id.simple()),
            client_id: input.client_id,
            client_name: input.client_name.clone(),
            client_email: input.client_email.clone(),
            description: input.description.clone(),
            total: input.total,
            status: InvoiceStatus::Draft.as_str().to_string(),
            issue_date: None,
            due_date: input.due_date,
            created_utc: Utc::now(),
            sent_utc: None,
            paid_utc: None,
            cancelled_utc: None,
        };
        state.invoices.insert(invoice_id, invoice.clone());
        Ok(invoice)
    }

    async fn send_invoice(
        &self,
        invoice_id: Uuid,
        issue_date: NaiveDate,
    ) -> Result<Option<Invoice>, AppError> {
        let mut state = self.state.lock().unwrap();
        let invoice = match state.invoices.get_mut(&invoice_id) {
            Some(invoice) => invoice,
            None => return Ok(None),
        };
        invoice
            .status()
            .transition(InvoiceStatus::Sent)
            .map_err(|e| AppError::Conflict(anyhow::anyhow!(e)))?;
        invoice.status = InvoiceStatus::Sent.as_str().to_string();
        invoice.issue_date = Some(issue_date);
        invoice.sent_utc = Some(Utc::now());
        Ok(Some(invoice.clone()))
    }

    async fn cancel_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let mut state = self.state.lock().unwrap();
        if state
            .payments
            .iter()
            .any(|p| p.invoice_id == invoice_id)
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Cannot cancel an invoice with recorded payments"
            )));
        }
        let invoice = match state.invoices.get_mut(&invoice_id) {
            Some(invoice) => invoice,
            None => return Ok(None),
        };
        invoice
            .status()
            .transition(InvoiceStatus::Cancelled)
            .map_err(|e| AppError::Conflict(anyhow::anyhow!(e)))?;
        invoice.status = InvoiceStatus::Cancelled.as_str().to_string();
        invoice.cancelled_utc = Some(Utc::now());
        Ok(Some(invoice.clone()))
    }

    async fn mark_overdue_invoices(&self, today: NaiveDate) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        let mut flipped = 0;
        let unpaid: Vec<Uuid> = state
            .invoices
            .values()
            .filter(|i| i.status() == InvoiceStatus::Sent && i.due_date < today)
            .map(|i| i.invoice_id)
            .collect();
        for invoice_id in unpaid {
            let paid: Decimal = state
                .payments
                .iter()
                .filter(|p| p.invoice_id == invoice_id)
                .map(|p| p.amount)
                .sum();
            let invoice = state.invoices.get_mut(&invoice_id).unwrap();
            if invoice.total > paid {
                invoice.status = InvoiceStatus::Overdue.as_str().to_string();
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn append_payment(&self, new: NewPayment) -> Result<AppendOutcome, AppError> {
        ledger::validate_amount(new.amount)
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

        // One lock scope: the duplicate check and the insert are atomic.
        let mut state = self.state.lock().unwrap();
        if state
            .payments
            .iter()
            .any(|p| p.gateway_transaction_id == new.gateway_transaction_id)
        {
            return Ok(AppendOutcome::Duplicate);
        }

        let invoice = state
            .invoices
            .get(&new.invoice_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        state.payments.push(PaymentRecord {
            payment_id: Uuid::new_v4(),
            invoice_id: new.invoice_id,
            amount: new.amount,
            gateway_transaction_id: new.gateway_transaction_id,
            notification_fingerprint: new.notification_fingerprint,
            received_utc: Utc::now(),
        });

        let records: Vec<PaymentRecord> = state
            .payments
            .iter()
            .filter(|p| p.invoice_id == new.invoice_id)
            .cloned()
            .collect();
        let outstanding = ledger::outstanding_balance(&invoice, &records);

        let mut status = invoice.status();
        if outstanding.is_zero() && status.accepts_payment() {
            status = status
                .transition(InvoiceStatus::Paid)
                .map_err(|e| AppError::Conflict(anyhow::anyhow!(e)))?;
            if let Some(stored) = state.invoices.get_mut(&new.invoice_id) {
                stored.status = status.as_str().to_string();
                stored.paid_utc = Some(Utc::now());
            }
        }

        Ok(AppendOutcome::Applied {
            outstanding,
            status,
        })
    }
}
