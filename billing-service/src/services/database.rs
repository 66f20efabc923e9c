//! PostgreSQL store for billing-service.

use crate::models::{CreateInvoice, Invoice, InvoiceStatus, NewPayment, PaymentRecord};
use crate::services::ledger;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{AppendOutcome, BillingStore};
use async_trait::async_trait;
use chrono::NaiveDate;
use hub_core::error::AppError;
use rand::{distributions::Alphanumeric, Rng};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Length of the opaque portal capability token.
const PORTAL_TOKEN_LEN: usize = 40;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "billing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

fn generate_portal_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PORTAL_TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[async_trait]
impl BillingStore for Database {
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn invoice_by_id(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["invoice_by_id"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, invoice_number, portal_token, client_id, client_name, client_email,
                description, total, status, issue_date, due_date, created_utc, sent_utc, paid_utc, cancelled_utc
            FROM invoices
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self, portal_token))]
    async fn invoice_by_token(&self, portal_token: &str) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["invoice_by_token"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, invoice_number, portal_token, client_id, client_name, client_email,
                description, total, status, issue_date, due_date, created_utc, sent_utc, paid_utc, cancelled_utc
            FROM invoices
            WHERE portal_token = $1
            "#,
        )
        .bind(portal_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn payments_for_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<PaymentRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["payments_for_invoice"])
            .start_timer();

        let payments = sqlx::query_as::<_, PaymentRecord>(
            r#"
            SELECT payment_id, invoice_id, amount, gateway_transaction_id,
                notification_fingerprint, received_utc
            FROM payments
            WHERE invoice_id = $1
            ORDER BY received_utc
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        timer.observe_duration();

        Ok(payments)
    }

    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        ledger::validate_amount(input.total)
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

        let invoice_id = Uuid::new_v4();
        let portal_token = generate_portal_token();
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (
                invoice_id, invoice_number, portal_token, client_id, client_name, client_email,
                description, total, status, due_date
            )
            VALUES ($1, 'INV-' || LPAD(nextval('invoice_number_seq')::text, 6, '0'),
                $2, $3, $4, $5, $6, $7, 'draft', $8)
            RETURNING invoice_id, invoice_number, portal_token, client_id, client_name, client_email,
                description, total, status, issue_date, due_date, created_utc, sent_utc, paid_utc, cancelled_utc
            "#,
        )
        .bind(invoice_id)
        .bind(&portal_token)
        .bind(input.client_id)
        .bind(&input.client_name)
        .bind(&input.client_email)
        .bind(&input.description)
        .bind(input.total)
        .bind(input.due_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e)))?;

        timer.observe_duration();

        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            "Draft invoice created"
        );

        Ok(invoice)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn send_invoice(
        &self,
        invoice_id: Uuid,
        issue_date: NaiveDate,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["send_invoice"])
            .start_timer();

        let existing = match self.invoice_by_id(invoice_id).await? {
            Some(invoice) => invoice,
            None => return Ok(None),
        };
        existing
            .status()
            .transition(InvoiceStatus::Sent)
            .map_err(|e| AppError::Conflict(anyhow::anyhow!(e)))?;

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET status = 'sent',
                issue_date = $2,
                sent_utc = NOW()
            WHERE invoice_id = $1 AND status = 'draft'
            RETURNING invoice_id, invoice_number, portal_token, client_id, client_name, client_email,
                description, total, status, issue_date, due_date, created_utc, sent_utc, paid_utc, cancelled_utc
            "#,
        )
        .bind(invoice_id)
        .bind(issue_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to send invoice: {}", e)))?;

        timer.observe_duration();

        if let Some(ref inv) = invoice {
            info!(
                invoice_id = %inv.invoice_id,
                invoice_number = %inv.invoice_number,
                "Invoice sent"
            );
        }

        Ok(invoice)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn cancel_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["cancel_invoice"])
            .start_timer();

        let existing = match self.invoice_by_id(invoice_id).await? {
            Some(invoice) => invoice,
            None => return Ok(None),
        };
        existing
            .status()
            .transition(InvoiceStatus::Cancelled)
            .map_err(|e| AppError::Conflict(anyhow::anyhow!(e)))?;

        let payments = self.payments_for_invoice(invoice_id).await?;
        if !payments.is_empty() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Cannot cancel an invoice with recorded payments"
            )));
        }

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET status = 'cancelled',
                cancelled_utc = NOW()
            WHERE invoice_id = $1 AND status IN ('draft', 'sent')
            RETURNING invoice_id, invoice_number, portal_token, client_id, client_name, client_email,
                description, total, status, issue_date, due_date, created_utc, sent_utc, paid_utc, cancelled_utc
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to cancel invoice: {}", e)))?;

        timer.observe_duration();

        if let Some(ref inv) = invoice {
            info!(invoice_id = %inv.invoice_id, "Invoice cancelled");
        }

        Ok(invoice)
    }

    #[instrument(skip(self))]
    async fn mark_overdue_invoices(&self, today: NaiveDate) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_overdue_invoices"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE invoices i
            SET status = 'overdue'
            WHERE i.status = 'sent'
              AND i.due_date < $1
              AND i.total > COALESCE(
                  (SELECT SUM(p.amount) FROM payments p WHERE p.invoice_id = i.invoice_id), 0)
            "#,
        )
        .bind(today)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to mark overdue invoices: {}", e))
        })?;

        timer.observe_duration();

        let flipped = result.rows_affected();
        if flipped > 0 {
            info!(count = flipped, "Invoices marked overdue");
        }

        Ok(flipped)
    }

    #[instrument(
        skip(self, new),
        fields(invoice_id = %new.invoice_id, transaction_id = %new.gateway_transaction_id)
    )]
    async fn append_payment(&self, new: NewPayment) -> Result<AppendOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["append_payment"])
            .start_timer();

        ledger::validate_amount(new.amount)
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to begin: {}", e)))?;

        // Row-lock the invoice so concurrent appends for it serialize and
        // the balance/status pair stays consistent.
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, invoice_number, portal_token, client_id, client_name, client_email,
                description, total, status, issue_date, due_date, created_utc, sent_utc, paid_utc, cancelled_utc
            FROM invoices
            WHERE invoice_id = $1
            FOR UPDATE
            "#,
        )
        .bind(new.invoice_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock invoice: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        // The unique constraint on gateway_transaction_id arbitrates
        // concurrent deliveries of the same notification.
        let payment_id = Uuid::new_v4();
        let inserted = sqlx::query(
            r#"
            INSERT INTO payments (
                payment_id, invoice_id, amount, gateway_transaction_id, notification_fingerprint
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (gateway_transaction_id) DO NOTHING
            "#,
        )
        .bind(payment_id)
        .bind(new.invoice_id)
        .bind(new.amount)
        .bind(&new.gateway_transaction_id)
        .bind(&new.notification_fingerprint)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to append payment: {}", e)))?;

        if inserted.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to rollback: {}", e)))?;
            timer.observe_duration();
            return Ok(AppendOutcome::Duplicate);
        }

        let records = sqlx::query_as::<_, PaymentRecord>(
            r#"
            SELECT payment_id, invoice_id, amount, gateway_transaction_id,
                notification_fingerprint, received_utc
            FROM payments
            WHERE invoice_id = $1
            ORDER BY received_utc
            "#,
        )
        .bind(new.invoice_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        let outstanding = ledger::outstanding_balance(&invoice, &records);

        let mut status = invoice.status();
        if outstanding.is_zero() && status.accepts_payment() {
            status = status
                .transition(InvoiceStatus::Paid)
                .map_err(|e| AppError::Conflict(anyhow::anyhow!(e)))?;
            sqlx::query(
                r#"
                UPDATE invoices
                SET status = 'paid',
                    paid_utc = NOW()
                WHERE invoice_id = $1
                "#,
            )
            .bind(new.invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to mark invoice paid: {}", e))
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();

        info!(
            invoice_id = %new.invoice_id,
            transaction_id = %new.gateway_transaction_id,
            amount = %new.amount,
            outstanding = %outstanding,
            status = status.as_str(),
            "Payment appended to ledger"
        );

        Ok(AppendOutcome::Applied {
            outstanding,
            status,
        })
    }
}
