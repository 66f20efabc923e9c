//! Domain models for billing-service.

pub mod invoice;
pub mod payment;

pub use invoice::{CreateInvoice, InvalidTransition, Invoice, InvoiceStatus};
pub use payment::{NewPayment, PaymentRecord};
