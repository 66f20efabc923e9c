//! Payment gateway client.
//!
//! Builds the signed checkout redirect and verifies inbound payment
//! notifications. The gateway's canonical field ordering and shared-secret
//! signature scheme live behind [`GatewaySigner`] so the vendor can be
//! swapped without touching ledger or state-machine code.

use crate::config::GatewayConfig;
use crate::models::Invoice;
use hub_core::utils::signature::{sign_payload, verify_payload};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, Secret};
use thiserror::Error;
use url::{form_urlencoded, Url};

/// Placeholder payer address when the client record carries no email.
const FALLBACK_EMAIL: &str = "accounts@agencyhub.example";

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Merchant credentials or process URL are missing. The portal must
    /// never emit a malformed redirect, so this fails the build outright.
    #[error("payment gateway is not configured")]
    NotConfigured,

    #[error("gateway signature error: {0}")]
    Signature(#[from] anyhow::Error),

    #[error("invalid gateway process URL: {0}")]
    BadProcessUrl(#[from] url::ParseError),
}

/// Canonical field ordering and shared-secret signature scheme.
///
/// The vendor dictates byte-exact ordering and escaping, so both live in
/// one implementation that checkout and notification verification share.
pub trait GatewaySigner {
    fn sign(&self, fields: &[(String, String)]) -> Result<String, GatewayError>;
    fn verify(&self, fields: &[(String, String)], signature: &str) -> Result<bool, GatewayError>;
}

/// HMAC-SHA256 over the urlencoded `key=value` field string, hex output.
#[derive(Clone)]
pub struct HmacSigner {
    secret: Secret<String>,
}

impl HmacSigner {
    pub fn new(secret: Secret<String>) -> Self {
        Self { secret }
    }
}

impl GatewaySigner for HmacSigner {
    fn sign(&self, fields: &[(String, String)]) -> Result<String, GatewayError> {
        let payload = encode_fields(fields);
        Ok(sign_payload(self.secret.expose_secret(), &payload)?)
    }

    fn verify(&self, fields: &[(String, String)], signature: &str) -> Result<bool, GatewayError> {
        let payload = encode_fields(fields);
        Ok(verify_payload(
            self.secret.expose_secret(),
            &payload,
            signature,
        )?)
    }
}

/// Urlencode `k=v` pairs joined with `&`, preserving field order.
fn encode_fields(fields: &[(String, String)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in fields {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// Callback set the gateway redirects or posts back to.
#[derive(Debug, Clone)]
pub struct CallbackUrls {
    pub return_url: String,
    pub cancel_url: String,
    pub notify_url: String,
}

/// Client for the agency's payment gateway.
#[derive(Clone)]
pub struct GatewayClient {
    config: GatewayConfig,
    signer: HmacSigner,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        let signer = HmacSigner::new(config.merchant_key.clone());
        Self { config, signer }
    }

    /// Check if merchant credentials and the process URL are set.
    pub fn is_configured(&self) -> bool {
        !self.config.merchant_id.is_empty()
            && !self.config.merchant_key.expose_secret().is_empty()
            && !self.config.process_url.is_empty()
    }

    /// Build the signed checkout redirect for `invoice`.
    ///
    /// Deterministic and side-effect free: repeated calls for the same
    /// invoice state produce the same URL, and nothing here touches the
    /// ledger.
    pub fn checkout_url(
        &self,
        invoice: &Invoice,
        outstanding: Decimal,
        callbacks: &CallbackUrls,
    ) -> Result<Url, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let item_name = format!("Invoice {}", invoice.invoice_number);
        let item_description = invoice
            .description
            .clone()
            .unwrap_or_else(|| item_name.clone());
        let email_address = invoice
            .client_email
            .clone()
            .unwrap_or_else(|| FALLBACK_EMAIL.to_string());

        let fields: Vec<(String, String)> = vec![
            ("merchant_id".to_string(), self.config.merchant_id.clone()),
            ("return_url".to_string(), callbacks.return_url.clone()),
            ("cancel_url".to_string(), callbacks.cancel_url.clone()),
            ("notify_url".to_string(), callbacks.notify_url.clone()),
            (
                "m_payment_id".to_string(),
                invoice.invoice_id.to_string(),
            ),
            ("amount".to_string(), format_amount(outstanding)),
            ("item_name".to_string(), item_name),
            ("item_description".to_string(), item_description),
            ("email_address".to_string(), email_address),
        ];

        let signature = self.signer.sign(&fields)?;

        let mut url = Url::parse(&self.config.process_url)?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in &fields {
                query.append_pair(key, value);
            }
            query.append_pair("signature", &signature);
        }

        Ok(url)
    }

    /// Verify an inbound notification's signature.
    ///
    /// `fields` must preserve the order the gateway posted them in, minus
    /// the `signature` field itself.
    pub fn verify_notification(
        &self,
        fields: &[(String, String)],
        signature: &str,
    ) -> Result<bool, GatewayError> {
        self.signer.verify(fields, signature)
    }
}

/// Gateway wire format for amounts: two decimal places, '.' separator, no
/// thousands separators.
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}
