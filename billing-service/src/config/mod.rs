use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub portal: PortalConfig,
    pub service_name: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub merchant_id: String,
    pub merchant_key: Secret<String>,
    /// Base URL of the gateway's hosted payment page.
    pub process_url: String,
}

#[derive(Clone, Debug)]
pub struct PortalConfig {
    /// Public base URL the gateway redirects and posts back to,
    /// e.g. https://hub.example.agency
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("BILLING_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("BILLING_SERVICE_PORT")
            .unwrap_or_else(|_| "3010".to_string())
            .parse()?;

        let db_url = env::var("BILLING_DATABASE_URL").expect("BILLING_DATABASE_URL must be set");
        let max_connections = env::var("BILLING_DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let min_connections = env::var("BILLING_DATABASE_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()?;

        let merchant_id = env::var("GATEWAY_MERCHANT_ID").unwrap_or_default();
        let merchant_key = env::var("GATEWAY_MERCHANT_KEY").unwrap_or_default();
        let process_url = env::var("GATEWAY_PROCESS_URL").unwrap_or_default();

        let base_url =
            env::var("PORTAL_BASE_URL").unwrap_or_else(|_| "http://localhost:3010".to_string());

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                max_connections,
                min_connections,
            },
            gateway: GatewayConfig {
                merchant_id,
                merchant_key: Secret::new(merchant_key),
                process_url,
            },
            portal: PortalConfig { base_url },
            service_name: "billing-service".to_string(),
        })
    }
}
