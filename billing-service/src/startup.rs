//! Application startup and lifecycle management.

use crate::config::Config;
use crate::handlers;
use crate::services::{metrics, CallbackUrls, Database, GatewayClient, Reconciler};
use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use hub_core::error::AppError;
use hub_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use secrecy::ExposeSecret;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub gateway: GatewayClient,
    pub reconciler: Reconciler<Database>,
    pub config: Config,
}

impl AppState {
    /// Callback set the gateway uses for this invoice's checkout.
    pub fn portal_callbacks(&self, portal_token: &str) -> CallbackUrls {
        let base = self.config.portal.base_url.trim_end_matches('/');
        CallbackUrls {
            return_url: format!("{}/portal/invoice/{}", base, portal_token),
            cancel_url: format!("{}/portal/invoice/{}", base, portal_token),
            notify_url: format!("{}/gateway/notify", base),
        }
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        metrics::init_metrics();

        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        db.run_migrations().await?;

        let gateway = GatewayClient::new(config.gateway.clone());
        if gateway.is_configured() {
            tracing::info!("Payment gateway client initialized");
        } else {
            tracing::warn!("Payment gateway credentials not configured - checkout is disabled");
        }

        let reconciler = Reconciler::new(db.clone(), gateway.clone());

        let state = AppState {
            db,
            gateway,
            reconciler,
            config: config.clone(),
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/metrics", get(handlers::metrics_endpoint))
            // Client portal (capability-token access)
            .route(
                "/portal/invoice/:token",
                get(handlers::portal::view_invoice),
            )
            .route(
                "/portal/invoice/:token/pay",
                get(handlers::portal::pay_invoice),
            )
            // Gateway callback
            .route("/gateway/notify", post(handlers::notify::gateway_notify))
            // Hub (staff) invoice management
            .route("/invoices", post(handlers::invoices::create_invoice))
            .route("/invoices/:id", get(handlers::invoices::get_invoice))
            .route("/invoices/:id/send", post(handlers::invoices::send_invoice))
            .route(
                "/invoices/:id/cancel",
                post(handlers::invoices::cancel_invoice),
            )
            .route(
                "/admin/sweep-overdue",
                post(handlers::invoices::sweep_overdue),
            )
            .layer(from_fn(security_headers_middleware))
            .layer(from_fn(metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                }),
            )
            .with_state(state);

        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid server address: {}", e)))?;
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> Result<(), AppError> {
        tracing::info!("Listening on port {}", self.port);

        axum::serve(self.listener, self.router).await?;

        Ok(())
    }
}
