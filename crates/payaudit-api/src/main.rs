//! # payaudit-api -- Binary Entry Point
//!
//! Starts the Axum HTTP server for the payroll audit portal.
//! Binds to configurable port (default 8080).

use std::sync::Arc;

use payaudit_api::config::{AppConfig, LogFormat};
use payaudit_api::db::requests::PgRequestRepository;
use payaudit_api::middleware::metrics::install_recorder;
use payaudit_api::repository::{MemoryRepository, RequestRepository};
use payaudit_api::state::{AppState, Collaborators};
use payaudit_clients::{
    AnalysisConfig, AnalysisEngine, EmailConfig, EmailProvider, HttpAnalysisEngine,
    HttpEmailProvider, HttpPaymentProcessor, PaymentConfig, PaymentProcessor,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    // Initialize structured tracing.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(?config, "configuration loaded");

    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set; operator endpoints are unauthenticated");
    }

    // Initialize database pool (optional: absent means in-memory only).
    let repo: Arc<dyn RequestRepository> = match payaudit_api::db::init_pool().await.map_err(|e| {
        tracing::error!("Database initialization failed: {e}");
        e
    })? {
        Some(pool) => Arc::new(PgRequestRepository::new(pool)),
        None => Arc::new(MemoryRepository::new()),
    };

    let collaborators = Collaborators {
        payments: payment_processor()?,
        email: email_provider()?,
        analysis: analysis_engine()?,
    };
    tracing::info!(?collaborators, "collaborators configured");

    let port = config.port;
    let metrics_enabled = config.metrics_enabled;
    let mut state = AppState::new(config, repo, collaborators);
    if metrics_enabled {
        state = state.with_metrics(install_recorder()?);
    }

    let app = payaudit_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("payaudit API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

fn payment_processor() -> Result<Option<Arc<dyn PaymentProcessor>>, Box<dyn std::error::Error>> {
    match PaymentConfig::from_env()? {
        Some(config) => {
            tracing::info!("payment processor configured");
            Ok(Some(Arc::new(HttpPaymentProcessor::new(&config)?)))
        }
        None => {
            tracing::warn!("payment processor not configured. Checkout will return 503.");
            Ok(None)
        }
    }
}

fn email_provider() -> Result<Option<Arc<dyn EmailProvider>>, Box<dyn std::error::Error>> {
    match EmailConfig::from_env()? {
        Some(config) => {
            tracing::info!("email provider configured");
            Ok(Some(Arc::new(HttpEmailProvider::new(&config)?)))
        }
        None => {
            tracing::warn!("email provider not configured. Links and reports will not be sent.");
            Ok(None)
        }
    }
}

fn analysis_engine() -> Result<Option<Arc<dyn AnalysisEngine>>, Box<dyn std::error::Error>> {
    match AnalysisConfig::from_env()? {
        Some(config) => {
            tracing::info!("analysis engine configured");
            Ok(Some(Arc::new(HttpAnalysisEngine::new(&config)?)))
        }
        None => {
            tracing::warn!("analysis engine not configured. Uploads will be recorded as failed.");
            Ok(None)
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
