use anyhow::{Context, Result};
use dotenv::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use uprising::api::{self, AppState};
use uprising::config::Config;
use uprising::gemini::GeminiClient;
use uprising::rate_limiter::RateLimiter;
use uprising::service::VerdictService;
use uprising::store::Database;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "uprising=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    let store = Database::open(&config.database_url)
        .with_context(|| format!("failed to open verdict database at {}", config.database_url))?;
    info!("Verdict database open at {}", config.database_url);

    let gemini = GeminiClient::new(
        &config.gemini_endpoint,
        &config.gemini_model,
        &config.gemini_api_key,
    );
    info!(model = gemini.model(), "Gemini client ready");

    let limiter = RateLimiter::default();
    let sweeper = limiter.spawn_cleanup();

    let state = AppState {
        service: Arc::new(VerdictService::new(Arc::new(store), Arc::new(gemini))),
        limiter,
    };

    let app = api::router(state);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server is running on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    sweeper.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
