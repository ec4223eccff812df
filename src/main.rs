use sheet_sftp_relay::{build_router, utils::config::AppConfig, AppState};
use std::{net::SocketAddr, time::Duration};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sheet_sftp_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting sheet SFTP relay");

    // Load configuration
    let config = AppConfig::from_env();
    tracing::info!("Configuration loaded: {:?}", config);

    if config.site_secret.is_empty() {
        tracing::warn!("SITE_SECRET is not set; the stored SFTP password cannot be decrypted");
    }

    let addr: SocketAddr = config.bind_address().parse()?;

    let app_state = AppState::from_config(config).map_err(|e| {
        tracing::error!("Failed to initialize relay: {}", e);
        e
    })?;

    if !app_state.authenticator.is_configured() {
        tracing::warn!(
            "API_KEY is not set; every protected request will be rejected. \
             Run generate-api-key to create one"
        );
    }
    if !app_state.relay.is_configured() {
        tracing::warn!("SFTP host or username missing; uploads will fail until configured");
    }

    // Drop rate limit windows that have already expired
    let cleanup_limiter = app_state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let removed = cleanup_limiter.cleanup_expired().await;
            if removed > 0 {
                tracing::debug!(
                    "Removed {} expired rate limit windows, {} still tracked",
                    removed,
                    cleanup_limiter.tracked_addresses().await
                );
            }
        }
    });

    let app = build_router(app_state);

    tracing::info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
