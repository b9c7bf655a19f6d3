pub mod api;
pub mod config;
pub mod errors;
pub mod http;
pub mod onboarding;
pub mod pairing;
pub mod poller;
pub mod session;
pub mod state;
pub mod store;
pub mod upstream;

use config::Config;
use state::AppState;
use tracing_subscriber::EnvFilter;

/// Starts the qr-connect proxy runtime.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env()?;
    let bind_addr = config.bind_addr;

    tracing::info!(%bind_addr, upstream = %config.upstream_url, "starting qr-connect");

    let state = AppState::new(config)?;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, http::build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
