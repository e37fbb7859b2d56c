use tracing_subscriber::EnvFilter;

use clicktrainer_server::config::ServerConfig;
use clicktrainer_server::{build_app, spawn_background_tasks};

#[tokio::main]
async fn main() {
    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("clicktrainer: {e}");
            std::process::exit(1);
        },
    };
    init_tracing(&config.log_format);

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    }

    let addr = config.listen_addr.clone();
    let (app, state) = build_app(config);
    let sweeper = spawn_background_tasks(&state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr, error = %e, "Failed to bind");
            std::process::exit(1);
        },
    };
    tracing::info!(addr, stats = state.stats.is_some(), "Click trainer server listening");

    let shutdown_state = state.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Shutting down");
            shutdown_state.shutdown();
        })
        .await;

    state.shutdown();
    let _ = sweeper.await;
    if let Err(e) = served {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
