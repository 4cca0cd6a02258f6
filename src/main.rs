// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;

use axum_server::Handle;
use tokio::signal;

use cleanslate_server::{
    api::{self, auth::seed_superuser},
    auth::AuthConfig,
    config::Config,
    logging,
    state::AppState,
    storage::{DbError, StoragePaths, Store},
    tls::load_rustls_config,
};

/// Time allowed for in-flight requests after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("failed to open database: {0}")]
    Database(#[from] DbError),

    #[error("failed to seed bootstrap admin: {0}")]
    Bootstrap(String),

    #[error("failed to load TLS credentials: {0}")]
    Tls(std::io::Error),

    #[error("server error: {0}")]
    Serve(std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            // The subscriber is not installed yet
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(config.log_format);

    match run(config).await {
        Ok(()) => {
            tracing::info!("Server shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    tracing::info!(?config, "Starting CleanSlate server");

    let paths = StoragePaths::new(&config.data_dir);
    let store = Store::open(&paths.database())?;
    let auth_config = AuthConfig::new(config.jwt_secret.as_bytes(), config.issuer.clone())
        .with_token_ttl(config.token_ttl_secs)
        .with_password_iterations(config.password_iterations);
    let state = AppState::new(store, paths, auth_config, config.policy);

    if let Some(admin) = &config.bootstrap_admin {
        seed_superuser(&state, &admin.email, &admin.password)
            .map_err(|e| StartupError::Bootstrap(e.message))?;
    }

    let app = api::router(state, &config.cors_origins)
        .into_make_service_with_connect_info::<SocketAddr>();
    let addr = config.bind_addr;

    let handle = Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    match &config.tls {
        Some(tls_paths) => {
            let tls = load_rustls_config(tls_paths).await.map_err(StartupError::Tls)?;
            tracing::info!("Listening on https://{addr} (docs at /docs)");
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(app)
                .await
                .map_err(StartupError::Serve)
        }
        None => {
            tracing::warn!("TLS_CERT_PATH not set, serving plain HTTP");
            tracing::info!("Listening on http://{addr} (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app)
                .await
                .map_err(StartupError::Serve)
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
