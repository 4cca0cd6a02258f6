// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! TLS setup for the HTTPS listener.

use axum_server::tls_rustls::RustlsConfig;

use crate::config::TlsPaths;

/// Install the ring crypto provider for rustls.
///
/// Must run before any TLS configuration is built. A provider installed
/// earlier in the process is left in place.
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }
}

/// Load the PEM certificate chain and private key.
pub async fn load_rustls_config(paths: &TlsPaths) -> std::io::Result<RustlsConfig> {
    install_crypto_provider();
    let config = RustlsConfig::from_pem_file(&paths.cert, &paths.key).await?;
    tracing::info!(cert = %paths.cert.display(), "Loaded TLS certificate");
    Ok(config)
}
