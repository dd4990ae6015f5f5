//! TLS support for the Deyelink server

use axum_server::tls_rustls::RustlsConfig;
use std::path::Path;
use tracing::info;

/// Load a rustls configuration from PEM certificate and key files
pub async fn create_rustls_config_from_files(
    cert_path: &Path,
    key_path: &Path,
) -> std::io::Result<RustlsConfig> {
    info!("Loading TLS certificate from {}", cert_path.display());
    RustlsConfig::from_pem_file(cert_path, key_path).await
}
