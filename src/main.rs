//! Deyelink - Google Smart Home bridge for Deye Cloud devices
//!
//! Runs the OAuth2 account-linking endpoints and the smart-home fulfillment
//! endpoint in front of the Deye Cloud developer API.

use anyhow::Result;
use clap::Parser;
use deyelink_auth::{
    AuthorizationServer, ClientRegistration, CredentialStore, FixedIdentity,
    MemoryCredentialStore, TokenVerifier,
};
use deyelink_core::config::{
    DEFAULT_CLIENT_ID, DEFAULT_CLIENT_SECRET, DEFAULT_REFRESH_TOKEN_TTL_DAYS,
};
use deyelink_core::{Config, DEFAULT_DEYE_BASE_URL, DEFAULT_SUBJECT};
use deyelink_gateway::{DeviceGateway, DeyeCloudClient, DeyeCredentials};
use deyelink_server::{create_router, create_rustls_config_from_files, AppState};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Deyelink - control Deye Cloud devices from Google Home
#[derive(Parser, Debug)]
#[command(name = "deyelink")]
#[command(version, about, long_about = None)]
struct Args {
    /// Server port
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// OAuth client id registered with Google
    #[arg(long, env = "OAUTH_CLIENT_ID", default_value = DEFAULT_CLIENT_ID)]
    oauth_client_id: String,

    /// OAuth client secret registered with Google
    #[arg(long, env = "OAUTH_CLIENT_SECRET", default_value = DEFAULT_CLIENT_SECRET, hide_default_value = true)]
    oauth_client_secret: String,

    /// Deye developer app id
    #[arg(long, env = "DEYE_APP_ID")]
    deye_app_id: String,

    /// Deye developer app secret
    #[arg(long, env = "DEYE_APP_SECRET", hide_env_values = true)]
    deye_app_secret: String,

    /// Deye Cloud account email
    #[arg(long, env = "DEYE_EMAIL")]
    deye_email: String,

    /// Deye Cloud account password
    #[arg(long, env = "DEYE_PASSWORD", hide_env_values = true)]
    deye_password: String,

    /// Deye developer API base URL
    #[arg(long, env = "DEYE_API_BASE_URL", default_value = DEFAULT_DEYE_BASE_URL)]
    deye_base_url: String,

    /// Identity every linked account resolves to
    #[arg(long, env = "LINK_SUBJECT", default_value = DEFAULT_SUBJECT)]
    subject: String,

    /// Refresh token lifetime in days (0 = never expires)
    #[arg(long, env = "REFRESH_TOKEN_TTL_DAYS", default_value_t = DEFAULT_REFRESH_TOKEN_TTL_DAYS)]
    refresh_token_ttl_days: u32,

    /// Path to TLS certificate file (PEM format)
    #[arg(long, requires = "key")]
    cert: Option<String>,

    /// Path to TLS private key file (PEM format)
    #[arg(long, requires = "cert")]
    key: Option<String>,

    /// Expose the unauthenticated GET /test/auth and /test/devices diagnostics
    #[arg(long)]
    debug_routes: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    info!("Deyelink v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::new()
        .with_port(args.port)
        .with_client(args.oauth_client_id, args.oauth_client_secret)
        .with_deye_app(args.deye_app_id, args.deye_app_secret)
        .with_deye_account(args.deye_email, args.deye_password)
        .with_deye_base_url(args.deye_base_url)
        .with_subject(args.subject)
        .with_refresh_token_ttl_days(args.refresh_token_ttl_days)
        .with_debug_routes(args.debug_routes);
    config.validate()?;

    // Credentials live in memory only; a restart unlinks every account
    let store: Arc<dyn CredentialStore> = Arc::new(
        MemoryCredentialStore::new().with_refresh_token_ttl(
            config
                .refresh_token_ttl_seconds()
                .map(chrono::Duration::seconds),
        ),
    );
    let auth = AuthorizationServer::new(
        ClientRegistration::new(config.client_id.clone(), config.client_secret.clone()),
        store.clone(),
        Arc::new(FixedIdentity::new(config.subject.clone())),
    );

    let gateway: Arc<dyn DeviceGateway> = Arc::new(DeyeCloudClient::new(
        DeyeCredentials {
            app_id: config.deye_app_id.clone(),
            app_secret: config.deye_app_secret.clone(),
            email: config.deye_email.clone(),
            password: config.deye_password.clone(),
        },
        config.deye_base_url.clone(),
    ));

    let port = config.port;
    let state = Arc::new(AppState::new(
        config,
        auth,
        TokenVerifier::new(store),
        gateway,
    ));
    let router = create_router(state);

    let tls_config = match (&args.cert, &args.key) {
        (Some(cert), Some(key)) => {
            Some(create_rustls_config_from_files(Path::new(cert), Path::new(key)).await?)
        }
        _ => None,
    };

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let protocol = if tls_config.is_some() { "https" } else { "http" };
    info!("Starting server on {}://{}", protocol, addr);
    info!("  Authorize: /auth/authorize");
    info!("  Token:     /auth/token");
    info!("  Fulfill:   /fulfillment");
    if tls_config.is_none() {
        warn!("Serving plain HTTP; terminate TLS in front of this process");
    }

    // Run server with graceful shutdown
    if let Some(tls_config) = tls_config {
        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();

        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
            shutdown_handle.graceful_shutdown(Some(std::time::Duration::from_secs(5)));
        });

        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(router.into_make_service())
            .await?;
    } else {
        let shutdown = async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        };

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
    }

    info!("Goodbye!");
    Ok(())
}
