//! Chained authentication adapter server binary.
//!
//! Signs users in at the primary provider, then at GitHub, and issues
//! tokens to the registered downstream client.

use std::sync::Arc;

use chain_core::authorization::InMemoryAuthorizationStore;
use chain_core::oauth::OAuthStateStore;
use chain_core::session::InMemorySessionStore;
use clap::Parser;
use tracing::info;

/// CLI arguments for the adapter.
#[derive(Parser, Debug)]
#[command(name = "auth_adapter_server", about = "Chained authentication adapter")]
struct Args {
    /// Address to listen on. Overrides `BIND_ADDR`.
    #[arg(long, env = "BIND_ADDR")]
    bind_addr: Option<String>,

    /// Public base URL of the adapter. Overrides `ISSUER_URI`.
    #[arg(long, env = "ISSUER_URI")]
    issuer: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,chain_api=debug,chain_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = chain_api::config::AdapterConfig::from_env();
    if let Some(bind_addr) = args.bind_addr {
        config.bind_addr = bind_addr;
    }
    if let Some(issuer) = args.issuer {
        config.issuer = issuer.trim_end_matches('/').to_string();
    }

    info!(
        issuer = %config.issuer,
        primary = %config.primary.registration_id,
        secondary = %config.secondary.registration_id,
        client_id = %config.client.client_id,
        "starting auth_adapter_server"
    );

    let sessions = Arc::new(InMemorySessionStore::new());
    let authorizations = Arc::new(InMemoryAuthorizationStore::new());
    let login_states = Arc::new(OAuthStateStore::new());
    sessions.spawn_cleanup_task();
    authorizations.spawn_cleanup_task();
    login_states.spawn_cleanup_task();

    let bind_addr = config.bind_addr.clone();
    let state = chain_api::AppState::new(config, sessions, authorizations, login_states)?;
    let app = chain_api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "auth adapter listening");

    axum::serve(listener, app).await?;

    Ok(())
}
