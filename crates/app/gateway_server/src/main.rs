//! Token-relay gateway server binary.

use clap::Parser;
use tracing::info;

/// CLI arguments for the gateway.
#[derive(Parser, Debug)]
#[command(name = "gateway_server", about = "Token-relay gateway")]
struct Args {
    /// Address to listen on. Overrides `GATEWAY_BIND_ADDR`.
    #[arg(long, env = "GATEWAY_BIND_ADDR")]
    bind_addr: Option<String>,

    /// Downstream base URL. Overrides `DOWNSTREAM_URL`.
    #[arg(long, env = "DOWNSTREAM_URL")]
    downstream_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,chain_gateway=debug")
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = chain_gateway::config::GatewayConfig::from_env();
    if let Some(bind_addr) = args.bind_addr {
        config.bind_addr = bind_addr;
    }
    if let Some(downstream_url) = args.downstream_url {
        config.downstream_url = downstream_url;
    }

    info!(
        downstream = %config.downstream_url,
        authorization_server = %config.authorization_server,
        verify_signatures = config.jwt_secret.is_some(),
        "starting gateway_server"
    );

    let state = chain_gateway::GatewayState::from_config(&config)?;
    let app = chain_gateway::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "gateway listening");

    axum::serve(listener, app).await?;

    Ok(())
}
