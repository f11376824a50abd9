use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use storefront_backend::api::{self, AppState, ServiceInfo};
use storefront_backend::config::Config;
use storefront_backend::database::{self, OrderRepository, PaymentRepository, PoolConfig};
use storefront_backend::payments::{MpesaClient, MpesaConfig};
use storefront_backend::services::PaymentServices;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;
    let mpesa_config = MpesaConfig::from_env().context("Invalid M-Pesa configuration")?;

    tracing::info!("Starting Storefront Backend");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!(
        "M-Pesa: {:?} at {}",
        mpesa_config.environment,
        mpesa_config.base_url
    );

    let pool = database::init_pool(
        &config.database.url,
        Some(PoolConfig::with_max_connections(config.database.max_connections)),
    )
    .await
    .context("Failed to connect to database")?;

    let mpesa_environment = format!("{:?}", mpesa_config.environment).to_lowercase();
    let gateway = Arc::new(MpesaClient::new(mpesa_config).context("Failed to build M-Pesa client")?);
    let services = PaymentServices::new(
        gateway,
        Arc::new(PaymentRepository::new(pool.clone())),
        Arc::new(OrderRepository::new(pool)),
    );

    let state = AppState::new(
        services,
        &config.auth.jwt_secret,
        ServiceInfo {
            environment: config.server.environment.clone(),
            mpesa_environment,
            storage: "postgres",
        },
    );
    let app = api::router(state);

    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .context("HOST must be an IP address")?;
    let addr = SocketAddr::new(host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
