mod config;
mod error;
mod routes;

use config::AppConfig;
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production injects the environment.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("storesync_api=info".parse()?)
                .add_directive("storesync_core=info".parse()?),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("Starting storesync-api with config: {:?}", config);

    let state = AppState::from_config(&config)?;
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("storesync-api listening on {}", config.bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
