use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use backend::{app, build_cors_layer, config::BackendConfig, tokens::TokenVault, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backend=debug,tower_http=debug".into()),
        )
        .with(fmt::layer())
        .init();

    let config = BackendConfig::from_env()?;
    tracing::info!("Storing tokens under {}", config.token_dir.display());

    let app = app(
        AppState::new(TokenVault::new(&config.token_dir)),
        build_cors_layer(config.cors_allowed_origins.as_deref()),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
