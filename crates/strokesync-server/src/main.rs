use std::sync::Arc;

use clap::Parser;
use strokesync_core::{DrawingRepository, FileRepository, MemoryRepository};
use strokesync_server::config::ConfigError;
use strokesync_server::{AppState, Config, ServerError, TokenIdentityProvider, app};
use tracing::info;

fn identity_provider(config: &Config) -> Result<TokenIdentityProvider, ConfigError> {
    let mut provider = TokenIdentityProvider::new();
    if let Some(path) = &config.tokens_file {
        let count = provider.load_file(path)?;
        info!("Loaded {} credentials from {}", count, path.display());
    }
    for arg in &config.tokens {
        provider.add_arg(arg)?;
    }
    if provider.is_empty() {
        return Err(ConfigError::NoCredentials);
    }
    Ok(provider)
}

fn repository(config: &Config) -> Result<Arc<dyn DrawingRepository>, ServerError> {
    if config.memory {
        info!("Keeping drawings in memory");
        return Ok(Arc::new(MemoryRepository::new()));
    }
    let repo = match &config.data {
        Some(path) => FileRepository::open(path.clone())?,
        None => FileRepository::default_location()?,
    };
    info!("Persisting drawings to {}", repo.path().display());
    Ok(Arc::new(repo))
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strokesync_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::parse();
    let identity = identity_provider(&config)?;
    let state = Arc::new(AppState::new(
        repository(&config)?,
        Arc::new(identity),
        config.channel_capacity,
    ));

    info!("StrokeSync relay server listening on {}", config.bind);
    info!("WebSocket endpoint: ws://{}/ws", config.bind);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}
