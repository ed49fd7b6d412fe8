use tracing::info;
use tracing_subscriber::EnvFilter;

use medbase_server::config::loader;
use medbase_server::{routes, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1);
    let config = loader::load_config(config_path.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let addr = config.addr();
    let state = AppState::build(config).await?;
    let app = routes::router(state);

    info!(%addr, "medbase server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
