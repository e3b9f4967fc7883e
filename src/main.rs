use anyhow::Context;
use dotenv::dotenv;
use room_relay::{AppState, Settings};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let config = Settings::new().context("failed to load configuration")?;

    // Initialize logging; RUST_LOG takes precedence over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))
        .context("invalid log filter")?;
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Configuration loaded successfully ({} environment)", config.environment);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers as usize)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: Settings) -> anyhow::Result<()> {
    let address = config.bind_address();
    let state = AppState::new(config);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;

    info!("WebSocket server started at ws://{}", address);

    state.server().run(listener, shutdown_signal()).await?;

    info!("Shutting down server");
    state.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        // Without a signal handler the server runs until killed
        std::future::pending::<()>().await;
    }
}
