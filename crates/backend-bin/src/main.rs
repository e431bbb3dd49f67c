use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use meetgate_backend_lib::{
    config::Settings,
    router,
    store::FlatFileBookingStore,
    AppState,
};

#[derive(Parser, Debug)]
#[command(name = "meetgate", about = "Booking and video-session access server")]
struct Args {
    /// Path to a TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured bind address
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize configuration, falling back to the default search path
    let settings = match &args.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load().or_else(|_| Settings::load_from("config/default.toml"))?,
    };

    // Initialize tracing; RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone())),
        )
        .init();

    let bind_addr = args.bind.unwrap_or(settings.bind_addr);

    // Open the booking store
    let store = FlatFileBookingStore::open(&settings.data_dir).await?;

    // Create application state
    let state = Arc::new(AppState::new(store, settings)?);

    // Create the API router
    let app = router::create_router(state);

    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}
