//! DietSync Server
//!
//! Stores one diet record per user and assigns the `updatedAt` stamp on
//! every write.
//!
//! # Configuration
//!
//! Environment variables:
//! - `DIETSYNC_PORT`: Port to listen on (default: 8080)
//! - `DIETSYNC_DATA_DIR`: Directory to store records (default: ~/.local/share/dietsync-server)
//! - `DIETSYNC_CONFIG`: Path to config file (default: ~/.config/dietsync-server/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "ana"
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dietsync::server::{router, ApiKeyStore, AppState, DietStorage};

/// Server configuration
#[derive(Debug, Clone)]
struct Config {
    port: u16,
    data_dir: PathBuf,
    config_path: PathBuf,
}

impl Config {
    fn from_env() -> Self {
        let port = std::env::var("DIETSYNC_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let data_dir = std::env::var("DIETSYNC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("dietsync-server")
            });

        let config_path = std::env::var("DIETSYNC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("dietsync-server")
                    .join("config.yaml")
            });

        Self {
            port,
            data_dir,
            config_path,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dietsync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    std::fs::create_dir_all(&config.data_dir).map_err(|e| {
        format!(
            "Failed to create data directory {}: {}",
            config.data_dir.display(),
            e
        )
    })?;

    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Config file: {}", config.config_path.display());

    let state = AppState::new(
        DietStorage::new(config.data_dir),
        ApiKeyStore::load(&config.config_path),
    );
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
