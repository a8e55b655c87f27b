use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{ConfigCommand, Context, DietCommand, ResolveCommand, SyncCommand};
use dietsync::config::Config;

#[derive(Parser)]
#[command(name = "dietsync")]
#[command(version)]
#[command(about = "Diet plan manager with offline-first sync", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// View and edit the diet
    Diet(DietCommand),

    /// Sync with the server
    Sync(SyncCommand),

    /// Resolve a sync conflict
    Resolve(ResolveCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dietsync=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Config::load(cli.config)?;

    let command = match cli.command {
        Some(Commands::Config(cmd)) => return cmd.run(&config),
        Some(command) => command,
        None => {
            println!("Use --help to see available commands");
            return Ok(());
        }
    };

    let ctx = Context::open(config).await?;

    // Resolving works on the conflict the user was shown; sync runs its own cycle.
    if !matches!(command, Commands::Sync(_) | Commands::Resolve(_)) {
        ctx.sync_on_start().await;
    }

    match command {
        Commands::Diet(cmd) => cmd.run(&ctx).await?,
        Commands::Sync(cmd) => cmd.run(&ctx).await?,
        Commands::Resolve(cmd) => cmd.run(&ctx).await?,
        Commands::Config(cmd) => cmd.run(&ctx.config)?,
    }

    Ok(())
}
