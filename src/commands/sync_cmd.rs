//! Sync CLI commands for synchronizing with the server.

use clap::{Args, Subcommand};

use super::{Context, RETRY_NOTICE};
use dietsync::clock::SystemClock;
use dietsync::remote::HttpRemoteClient;
use dietsync::sync::{SyncAction, SyncStatus, Trigger};

/// Sync with remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration, record state and server status
    Status,
}

impl SyncCommand {
    pub async fn run(&self, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            None => self.sync(ctx).await,
            Some(SyncSubcommand::Status) => self.status(ctx).await,
        }
    }

    async fn sync(&self, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
        let orchestrator = ctx.orchestrator()?;

        println!("Syncing with server...");
        let report = orchestrator.sync(ctx.user_id(), Trigger::Reconnect).await;

        match &report.action {
            SyncAction::UpToDate | SyncAction::Unchanged => println!("✓ Already up to date."),
            SyncAction::Pushed => println!("✓ Local changes sent to the server."),
            SyncAction::Pulled => println!("✓ Updated from the server."),
            SyncAction::Resolved(choice) => println!("✓ Resolved: {}", choice.label()),
            SyncAction::Coalesced => println!("A sync is already running; it will pick this up."),
            SyncAction::Conflicted => {
                println!();
                if let Some(prompt) = &report.prompt {
                    print!("{}", prompt);
                }
                println!();
                println!("Run `dietsync resolve local` or `dietsync resolve remote` to continue.");
            }
            SyncAction::Retry(reason) => {
                eprintln!("{}", RETRY_NOTICE);
                return Err(reason.clone().into());
            }
        }

        Ok(())
    }

    async fn status(&self, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        let sync = &ctx.config.sync;
        match sync.endpoint() {
            Some((server_url, api_key)) => {
                println!("Server:    {}", server_url);
                println!("API Key:   {}", api_key.masked());
                println!(
                    "Auto-sync: {}",
                    if sync.auto_sync.value { "enabled" } else { "disabled" }
                );
                println!("User:      {}", ctx.user_id());
                println!();

                print!("Server status: ");
                let client = HttpRemoteClient::new(server_url, api_key.expose());
                if client.check_server().await {
                    println!("✓ connected");
                } else {
                    println!("✗ unreachable");
                }
            }
            None => {
                println!("Status: Not configured ({} not set)", sync.missing().join(", "));
                println!();
                println!("To enable sync, add to your config file:");
                println!();
                println!("  sync:");
                println!("    server_url: \"http://localhost:8080\"");
                println!("    api_key: \"your-api-key\"");
                println!("    auto_sync: false");
                println!();
                println!("Or set environment variables:");
                println!("  DIETSYNC_SYNC_URL");
                println!("  DIETSYNC_SYNC_API_KEY");
                println!("  DIETSYNC_AUTO_SYNC");
            }
        }

        println!();
        println!("Diet Record");
        println!("===========");
        println!();

        let status = match &ctx.orchestrator {
            Some(orchestrator) => orchestrator.status(ctx.user_id()).await?,
            None => SyncStatus::load(&ctx.store, &SystemClock, ctx.user_id()).await?,
        };
        print!("{}", status);
        if let Some(prompt) = &status.prompt {
            println!();
            print!("{}", prompt);
        }

        Ok(())
    }
}
