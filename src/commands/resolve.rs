use clap::{Args, Subcommand};

use super::{Context, RETRY_NOTICE};
use dietsync::clock::SystemClock;
use dietsync::sync::{Resolution, SyncStatus};

/// Resolve a sync conflict
#[derive(Debug, Args)]
pub struct ResolveCommand {
    #[command(subcommand)]
    command: Option<ResolveSubcommand>,
}

#[derive(Debug, Subcommand)]
enum ResolveSubcommand {
    /// Replace this device's diet with the server's version
    Remote,
    /// Overwrite the server's diet with this device's version
    Local,
}

impl ResolveCommand {
    pub async fn run(&self, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
        let choice = match &self.command {
            None => return self.show(ctx).await,
            Some(ResolveSubcommand::Remote) => Resolution::UseRemote,
            Some(ResolveSubcommand::Local) => Resolution::KeepLocal,
        };

        let orchestrator = ctx.orchestrator()?;
        let mut session = orchestrator.open_resolution(ctx.user_id()).await?;

        match orchestrator.resolve(&mut session, choice).await {
            Ok(_) => {
                println!("✓ {}", choice.label());
                Ok(())
            }
            Err(e) => {
                eprintln!("{}", RETRY_NOTICE);
                Err(format!("Conflict still open: {}", e).into())
            }
        }
    }

    /// Prints the pending conflict, if any.
    async fn show(&self, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
        let status = SyncStatus::load(&ctx.store, &SystemClock, ctx.user_id()).await?;
        match status.prompt {
            Some(prompt) => {
                print!("{}", prompt);
                println!();
                println!("Run `dietsync resolve local` or `dietsync resolve remote`.");
            }
            None => println!("No conflict to resolve."),
        }
        Ok(())
    }
}
