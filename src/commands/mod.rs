mod config_cmd;
mod diet;
mod resolve;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use diet::DietCommand;
pub use resolve::ResolveCommand;
pub use sync_cmd::SyncCommand;

use clap::ValueEnum;

use dietsync::clock::SystemClock;
use dietsync::config::Config;
use dietsync::db::{init_db, DietStore};
use dietsync::models::DietRecord;
use dietsync::remote::HttpRemoteClient;
use dietsync::sync::{save_local_edit, SyncAction, SyncOrchestrator, SyncReport, Trigger};

/// Shown whenever a sync attempt fails and will be retried later.
pub const RETRY_NOTICE: &str = "Não foi possível sincronizar — nova tentativa em breve";

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Everything a command needs: the local store and, when configured, the
/// orchestrator that syncs it.
pub struct Context {
    pub config: Config,
    pub store: DietStore,
    pub orchestrator: Option<SyncOrchestrator<HttpRemoteClient>>,
}

impl Context {
    pub async fn open(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let pool = init_db(&config.database_path.value).await?;
        let store = DietStore::new(pool);
        let orchestrator = HttpRemoteClient::from_config(&config.sync)
            .map(|client| SyncOrchestrator::new(store.clone(), client));

        Ok(Self {
            config,
            store,
            orchestrator,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.config.user_id.value
    }

    pub fn orchestrator(
        &self,
    ) -> Result<&SyncOrchestrator<HttpRemoteClient>, Box<dyn std::error::Error>> {
        self.orchestrator.as_ref().ok_or_else(|| {
            format!(
                "Sync is not configured: {} not set (see `dietsync sync status`)",
                self.config.sync.missing().join(" and ")
            )
            .into()
        })
    }

    /// Orchestrator to run automatic cycles with, if `auto_sync` is on.
    pub fn auto_sync(&self) -> Option<&SyncOrchestrator<HttpRemoteClient>> {
        self.orchestrator
            .as_ref()
            .filter(|_| self.config.sync.auto_sync.value)
    }

    /// Runs the startup cycle when auto sync is enabled.
    pub async fn sync_on_start(&self) {
        if let Some(orchestrator) = self.auto_sync() {
            let report = orchestrator.sync(self.user_id(), Trigger::AppStart).await;
            print_notice(&report);
        }
    }

    /// Saves an edit and, with auto sync on, syncs it right away.
    pub async fn edit<F, T>(&self, edit: F) -> Result<T, Box<dyn std::error::Error>>
    where
        F: FnOnce(&mut DietRecord) -> T,
    {
        match self.auto_sync() {
            Some(orchestrator) => {
                let (value, report) = orchestrator.edit(self.user_id(), edit).await?;
                print_notice(&report);
                Ok(value)
            }
            None => {
                let (value, _) =
                    save_local_edit(&self.store, &SystemClock, self.user_id(), edit).await?;
                Ok(value)
            }
        }
    }

    /// The current record, or the record a first edit would create.
    pub async fn record_or_default(&self) -> Result<DietRecord, Box<dyn std::error::Error>> {
        Ok(self
            .store
            .load_record(self.user_id())
            .await?
            .unwrap_or_default())
    }
}

/// Prints what the user must know about an automatic cycle: failures and conflicts.
pub fn print_notice(report: &SyncReport) {
    match &report.action {
        SyncAction::Retry(_) => eprintln!("{}", RETRY_NOTICE),
        SyncAction::Conflicted => {
            if let Some(prompt) = &report.prompt {
                eprintln!();
                eprint!("{}", prompt);
            }
            eprintln!();
            eprintln!("Run `dietsync resolve local` or `dietsync resolve remote` to continue.");
        }
        _ => {}
    }
}
