use clap::{Args, Subcommand};

use super::OutputFormat;
use dietsync::config::{Config, ConfigSource, ConfigValue};

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the effective configuration and where each value came from
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

/// One line of `config show`: key, value, and the layer it came from.
struct Entry {
    key: &'static str,
    value: String,
    source: Option<ConfigSource>,
}

impl Entry {
    fn from_value<T>(
        key: &'static str,
        value: &ConfigValue<T>,
        show: impl Fn(&T) -> String,
    ) -> Self {
        Self {
            key,
            value: show(&value.value),
            source: Some(value.source),
        }
    }

    fn from_optional<T>(
        key: &'static str,
        value: Option<&ConfigValue<T>>,
        show: impl Fn(&T) -> String,
    ) -> Self {
        match value {
            Some(value) => Self::from_value(key, value, show),
            None => Self {
                key,
                value: "(not set)".to_string(),
                source: None,
            },
        }
    }
}

fn entries(config: &Config) -> Vec<Entry> {
    let sync = &config.sync;
    vec![
        Entry::from_value("database_path", &config.database_path, |p| {
            p.display().to_string()
        }),
        Entry::from_value("user_id", &config.user_id, String::clone),
        Entry::from_optional("sync.server_url", sync.server_url.as_ref(), String::clone),
        Entry::from_optional("sync.api_key", sync.api_key.as_ref(), |k| k.masked()),
        Entry::from_value("sync.auto_sync", &sync.auto_sync, bool::to_string),
    ]
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => print_text(config),
                }
                Ok(())
            }
        }
    }
}

fn print_text(config: &Config) {
    match &config.config_file {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!(
            "Config file: {} (not found)",
            Config::default_config_path().display()
        ),
    }
    println!();

    let entries = entries(config);
    let width = entries.iter().map(|e| e.key.len()).max().unwrap_or(0);
    for entry in &entries {
        match entry.source {
            Some(source) => println!("{:width$}  {}  ({})", entry.key, entry.value, source),
            None => println!("{:width$}  {}", entry.key, entry.value),
        }
    }

    println!();
    if config.sync.is_configured() {
        println!("Sync: ready");
    } else {
        println!("Sync: off ({} not set)", config.sync.missing().join(", "));
    }
}
