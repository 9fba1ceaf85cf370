//! # deskbot CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `deskbot init` | Create the SQLite database and schema |
//! | `deskbot serve` | Start the HTTP server |
//! | `deskbot settings set <owner>` | Create or replace an owner's configuration |
//! | `deskbot settings get <owner>` | Print an owner's configuration as JSON |
//! | `deskbot prompt <owner> <message>` | Print the prompt that would be sent to the model |
//!
//! ## Examples
//!
//! ```bash
//! deskbot --config ./config/deskbot.toml init
//! deskbot settings set acme --business-name "Acme" --knowledge "Open 9-5 Mon-Fri"
//! deskbot prompt acme "what are your hours?"
//! GEMINI_API_KEY=... deskbot serve
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use deskbot::config;
use deskbot::db;
use deskbot::error::NOT_CONFIGURED;
use deskbot::migrate;
use deskbot::models::SettingsUpdate;
use deskbot::prompt::build_prompt;
use deskbot::server;
use deskbot::store::{ConfigStore, SqliteStore};

/// deskbot — a knowledge-grounded support chat backend for website widgets.
#[derive(Parser)]
#[command(name = "deskbot", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/deskbot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Read or write owner configurations.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Print the assembled prompt for an owner and message without calling the model.
    Prompt {
        /// Owner identifier.
        owner_id: String,
        /// Visitor message.
        message: String,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Create or fully replace an owner's configuration.
    ///
    /// Fields that are not given are cleared.
    Set {
        owner_id: String,
        #[arg(long)]
        business_name: Option<String>,
        #[arg(long)]
        support_email: Option<String>,
        #[arg(long, conflicts_with = "knowledge_file")]
        knowledge: Option<String>,
        /// Read the knowledge text from a file.
        #[arg(long)]
        knowledge_file: Option<PathBuf>,
    },
    /// Print an owner's configuration as JSON.
    Get { owner_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("deskbot=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::init_database(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Settings { action } => {
            let store = SqliteStore::new(db::lazy_pool(&cfg.db));
            match action {
                SettingsAction::Set {
                    owner_id,
                    business_name,
                    support_email,
                    knowledge,
                    knowledge_file,
                } => {
                    let knowledge = match knowledge_file {
                        Some(path) => Some(std::fs::read_to_string(&path).with_context(|| {
                            format!("Failed to read knowledge file: {}", path.display())
                        })?),
                        None => knowledge,
                    };
                    let owner_id = owner_id.trim().to_string();
                    if owner_id.is_empty() {
                        bail!("owner ID is required");
                    }
                    let stored = store
                        .upsert(&SettingsUpdate {
                            owner_id,
                            business_name,
                            support_email,
                            knowledge,
                        })
                        .await?;
                    println!("{}", serde_json::to_string_pretty(&stored)?);
                }
                SettingsAction::Get { owner_id } => match store.find(owner_id.trim()).await? {
                    Some(found) => println!("{}", serde_json::to_string_pretty(&found)?),
                    None => println!("null"),
                },
            }
        }
        Commands::Prompt { owner_id, message } => {
            let store = SqliteStore::new(db::lazy_pool(&cfg.db));
            let Some(found) = store.find(owner_id.trim()).await? else {
                bail!("{} (owner: {})", NOT_CONFIGURED, owner_id);
            };
            println!("{}", build_prompt(&found, &message));
        }
    }

    Ok(())
}
