//! Conductor operator CLI.

use anyhow::Context;
use clap::{Parser, Subcommand};
use conductor_config::ServiceConfig;
use conductor_core::PipelineKind;
use conductor_db::{Ledger, MetricQuery, create_pool};
use conductor_lock::WorkspaceLock;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(about = "Conductor operator CLI", long_about = None)]
struct Cli {
    /// Path to the service configuration
    #[arg(long, env = "CONDUCTOR_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Conductor server URL
    #[arg(long, env = "CONDUCTOR_API_URL", default_value = "http://localhost:8080", global = true)]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or release the workspace lock
    Lock {
        #[command(subcommand)]
        command: LockCommands,
    },
    /// Manage integration configuration entries
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Inspect the pipeline ledger
    Pipelines {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Inspect issue-tracker notifications
    Notifications {
        #[command(subcommand)]
        command: NotificationCommands,
    },
    /// Inspect ingested external files
    Files {
        #[command(subcommand)]
        command: FileCommands,
    },
    /// Show the coordinator's operation log
    Operations {
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Show recorded system metrics
    Metrics {
        /// Only samples with this metric name
        #[arg(long)]
        name: Option<String>,
        /// Only samples reported by this service
        #[arg(long)]
        service: Option<String>,
        #[arg(long, default_value = "24")]
        hours: i32,
        #[arg(long, default_value = "50")]
        limit: i64,
    },
    /// Show the server's active pipelines
    Status,
}

#[derive(Subcommand)]
enum LockCommands {
    /// Show whether the lock is held and by whom
    Status,
    /// Forcefully remove the lock file
    Release {
        /// Who is releasing the lock, recorded in the log
        #[arg(long)]
        label: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print one entry
    Get { service: String, key: String },
    /// Create or update an entry
    Set {
        service: String,
        key: String,
        value: String,
        /// Hide the value from listings
        #[arg(long)]
        secret: bool,
        #[arg(long)]
        description: Option<String>,
    },
    /// List the non-secret entries of a service
    List { service: String },
}

#[derive(Subcommand)]
enum PipelineCommands {
    /// List recent pipelines
    Recent {
        /// Filter by type (sync, file-ingest)
        #[arg(long = "type")]
        kind: Option<PipelineKind>,
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Show one pipeline with its latest analysis
    Show { id: String },
    /// Aggregate statistics
    Stats {
        #[arg(long, default_value = "7")]
        days: i32,
    },
    /// Daily quality averages of a project
    Trends {
        project_key: String,
        #[arg(long, default_value = "30")]
        days: i32,
    },
}

#[derive(Subcommand)]
enum NotificationCommands {
    /// List notifications waiting for delivery
    Pending {
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum FileCommands {
    /// List files waiting to be processed
    Pending,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ServiceConfig::load(cli.config.as_deref()).context("loading configuration")?;

    let output = match cli.command {
        Commands::Lock { command } => {
            let lock = WorkspaceLock::new(&config.lock.path);
            match command {
                LockCommands::Status => commands::lock::status(&lock)?,
                LockCommands::Release { label } => commands::lock::release(&lock, &label)?,
            }
        }
        Commands::Status => commands::status::show(&cli.api_url).await?,
        Commands::Config { command } => {
            let ledger = connect(&config).await?;
            match command {
                ConfigCommands::Get { service, key } => commands::config::get(&ledger, &service, &key).await?,
                ConfigCommands::Set {
                    service,
                    key,
                    value,
                    secret,
                    description,
                } => {
                    commands::config::set(&ledger, &service, &key, &value, secret, description.as_deref())
                        .await?
                }
                ConfigCommands::List { service } => commands::config::list(&ledger, &service).await?,
            }
        }
        Commands::Pipelines { command } => {
            let ledger = connect(&config).await?;
            match command {
                PipelineCommands::Recent { kind, limit } => commands::pipelines::recent(&ledger, kind, limit).await?,
                PipelineCommands::Show { id } => commands::pipelines::show(&ledger, &id).await?,
                PipelineCommands::Stats { days } => commands::pipelines::stats(&ledger, days).await?,
                PipelineCommands::Trends { project_key, days } => {
                    commands::pipelines::trends(&ledger, &project_key, days).await?
                }
            }
        }
        Commands::Notifications { command } => {
            let ledger = connect(&config).await?;
            match command {
                NotificationCommands::Pending { limit } => commands::notifications::pending(&ledger, limit).await?,
            }
        }
        Commands::Files { command } => {
            let ledger = connect(&config).await?;
            match command {
                FileCommands::Pending => commands::files::pending(&ledger).await?,
            }
        }
        Commands::Operations { limit } => {
            let ledger = connect(&config).await?;
            commands::activity::operations(&ledger, limit).await?
        }
        Commands::Metrics {
            name,
            service,
            hours,
            limit,
        } => {
            let ledger = connect(&config).await?;
            let query = MetricQuery {
                name,
                service,
                hours_back: hours,
                limit,
            };
            commands::activity::metrics(&ledger, &query).await?
        }
    };

    print!("{}", output);
    Ok(())
}

async fn connect(config: &ServiceConfig) -> anyhow::Result<Ledger> {
    let pool = create_pool(&config.database.url, 2)
        .await
        .context("connecting to the ledger database")?;
    Ok(Ledger::postgres(pool))
}
