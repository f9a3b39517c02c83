//! hookrun - cron-scheduled webhook runner.
//!
//! Usage:
//!   hookrun run [--config FILE]            Poll for due tasks until Ctrl+C
//!   hookrun replay <TASK_ID> <DLQ_ID>      Replay one dead-letter entry
//!   hookrun next <CRON> [--count N]        Print upcoming occurrences

use chrono::Utc;
use clap::{Parser, Subcommand};
use hookrun::{
    ConfigError, DeadLetterId, EngineConfig, Event, EventBus, EventHandler, InMemoryStorage,
    Schedule, Scheduler, Storage, StorageConfig, TaskId, YamlLoader, api,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// hookrun - cron-scheduled webhook runner
#[derive(Parser)]
#[command(name = "hookrun")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by commands that open storage.
#[derive(clap::Args)]
struct StoreArgs {
    /// Path to a YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config and HOOKRUN_DATABASE)
    #[arg(short, long, value_name = "PATH")]
    database: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until interrupted
    Run {
        #[command(flatten)]
        store: StoreArgs,

        /// Seconds between due-checks (overrides config)
        #[arg(long)]
        poll_interval: Option<u64>,

        /// Do not start the HTTP API
        #[arg(long)]
        no_api: bool,
    },

    /// Replay one dead-letter entry and print the outcome
    Replay {
        #[arg(value_name = "TASK_ID")]
        task_id: i64,

        #[arg(value_name = "DLQ_ID")]
        dlq_id: i64,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Print the next occurrences of a cron expression
    Next {
        #[arg(value_name = "CRON")]
        expression: String,

        /// Number of occurrences to print
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
    },
}

/// Logs dispatch and dead-letter events.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::RetryScheduled {
                task_id,
                attempt,
                delay,
                ..
            } => {
                info!("Task {} attempt {} failed, retrying in {:?}", task_id, attempt, delay);
            }
            Event::DeadLettered {
                task_id,
                dead_letter_id,
                ..
            } => {
                warn!(
                    "Task {} dead-lettered (replay with: hookrun replay {} {})",
                    task_id, task_id, dead_letter_id
                );
            }
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            store,
            poll_interval,
            no_api,
        } => {
            let mut config = load_config(&store)?;
            if let Some(secs) = poll_interval {
                config.poll_interval_secs = secs;
            }
            config.validate()?;
            match config.storage.clone() {
                StorageConfig::Memory => {
                    warn!("Using in-memory storage; nothing will be persisted");
                    run_engine(Arc::new(InMemoryStorage::new()), config, no_api).await?;
                }
                StorageConfig::Sqlite { path } => {
                    run_engine(open_sqlite(&path).await?, config, no_api).await?;
                }
            }
        }
        Commands::Replay {
            task_id,
            dlq_id,
            store,
        } => {
            let config = load_config(&store)?;
            config.validate()?;
            let ids = (TaskId::new(task_id), DeadLetterId::new(dlq_id));
            match config.storage.clone() {
                StorageConfig::Memory => {
                    replay(Arc::new(InMemoryStorage::new()), &config, ids).await?;
                }
                StorageConfig::Sqlite { path } => {
                    replay(open_sqlite(&path).await?, &config, ids).await?;
                }
            }
        }
        Commands::Next { expression, count } => {
            print_next(&expression, count)?;
        }
    }

    Ok(())
}

/// Defaults, then the YAML file, then the environment, then CLI flags.
fn load_config(store: &StoreArgs) -> Result<EngineConfig, ConfigError> {
    let mut config = match &store.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            YamlLoader::load_engine_config(path)?
        }
        None => EngineConfig::default(),
    };
    config.apply_process_env()?;
    if let Some(path) = &store.database {
        config.storage = StorageConfig::Sqlite { path: path.clone() };
    }
    Ok(config)
}

#[cfg(feature = "sqlite")]
async fn open_sqlite(
    path: &str,
) -> Result<Arc<hookrun::SqliteStorage>, Box<dyn std::error::Error>> {
    info!("Opening database: {}", path);
    let storage = hookrun::SqliteStorage::new(path).await.map_err(|e| {
        error!("Failed to open database '{}': {}", path, e);
        e
    })?;
    Ok(Arc::new(storage))
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite(path: &str) -> Result<Arc<InMemoryStorage>, Box<dyn std::error::Error>> {
    Err(format!("cannot open '{}': built without the sqlite feature", path).into())
}

/// Run the scheduler (and API) until Ctrl+C.
async fn run_engine<S: Storage + 'static>(
    storage: Arc<S>,
    config: EngineConfig,
    no_api: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let event_bus = EventBus::new();
    event_bus.register(Arc::new(LoggingHandler)).await;

    let scheduler = Arc::new(
        Scheduler::with_storage(storage)
            .with_config(&config)
            .with_event_bus(event_bus),
    );

    let handle = scheduler.start();
    match &handle {
        Some(_) => info!(
            "Scheduler running (poll interval: {}s, max retries: {})",
            config.poll_interval_secs, config.max_retries
        ),
        None => info!("Worker disabled; only the API is served"),
    }

    let server = if no_api {
        None
    } else {
        let state = api::create_api_state(Arc::clone(&scheduler));
        Some(api::start_server(&config.api, state).await?)
    };

    if handle.is_none() && server.is_none() {
        warn!("Nothing to run: worker disabled and API turned off");
        return Ok(());
    }

    info!("Press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    if let Some(handle) = handle {
        handle.shutdown().await?;
    }
    if let Some(server) = server {
        server.abort();
    }

    info!("Goodbye!");
    Ok(())
}

/// Replay one dead-letter entry.
async fn replay<S: Storage + 'static>(
    storage: Arc<S>,
    config: &EngineConfig,
    (task_id, dlq_id): (TaskId, DeadLetterId),
) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = Scheduler::with_storage(storage).with_config(config);

    let outcome = scheduler.replay(task_id, dlq_id).await?;
    let code = outcome
        .status_code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    if outcome.is_success() {
        println!("ok: status {} in {}ms", code, outcome.latency_ms());
    } else {
        println!(
            "failed: status {} in {}ms: {}",
            code,
            outcome.latency_ms(),
            outcome.error().unwrap_or_default()
        );
    }
    Ok(())
}

/// Print the next `count` occurrences of a cron expression.
fn print_next(expression: &str, count: usize) -> Result<(), Box<dyn std::error::Error>> {
    let schedule = Schedule::new(expression)?;
    let now = Utc::now();
    println!("Next {} occurrence(s) of '{}' after {}:", count, expression, now);
    for next in schedule.next_n_after(now, count) {
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        println!("  {}  (in {}s)", next, wait.as_secs());
    }
    Ok(())
}
