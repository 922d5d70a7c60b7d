mod daemon;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use thor_config::AppConfig;

#[derive(Debug, Parser)]
#[command(
    name = "thor",
    version,
    about = "Continuous knowledge acquisition core for Thor assistants"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "config/thor.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the learner (detached; use --foreground to stay attached).
    Start {
        /// Worker idle interval in seconds.
        #[arg(long)]
        interval: Option<u64>,
        /// Size of the crawl worker pool.
        #[arg(long)]
        workers: Option<usize>,
        /// Path to the knowledge store file.
        #[arg(long)]
        db: Option<String>,
        /// Path to the bootstrap dictionary.
        #[arg(long)]
        dictionary: Option<String>,
        #[arg(long)]
        foreground: bool,
    },
    /// Signal a running learner to shut down.
    Stop,
    /// Print the learner's status document as JSON.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = AppConfig::load_from(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.telemetry.log_level.clone())),
        )
        .init();

    match cli.command {
        Commands::Start {
            interval,
            workers,
            db,
            dictionary,
            foreground,
        } => {
            if let Some(interval) = interval {
                config.learner.search_interval_secs = interval;
            }
            if let Some(workers) = workers {
                config.learner.workers = workers;
            }
            if let Some(db) = db {
                config.learner.db_path = db;
            }
            if let Some(dictionary) = dictionary {
                config.learner.dictionary_path = dictionary;
            }

            let is_daemon_child =
                std::env::var("THOR_LEARNER_PROCESS").ok().as_deref() == Some("1");
            if foreground || is_daemon_child {
                daemon::run_learner_process(config).await
            } else {
                daemon::daemon_start(&config, &cli.config)
            }
        }
        Commands::Stop => daemon::daemon_stop(&config),
        Commands::Status => daemon::daemon_status(&config),
    }
}
