use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use failsafe_core::{FailsafeConfig, NotificationTransport, SnapshotBackend};
use failsafe_service::{export_prometheus, BatchReport};
use failsafe_storage::{RdsSnapshotBackend, SnsTransport};

mod setup;
mod telemetry;
mod template;

use setup::{consumer_runner, producer_runner, retention_manager, Side};
use telemetry::init_logging;
use template::CONFIG_TEMPLATE;

#[derive(Parser, Debug)]
#[command(name = "failsafe-replication")]
#[command(about = "Cross-account database snapshot replication", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./config/failsafe.* plus environment)
    #[arg(long, global = true, env = "FAILSAFE_CONFIG")]
    config: Option<PathBuf>,

    /// Print Prometheus metrics to stderr after the run
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Live account: prune old promoted copies, then promote the newest
    /// automatic snapshot of each instance
    Produce {
        /// Instance to process (repeatable; defaults to producer.instances)
        #[arg(long = "instance")]
        instances: Vec<String>,
    },

    /// Failsafe account: ingest every snapshot announced in a notification event
    Consume {
        /// Event JSON file, or `-` for stdin
        #[arg(long)]
        event: String,
    },

    /// Delete managed snapshots older than the retention window
    Prune {
        /// Database instance identifier
        #[arg(long)]
        instance: String,

        /// Account whose retention window applies
        #[arg(long, value_enum)]
        side: Side,

        /// List what would be deleted without deleting it
        #[arg(long, default_value = "false")]
        dry_run: bool,
    },

    /// Generate an annotated configuration file
    GenerateConfig {
        /// Output configuration file path
        #[arg(long, default_value = "failsafe.toml")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::GenerateConfig { output } = &cli.command {
        std::fs::write(output, CONFIG_TEMPLATE)?;
        println!("Configuration template written to: {}", output);
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => FailsafeConfig::from_file(path)?,
        None => FailsafeConfig::load()?,
    };
    init_logging(&config.logging);
    tracing::info!(region = %config.region, "Loaded configuration");

    let backend: Arc<dyn SnapshotBackend> = Arc::new(RdsSnapshotBackend::new(&config.region).await);

    let clean = match cli.command {
        Commands::Produce { instances } => {
            let instances = if instances.is_empty() {
                config.producer.instances.clone()
            } else {
                instances
            };

            let transport: Option<Arc<dyn NotificationTransport>> = match &config.producer.topic_arn
            {
                Some(topic_arn) => {
                    Some(Arc::new(SnsTransport::new(&config.region, topic_arn.clone()).await))
                }
                None => {
                    tracing::warn!("producer.topic_arn not set, notices will not be published");
                    None
                }
            };

            let report = producer_runner(&config, backend, transport)
                .run(&instances)
                .await;
            print_report(&report)?;
            report.is_clean()
        }

        Commands::Consume { event } => {
            let payload = if event == "-" {
                std::io::read_to_string(std::io::stdin())?
            } else {
                tokio::fs::read_to_string(&event).await?
            };

            let report = consumer_runner(&config, backend).run_event(&payload).await?;
            print_report(&report)?;
            report.is_clean()
        }

        Commands::Prune {
            instance,
            side,
            dry_run,
        } => {
            let manager = retention_manager(&config, backend, side);
            let report = if dry_run {
                manager.plan_expired(&instance).await?
            } else {
                manager.prune_expired(&instance).await?
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            report.is_clean()
        }

        Commands::GenerateConfig { .. } => true,
    };

    if cli.print_metrics {
        eprintln!("{}", export_prometheus());
    }

    if !clean {
        std::process::exit(1);
    }

    Ok(())
}

fn print_report(report: &BatchReport) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
