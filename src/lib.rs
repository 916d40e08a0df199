pub mod cleaning;
pub mod commands;
pub mod config;
pub mod crawler;
pub mod db;
pub mod export;
pub mod provider;
pub mod storage;
pub mod utils;

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use log::{error, info};

use config::AppConfig;
use export::ExportOutcome;

#[derive(Debug, Parser)]
#[command(name = "trafficflow", version, about = "Traffic flow crawler and incremental exporter")]
pub struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true, env = "TRAFFICFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll active locations during the active window until Ctrl-C.
    Crawl,
    /// Run a single collection cycle now, ignoring the active window.
    CollectOnce,
    /// Re-derive the clean store from the raw store.
    Clean {
        /// Only raw rows newer than the clean store's highest id.
        #[arg(long)]
        incremental: bool,
    },
    /// Export raw rows newer than the checkpoint to object storage.
    Export,
    /// Manage the location registry.
    #[command(subcommand)]
    Locations(LocationsCommand),
}

#[derive(Debug, Subcommand)]
pub enum LocationsCommand {
    /// Register locations from a JSON file, or the built-in set.
    Seed {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    List,
    Activate { name: String },
    Deactivate { name: String },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    utils::logging::init(cli.verbose);

    let config = match AppConfig::load(cli.config.as_deref()).and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(dispatch(cli.command, &config))
}

async fn dispatch(command: Command, config: &AppConfig) -> ExitCode {
    let result = match command {
        Command::Crawl => commands::crawl(config).await,
        Command::CollectOnce => commands::collect_once(config).await.map(|summary| {
            info!("saved {} rows, {} locations failed", summary.saved, summary.failed);
        }),
        Command::Clean { incremental } => commands::clean(config, incremental)
            .await
            .and_then(|report| {
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(())
            }),
        Command::Export => {
            return match commands::export(config).await {
                Ok(ExportOutcome::NoNewData { checkpoint }) => {
                    info!("no new data since {checkpoint}");
                    ExitCode::SUCCESS
                }
                Ok(ExportOutcome::Exported {
                    rows,
                    object_key,
                    checkpoint,
                }) => {
                    info!("exported {rows} rows to {object_key}; checkpoint now {checkpoint}");
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    error!("export failed: {:#}", anyhow::Error::new(err));
                    ExitCode::FAILURE
                }
            };
        }
        Command::Locations(LocationsCommand::Seed { file }) => {
            commands::seed_locations(config, file.as_deref()).await.map(|_| ())
        }
        Command::Locations(LocationsCommand::List) => {
            commands::list_locations(config).await.map(|locations| {
                for location in locations {
                    println!(
                        "{:>4}  {:<32}  {:>10.6}  {:>11.6}  {}",
                        location.id,
                        location.name,
                        location.lat,
                        location.lon,
                        if location.active { "active" } else { "inactive" }
                    );
                }
            })
        }
        Command::Locations(LocationsCommand::Activate { name }) => {
            commands::set_location_active(config, &name, true).await
        }
        Command::Locations(LocationsCommand::Deactivate { name }) => {
            commands::set_location_active(config, &name, false).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
