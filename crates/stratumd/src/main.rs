mod engine;
mod manifest;
mod status;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use engine::Engine;
use std::path::PathBuf;
use std::sync::Arc;
use stratum_config::DaemonConfig;
use stratum_controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stratumd")]
#[command(about = "Provision and tear down external resources from declarative requests", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: discovered stratum.yaml)
    #[arg(short, long, global = true, env = "STRATUM_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding request state and published outputs
    #[arg(long, global = true, env = "STRATUM_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Strategy record (YAML or JSON)
    #[arg(long, global = true, env = "STRATUM_STRATEGY_CONFIG")]
    strategy_config: Option<PathBuf>,

    /// Region used when a tier entry leaves it empty
    #[arg(long, global = true, env = "STRATUM_DEFAULT_REGION")]
    region: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reconciliation loop until interrupted
    Run {
        /// Concurrent reconciliations
        #[arg(short, long, env = "STRATUM_WORKERS")]
        workers: Option<usize>,
    },
    /// Create or update requests from a YAML manifest
    Apply {
        file: PathBuf,
    },
    /// Request deletion of a resource
    Delete {
        name: String,
    },
    /// Show request status
    Status {
        /// Only this request, with full detail
        name: Option<String>,
    },
    /// Reconcile one request once and print the outcome
    Reconcile {
        name: String,
    },
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => {
                let (config, path) = DaemonConfig::load_or_default()?;
                if let Some(path) = path {
                    info!(path = %path.display(), "Loaded config");
                }
                config
            }
        };

        if let Some(state_dir) = &self.state_dir {
            config.state_dir = state_dir.clone();
        }
        if let Some(strategy_config) = &self.strategy_config {
            config.strategy_config = Some(strategy_config.clone());
        }
        if let Some(region) = &self.region {
            config.default_region = region.clone();
        }
        if let Commands::Run {
            workers: Some(workers),
        } = &self.command
        {
            config.workers = *workers;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;
    let engine = Engine::build(&config)?;

    match cli.command {
        Commands::Run { .. } => run(engine, &config).await,
        Commands::Apply { file } => {
            let requests = manifest::load_requests(&file)?;
            for request in requests {
                let name = request.name.clone();
                let record = engine
                    .store
                    .apply(request)
                    .await
                    .with_context(|| format!("failed to apply {}", name))?;
                println!(
                    "{} {} ({}, tier {})",
                    "✓".green(),
                    record.request.name.cyan(),
                    record.request.kind,
                    record.request.tier
                );
            }
            Ok(())
        }
        Commands::Delete { name } => {
            engine
                .store
                .request_deletion(&name)
                .await
                .with_context(|| format!("failed to request deletion of {}", name))?;
            println!("{} deletion requested for {}", "✓".green(), name.cyan());
            Ok(())
        }
        Commands::Status { name: Some(name) } => {
            let record = engine
                .store
                .get(&name)
                .await?
                .with_context(|| format!("no request named {}", name))?;
            status::print_detail(&record);
            Ok(())
        }
        Commands::Status { name: None } => {
            let mut records = engine.store.list().await?;
            records.sort_by(|a, b| a.request.name.cmp(&b.request.name));
            status::print_table(&records);
            Ok(())
        }
        Commands::Reconcile { name } => {
            let action = engine
                .reconciler
                .reconcile(&name)
                .await
                .with_context(|| format!("failed to reconcile {}", name))?;
            if let Some(record) = engine.store.get(&name).await? {
                println!(
                    "{} {}: {}",
                    name.cyan(),
                    status::colored_phase(record.status.phase),
                    record.status.message
                );
            }
            println!("next: {}", action);
            Ok(())
        }
    }
}

async fn run(engine: Engine, config: &DaemonConfig) -> anyhow::Result<()> {
    info!(
        state_dir = %config.state_dir.display(),
        strategy_config = %config.strategy_config_path().display(),
        "Starting stratumd"
    );

    let controller = Arc::new(Controller::new(
        engine.reconciler,
        engine::worker_config(config),
    ));

    let signal_controller = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_controller.shutdown();
        }
    });

    controller.run().await;
    Ok(())
}
