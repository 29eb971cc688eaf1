use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use archflow::{
    LocalEchoAgent, PipelineOrchestrator, PipelinePlan, PoolRegistry, PoolSettings,
    ProcessTransport, StaticSpecLookup, StepKind,
};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "archflow", version, about = "ArchFlow CLI", author)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the three-step pipeline against a spec table.
    Run {
        /// JSON file mapping server names to launch specs.
        #[arg(long)]
        specs: PathBuf,
        /// Comma-separated server names to use for this run.
        #[arg(long, default_value = "knowledge")]
        servers: String,
        /// The natural-language requirement.
        #[arg(long)]
        requirement: String,
        #[arg(long, default_value_t = false)]
        skip_diagram: bool,
        #[arg(long, default_value_t = false)]
        skip_cost: bool,
        /// Seconds to wait for a pooled client.
        #[arg(long, default_value_t = 30.0)]
        acquire_timeout: f64,
        /// Print pool statistics after the run.
        #[arg(long, default_value_t = false)]
        stats: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    archflow::LoggingConfig::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            specs,
            servers,
            requirement,
            skip_diagram,
            skip_cost,
            acquire_timeout,
            stats,
        } => {
            handle_run(
                specs,
                servers,
                requirement,
                skip_diagram,
                skip_cost,
                acquire_timeout,
                stats,
            )
            .await?
        }
    }
    Ok(())
}

async fn handle_run(
    specs: PathBuf,
    servers: String,
    requirement: String,
    skip_diagram: bool,
    skip_cost: bool,
    acquire_timeout: f64,
    stats: bool,
) -> anyhow::Result<()> {
    let lookup = StaticSpecLookup::from_json_file(&specs)?;

    let registry = Arc::new(PoolRegistry::new(
        Arc::new(ProcessTransport::new()),
        PoolSettings::from_env(),
    ));
    let orchestrator = PipelineOrchestrator::new(Arc::clone(&registry), Arc::new(LocalEchoAgent))
        .with_acquire_timeout(Duration::from_secs_f64(acquire_timeout));

    let plan = PipelinePlan::standard()
        .enable(StepKind::Diagram, !skip_diagram)
        .enable(StepKind::Cost, !skip_cost);

    let server_names: Vec<String> = servers
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let run = orchestrator
        .run(&requirement, &server_names, &lookup, &plan)
        .await?;
    println!("{}", serde_json::to_string_pretty(&run)?);

    if stats {
        let all = registry.stats_all().await;
        println!("{}", serde_json::to_string_pretty(&all)?);
    }

    registry.shutdown_all().await;
    Ok(())
}
