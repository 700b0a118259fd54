use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use govscore_pipeline::{Pipeline, PipelineConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "govscore")]
#[command(about = "Link DAO forum discussion with Snapshot votes and build proposal scorecards")]
struct Cli {
    /// Directory holding the crawler corpora and the outputs
    #[arg(long, global = true, env = "GOVSCORE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// YAML file overriding engine thresholds
    #[arg(long, global = true, env = "GOVSCORE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Link proposals with forum posts and votes
    Link,
    /// Build scorecards from previously linked proposals
    Score,
    /// Link then score, and write the run manifest
    Run,
    /// Print the effective engine configuration as YAML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::from_env();
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(path) = cli.config {
        config.engine_config_path = Some(path);
    }
    let engine = config.load_engine_config()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Link => {
            let summary = Pipeline::new(config, engine)?.link().await?;
            println!("linked {} proposals -> {}", summary.records, summary.output);
        }
        Commands::Score => {
            let summary = Pipeline::new(config, engine)?.score().await?;
            println!("built {} scorecards -> {}", summary.records, summary.output);
        }
        Commands::Run => {
            let summary = Pipeline::new(config, engine)?.run_once().await?;
            info!(run_id = %summary.run_id, "govscore run finished");
            println!(
                "run complete: run_id={} proposals={} linked={} scorecards={} manifest={}",
                summary.run_id,
                summary.proposals,
                summary.linked_path,
                summary.scorecards_path,
                summary.manifest_path
            );
        }
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&engine)?);
        }
    }

    Ok(())
}
