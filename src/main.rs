use std::path::PathBuf;

use clap::Parser;

/// Reorganize a folder tree with a planning model.
#[derive(Debug, Parser)]
#[command(name = "tidyfold", version, about)]
struct Cli {
    /// Folder to organize.
    root: PathBuf,

    /// JSON config file. Defaults to the platform config directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip the final folder-name refinement sweep.
    #[arg(long)]
    no_refine: bool,

    /// Seconds between janitor passes.
    #[arg(long)]
    janitor_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let summary = tidyfold_lib::run(tidyfold_lib::RunOptions {
        root: cli.root,
        config_path: cli.config,
        no_refine: cli.no_refine,
        janitor_secs: cli.janitor_secs,
    })
    .await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
