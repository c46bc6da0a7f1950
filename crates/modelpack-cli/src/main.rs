mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(
    name = "modelpack",
    about = "Generate Dockerfiles for machine-learning model services"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a modelpack.toml in the current directory
    Init,
    /// Print the generated Dockerfile
    Dockerfile {
        /// Project directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Copy the whole workspace in a single layer
        #[arg(long)]
        no_group_files: bool,
        /// Write to this file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Keep the staging directory for a following docker build
        #[arg(long)]
        keep_staging: bool,
    },
    /// Show how the workspace is split into COPY layers
    Plan {
        /// Project directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => commands::init_project()?,
        Commands::Dockerfile {
            dir,
            no_group_files,
            output,
            keep_staging,
        } => commands::dockerfile(&dir, no_group_files, output.as_deref(), keep_staging)?,
        Commands::Plan { dir, json } => commands::plan(&dir, json)?,
    }

    Ok(())
}
