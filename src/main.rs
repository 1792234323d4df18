pub mod aggregate;
pub mod boundaries;
pub mod config;
pub mod departments;
pub mod error;
pub mod narrative;
pub mod projection;
pub mod records;
pub mod render;
pub mod server;
pub mod state;
pub mod types;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the locality ranking and the narrative for one locality
    Report {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Locality to summarize; defaults to the configured one
        #[arg(short, long)]
        locality: Option<String>,
        /// Number of localities in the ranking
        #[arg(short = 'n', long)]
        top_n: Option<usize>,
    },
    /// Draw the map layers into a static PNG
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the dashboard API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Report { config, locality, top_n } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let data = Arc::new(load_datasets(&app_config)?);

            let top_n = top_n.unwrap_or(app_config.dashboard.top_n);
            let mut dashboard = state::Dashboard::new(Arc::clone(&data), top_n);
            print!("{}", narrative::render_ranking(dashboard.ranking()));

            // Same default as the selector: the configured locality or the
            // first one alphabetically.
            let selected = locality
                .clone()
                .or_else(|| app_config.dashboard.default_locality.clone())
                .or_else(|| data.localities.first().cloned());
            if let Some(selected) = selected {
                let summary = dashboard.select(&selected)?;
                println!();
                print!("{}", narrative::render_panel(summary));
            }
        }
        Commands::Render { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let data = load_datasets(&app_config)?;
            render::render_overview(&app_config, &data)?;
        }
        Commands::Serve { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let data = Arc::new(load_datasets(&app_config)?);
            server::start_server(app_config, data).await?;
        }
    }

    Ok(())
}

fn load_datasets(config: &config::AppConfig) -> anyhow::Result<state::Datasets> {
    state::Datasets::load(config).context("Failed to load dashboard datasets")
}
