pub mod classify;
pub mod config;
pub mod data;
pub mod index;
pub mod page;
pub mod render;
pub mod scroll;
pub mod server;
pub mod stats;
pub mod story;
pub mod surface;
pub mod tooltip;
pub mod types;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the static scrollytelling site
    Generate {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the generated site and the map API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

/// Loads every configured region concurrently, in configuration order.
async fn load_all(app_config: &config::AppConfig) -> anyhow::Result<Vec<data::RegionData>> {
    let handles: Vec<_> = app_config
        .regions
        .iter()
        .cloned()
        .map(|region| tokio::spawn(async move { data::load_region(&region).await }))
        .collect();

    let mut loaded = Vec::with_capacity(handles.len());
    for handle in handles {
        loaded.push(handle.await.context("Region loader task did not complete")??);
    }
    Ok(loaded)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Generate { config } => {
            info!("Generating site with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let scale = app_config.bin_scale()?;

            // 1. Load Data
            let loaded = load_all(&app_config).await?;

            // 2. Wire each region's story
            let mut stories: Vec<story::RegionStory> = app_config
                .regions
                .iter()
                .zip(loaded)
                .map(|(region, data)| {
                    story::RegionStory::new(region, data, scale.clone(), &app_config.output, &app_config.scroll)
                })
                .collect();

            // 3. Render Maps and Page
            page::generate_site(&app_config, &mut stories)?;

            info!("Generation complete!");
        }
        Commands::Serve { config } => {
            info!("Serving site with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            let loaded = load_all(&app_config).await?;
            let regions = app_config.regions.iter().cloned().zip(loaded).collect();

            server::start_server(app_config, regions).await?;
        }
    }

    Ok(())
}
