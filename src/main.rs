//! image-harvester - container image inventory for a node and its registry.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use image_harvester::config::{Settings, DEFAULT_CONFIG_PATH};
use image_harvester::harvest::ignore::load_ignore_set;
use image_harvester::service::InventoryService;

mod logging;

#[derive(Parser)]
#[command(name = "image-harvester")]
#[command(about = "Inventory of local runtime and registry container images")]
#[command(version)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "IMAGE_HARVESTER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Address to bind, overriding `server.host`
        #[arg(long, env = "IMAGE_HARVESTER_HOST")]
        host: Option<String>,

        /// Port to bind, overriding `server.port`
        #[arg(long, env = "IMAGE_HARVESTER_PORT")]
        port: Option<u16>,
    },

    /// Print local runtime images
    Local,

    /// Print registry images
    Registry,

    /// Print both inventories merged
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut settings, problem) = Settings::load_or_default(&cli.config);
    logging::init(&settings.logging).context("Failed to initialize logging")?;
    Settings::log_load_outcome(&cli.config, problem.as_ref());

    let ignore = Arc::new(load_ignore_set(&settings.runtime.ignore_file_path));
    let service = InventoryService::from_settings(&settings, ignore)
        .context("Failed to build inventory sources")?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            image_harvester::server::serve(Arc::new(service), &settings.server)
                .await
                .context("HTTP server failed")
        }
        Commands::Local => {
            let images = service
                .local_images()
                .await
                .context("Local image listing failed")?;
            print_json(&images)
        }
        Commands::Registry => {
            let inventory = service
                .registry_inventory()
                .await
                .context("Registry harvest failed")?;
            for failure in &inventory.failures {
                eprintln!("skipped {}: {}", failure.unit, failure.error);
            }
            print_json(&inventory.images)
        }
        Commands::All => print_json(&service.unified().await),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to encode inventory")?;
    println!("{}", text);
    Ok(())
}
