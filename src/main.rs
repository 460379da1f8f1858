// ABOUTME: Entry point for the podgarden CLI application.
// ABOUTME: Wires the node collaborators from configuration and dispatches commands.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use podgarden::cluster::ApiServerClient;
use podgarden::config::GardenConfig;
use podgarden::error::{Error, Result};
use podgarden::garden::{Collaborators, GardenClient};
use podgarden::identity::PasswdLookup;
use podgarden::properties::Properties;
use podgarden::runtime::BollardEngine;
use podgarden::stream::NstarCopier;
use podgarden::telemetry::KubeletClient;
use serde::Serialize;
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<GardenConfig> {
    match &cli.config {
        Some(path) => GardenConfig::load(path),
        None => {
            let cwd = env::current_dir()?;
            match GardenConfig::discover(&cwd) {
                Err(Error::ConfigNotFound(dir)) => {
                    tracing::debug!("no configuration in {}, using defaults", dir.display());
                    Ok(GardenConfig::default())
                }
                other => other,
            }
        }
    }
}

async fn connect(config: GardenConfig) -> Result<GardenClient> {
    let cluster =
        ApiServerClient::connect(&config.cluster.api_url).map_err(|e| Error::Connect {
            what: "cluster API",
            message: e.to_string(),
        })?;
    let engine = BollardEngine::connect(&config.runtime.socket).map_err(|e| Error::Connect {
        what: "runtime engine",
        message: e.to_string(),
    })?;

    let collaborators = Collaborators {
        cluster: Arc::new(cluster),
        engine: Arc::new(engine),
        telemetry: Arc::new(KubeletClient::new(
            &config.kubelet.address,
            config.kubelet.port,
        )),
        users: Arc::new(PasswdLookup),
        copier: Arc::new(NstarCopier::new(
            &config.stream.nstar_bin,
            &config.stream.tar_bin,
        )),
    };

    Ok(GardenClient::connect(collaborators, config).await?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct ContainerSummary {
    handle: String,
    properties: Properties,
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let client = connect(config).await?;

    match cli.command {
        Commands::Ping => {
            client.ping().await?;
            println!("ok");
            Ok(())
        }
        Commands::Capacity => print_json(&client.capacity()),
        Commands::List { properties } => {
            let filter: Properties = properties.into_iter().collect();
            let summaries: Vec<_> = client
                .containers(filter)
                .iter()
                .map(|c| ContainerSummary {
                    handle: c.handle().to_string(),
                    properties: c.properties(),
                })
                .collect();
            print_json(&summaries)
        }
        Commands::Destroy { handle } => {
            client.destroy(&handle).await?;
            println!("destroyed {}", handle);
            Ok(())
        }
        Commands::Metrics { handles } => print_json(&client.bulk_metrics(&handles).await?),
    }
}
