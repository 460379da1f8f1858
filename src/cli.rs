// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines the operator subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "podgarden")]
#[command(about = "Container lifecycle on top of cluster pods and a node runtime")]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file (discovered in the current directory otherwise)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that the runtime engine is serving
    Ping,

    /// Show node capacity
    Capacity,

    /// List containers matching every property filter
    List {
        /// Property filter as key=value (repeatable)
        #[arg(short, long = "property", value_parser = parse_property)]
        properties: Vec<(String, String)>,
    },

    /// Destroy a container
    Destroy {
        /// Container handle
        handle: String,
    },

    /// Show usage metrics for containers
    Metrics {
        /// Container handles
        #[arg(required = true)]
        handles: Vec<String>,
    },
}

fn parse_property(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got {:?}", s)),
    }
}
