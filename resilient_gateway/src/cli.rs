//! Command-line interface definitions using clap derive API.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;

/// Resilient gateway CLI
#[derive(Parser)]
#[command(name = "gateway")]
#[command(about = "Circuit-breaking, cache-backed proxy for the task and user APIs")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind to, overriding server.host and server.port
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
    /// Print the effective configuration as TOML
    Config,
}
