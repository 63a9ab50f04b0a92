//! Main entry point for the resilient gateway CLI.

use anyhow::Result;
use clap::Parser;
use resilient_gateway::{cli, server, settings::Settings, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = cli::Cli::parse();

    // Load settings
    let mut settings = Settings::load()?;

    match args.command {
        cli::Commands::Serve { addr } => {
            if let Some(addr) = addr {
                settings.server.host = addr.ip().to_string();
                settings.server.port = addr.port();
                settings.validate()?;
            }

            telemetry::init(&settings.logging)?;
            server::serve(settings).await
        }
        cli::Commands::Config => {
            println!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}
