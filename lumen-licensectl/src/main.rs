//! Lumen license check
//!
//! Validates the installed license file the same way the application does
//! at startup, or verifies it offline and prints its properties.
//!
//! Usage:
//!   lumen-licensectl check --file ~/license.txt
//!   lumen-licensectl inspect

use anyhow::Result;
use clap::Parser;
use lumen_license::TrustedKey;
use lumen_licensectl::{check, inspect, render_properties, Args, Command};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let config = args.config();
    info!("Using license file {:?}", config.license_file);

    match args.command.unwrap_or(Command::Check) {
        Command::Check => {
            let license = check(&config).await?;
            println!("License OK: {license}");
        }
        Command::Inspect => {
            let key = TrustedKey::embedded()?;
            let properties = inspect(&config, &key).await?;
            println!("{}", render_properties(&properties));
        }
    }

    Ok(())
}
