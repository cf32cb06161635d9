//! Command-line front end for the Lumen license check.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lumen_license::{
    check_license, read_license_file, ClearSignDocument, License, LicenseConfig,
    LicenseProperties, Revalidator, SqliteCache, TrustedKey,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "lumen-licensectl")]
#[command(about = "Validate the Lumen license file")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// License file (defaults to $LUMEN_LICENSE or the app data directory)
    #[arg(short, long, global = true)]
    pub file: Option<PathBuf>,

    /// Revalidation cache database
    #[arg(long, global = true)]
    pub cache: Option<PathBuf>,

    /// Verification server base URL
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Full check: signature, properties, expiry and online revalidation
    Check,
    /// Verify the signature and print the license properties, offline
    Inspect,
}

impl Args {
    /// Environment configuration with command-line overrides applied.
    #[must_use]
    pub fn config(&self) -> LicenseConfig {
        let mut config = LicenseConfig::from_env();
        if let Some(file) = &self.file {
            config.license_file = file.clone();
        }
        if let Some(cache) = &self.cache {
            config.cache_file = cache.clone();
        }
        if let Some(server) = &self.server {
            config.revalidation.base_url = server.clone();
        }
        config
    }
}

/// Runs the full license check.
pub async fn check(config: &LicenseConfig) -> Result<License> {
    let cache = SqliteCache::open(&config.cache_file).with_context(|| {
        format!("Failed to open license cache {}", config.cache_file.display())
    })?;
    let revalidator = Revalidator::new(config.revalidation.clone(), Arc::new(cache))?;
    let license = check_license(config, &revalidator)
        .await
        .context("BAD LICENSE")?;
    Ok(license)
}

/// Verifies the license file offline and returns its properties.
pub async fn inspect(config: &LicenseConfig, key: &TrustedKey) -> Result<LicenseProperties> {
    let bytes = read_license_file(&config.license_file)
        .await
        .context("BAD LICENSE")?;
    let document = ClearSignDocument::parse(&bytes).context("BAD LICENSE")?;
    key.verify(&document).context("BAD LICENSE")?;
    LicenseProperties::parse(document.text()).context("BAD LICENSE")
}

/// Renders properties as aligned `Key: Value` lines.
#[must_use]
pub fn render_properties(properties: &LicenseProperties) -> String {
    let width = properties.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    properties
        .iter()
        .map(|(k, v)| format!("{:>width$}: {v}", k))
        .collect::<Vec<_>>()
        .join("\n")
}
