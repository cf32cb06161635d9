//! Where the license, the cache and the verification server live.

use crate::revalidation::RevalidationConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Overrides the license file path.
pub const ENV_LICENSE_FILE: &str = "LUMEN_LICENSE";
/// Overrides the revalidation cache path.
pub const ENV_CACHE_FILE: &str = "LUMEN_LICENSE_CACHE";
/// Overrides the verification server base URL.
pub const ENV_SERVER_URL: &str = "LUMEN_LICENSE_SERVER";

const APP_DIR: &str = "lumen";

/// Licensing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Path of the clear-signed license file.
    pub license_file: PathBuf,
    /// Path of the SQLite revalidation cache.
    pub cache_file: PathBuf,
    /// Verification server settings.
    pub revalidation: RevalidationConfig,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            license_file: app_dir(dirs::data_dir()).join("license.txt"),
            cache_file: app_dir(dirs::cache_dir()).join("license-cache.sqlite3"),
            revalidation: RevalidationConfig::default(),
        }
    }
}

impl LicenseConfig {
    /// Default configuration with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| env::var(name).ok())
    }

    /// Applies overrides looked up by environment variable name. Empty values
    /// are ignored.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(path) = lookup(ENV_LICENSE_FILE) {
            self.license_file = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_CACHE_FILE) {
            self.cache_file = PathBuf::from(path);
        }
        if let Some(url) = lookup(ENV_SERVER_URL) {
            self.revalidation.base_url = url;
        }
        self
    }
}

fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}
