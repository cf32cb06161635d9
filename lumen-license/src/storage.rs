//! Loading the license file and the startup license check.

use crate::config::LicenseConfig;
use crate::error::{LicenseError, LicenseResult};
use crate::license::License;
use crate::revalidation::Revalidator;
use crate::verify::TrustedKey;
use std::path::Path;
use tracing::info;

/// Reads the raw license file.
///
/// # Errors
///
/// Returns [`LicenseError::FileMissing`] if the file cannot be read.
pub async fn read_license_file(path: &Path) -> LicenseResult<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| LicenseError::FileMissing {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Loads the configured license, validates it, and requires it to be within
/// its validity period.
///
/// # Errors
///
/// Any validation error, or [`LicenseError::Expired`] for a license whose
/// Valid-Until date has passed.
pub async fn check_license(config: &LicenseConfig, revalidator: &Revalidator) -> LicenseResult<License> {
    let key = TrustedKey::embedded()?;
    check_license_with_key(config, &key, revalidator).await
}

/// Same as [`check_license`] with an explicit key.
pub async fn check_license_with_key(
    config: &LicenseConfig,
    key: &TrustedKey,
    revalidator: &Revalidator,
) -> LicenseResult<License> {
    let bytes = read_license_file(&config.license_file).await?;
    let license = License::load_and_validate_with_key(bytes, key, revalidator).await?;
    license.ensure_valid()?;
    info!(license = %license, "license verified");
    Ok(license)
}
