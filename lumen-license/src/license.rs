//! The validated license value.

use crate::armor::ClearSignDocument;
use crate::error::{LicenseError, LicenseResult};
use crate::properties::LicenseProperties;
use crate::revalidation::Revalidator;
use crate::verify::TrustedKey;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// A license that passed every validation stage.
///
/// Only [`License::load_and_validate`] creates one; there is no partially
/// validated license. Whether it is still within its validity period is a
/// separate question answered by [`License::is_valid`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct License {
    id: i64,
    /// End of the Valid-Until day (UTC), milliseconds since epoch.
    expires_at_millis: i64,
    properties: LicenseProperties,
    #[serde(skip)]
    raw: Vec<u8>,
}

impl License {
    /// Parses, verifies and revalidates a license against the embedded key.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that fails.
    pub async fn load_and_validate(bytes: Vec<u8>, revalidator: &Revalidator) -> LicenseResult<Self> {
        let key = TrustedKey::embedded()?;
        Self::load_and_validate_with_key(bytes, &key, revalidator).await
    }

    /// Same as [`License::load_and_validate`] with an explicit key.
    /// Used for testing with a generated key pair.
    pub async fn load_and_validate_with_key(
        bytes: Vec<u8>,
        key: &TrustedKey,
        revalidator: &Revalidator,
    ) -> LicenseResult<Self> {
        debug!(len = bytes.len(), "parsing license");
        let document = ClearSignDocument::parse(&bytes)?;

        debug!("verifying license signature");
        key.verify(&document)?;

        debug!("extracting license properties");
        let properties = LicenseProperties::parse(document.text())?;
        let id = properties.order_id()?;
        let expires_at_millis = properties.expires_at()?.timestamp_millis();

        debug!(license_id = id, "revalidating license");
        revalidator.verify(id, &bytes).await?;

        Ok(Self {
            id,
            expires_at_millis,
            properties,
            raw: bytes,
        })
    }

    /// The license (order) id.
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Last valid instant, in UTC.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.expires_at_millis).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    #[must_use]
    pub fn expires_at_millis(&self) -> i64 {
        self.expires_at_millis
    }

    /// All properties of the signed text, in document order.
    #[must_use]
    pub fn properties(&self) -> &LicenseProperties {
        &self.properties
    }

    /// The license file exactly as it was loaded.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Returns true until the Valid-Until day has passed (UTC).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Returns true if `now` falls before the start of the day after
    /// Valid-Until.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        // The stored expiry is the last whole second of the day.
        now.timestamp_millis() < self.expires_at_millis.saturating_add(1000)
    }

    /// Fails with [`LicenseError::Expired`] if the license is no longer valid.
    pub fn ensure_valid(&self) -> LicenseResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(LicenseError::Expired(self.to_string()))
        }
    }
}

impl fmt::Display for License {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Valid-Until: {})",
            self.id,
            self.expires_at().format("%Y-%m-%d")
        )
    }
}
