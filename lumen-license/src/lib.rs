//! Licensing for Lumen.
//!
//! This module handles:
//! - Parsing clear-signed license files (OpenPGP cleartext armor)
//! - Ed25519 signature verification against the single embedded issuer key
//! - Extraction of the `Key: Value` license properties
//! - Online revalidation with a 30-day result cache
//!
//! # Pipeline
//!
//! `bytes -> ClearSignDocument -> TrustedKey::verify -> LicenseProperties ->
//! Revalidator -> License`. The first failing stage aborts; no partially
//! validated license is ever returned.
//!
//! # License Format
//!
//! The signed text is normalized before verification: every line is trimmed
//! and lines are joined with CRLF. It must contain at least:
//! - `Order`: numeric license id
//! - `Valid-Until`: last valid day, `YYYY-MM-DD`, inclusive, UTC

mod armor;
mod config;
mod error;
mod license;
mod packet;
mod properties;
mod revalidation;
mod storage;
mod verify;

pub use armor::{crc24, normalize_text, ClearSignDocument};
pub use config::{LicenseConfig, ENV_CACHE_FILE, ENV_LICENSE_FILE, ENV_SERVER_URL};
pub use error::{LicenseError, LicenseResult};
pub use license::License;
pub use packet::{HashAlgorithm, PublicKeyAlgorithm, SignaturePacket};
pub use properties::{LicenseProperties, ORDER, VALID_UNTIL};
pub use revalidation::{
    CacheEntry, MemoryCache, RevalidationCache, RevalidationConfig, Revalidator, SqliteCache,
    DEFAULT_CACHE_WINDOW_SECS, VERIFIED_RESPONSE,
};
pub use storage::{check_license, check_license_with_key, read_license_file};
pub use verify::TrustedKey;
