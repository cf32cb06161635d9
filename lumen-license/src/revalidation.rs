//! Online revalidation of licenses with a persistent result cache.
//!
//! The raw license is posted to `{base_url}/verify/{id}`; the server answers
//! with plain text, `OK` for a license it still honors. Answers are cached
//! per license id for a fixed window so the server is contacted at most once
//! per window, and the last answer is reused while it is fresh.

use crate::error::{LicenseError, LicenseResult};
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default cache window in seconds (30 days).
pub const DEFAULT_CACHE_WINDOW_SECS: u64 = 30 * 24 * 60 * 60;

/// Response body of a server that still honors the license.
pub const VERIFIED_RESPONSE: &str = "OK";

/// Revalidation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevalidationConfig {
    /// Base URL of the verification server (e.g. `https://license.lumen.app`).
    pub base_url: String,
    /// How long a server answer is reused, in seconds.
    pub cache_window_secs: u64,
    /// Request timeout in seconds; `None` keeps the HTTP client default.
    pub timeout_secs: Option<u64>,
    /// User agent sent with verification requests.
    pub user_agent: String,
}

impl Default for RevalidationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://license.lumen.app".to_string(),
            cache_window_secs: DEFAULT_CACHE_WINDOW_SECS,
            timeout_secs: None,
            user_agent: concat!("lumen-license/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl RevalidationConfig {
    /// The cache window as a duration.
    #[must_use]
    pub fn cache_window(&self) -> TimeDelta {
        i64::try_from(self.cache_window_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    /// Verification endpoint for a license id.
    #[must_use]
    pub fn verify_url(&self, license_id: i64) -> String {
        format!("{}/verify/{license_id}", self.base_url.trim_end_matches('/'))
    }
}

/// A cached server answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub license_id: i64,
    /// Trimmed response text.
    pub response: String,
    /// When the answer was received.
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Returns true if the entry is younger than `window` at `now`. An entry
    /// stamped in the future is stale.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        let age = now.signed_duration_since(self.fetched_at);
        age >= TimeDelta::zero() && age < window
    }
}

/// Key -> (text, timestamp) store for revalidation answers.
///
/// Writes are last-write-wins.
pub trait RevalidationCache: Send + Sync {
    /// Returns the entry for a license id, if any.
    fn get(&self, license_id: i64) -> LicenseResult<Option<CacheEntry>>;

    /// Stores an entry, replacing any previous one for the same id.
    fn put(&self, entry: &CacheEntry) -> LicenseResult<()>;
}

/// In-process cache, lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<i64, CacheEntry>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RevalidationCache for MemoryCache {
    fn get(&self, license_id: i64) -> LicenseResult<Option<CacheEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| LicenseError::Storage("memory cache lock poisoned".to_string()))?;
        Ok(entries.get(&license_id).cloned())
    }

    fn put(&self, entry: &CacheEntry) -> LicenseResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| LicenseError::Storage("memory cache lock poisoned".to_string()))?;
        entries.insert(entry.license_id, entry.clone());
        Ok(())
    }
}

/// Persistent cache backed by SQLite.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Opens (or creates) a cache database at the given path.
    pub fn open(path: impl AsRef<Path>) -> LicenseResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                LicenseError::Storage(format!("failed to create cache directory: {e}"))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| LicenseError::Storage(format!("failed to open license cache: {e}")))?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory cache (for testing).
    pub fn open_in_memory() -> LicenseResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            LicenseError::Storage(format!("failed to open in-memory license cache: {e}"))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> LicenseResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS license_verification (
                license_id INTEGER PRIMARY KEY,
                response TEXT NOT NULL,
                fetched_at INTEGER NOT NULL
            );
            ",
        )
        .map_err(|e| LicenseError::Storage(format!("failed to init license cache schema: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> LicenseResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LicenseError::Storage("license cache lock poisoned".to_string()))
    }
}

impl RevalidationCache for SqliteCache {
    fn get(&self, license_id: i64) -> LicenseResult<Option<CacheEntry>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT response, fetched_at FROM license_verification WHERE license_id = ?1",
                params![license_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(|e| LicenseError::Storage(format!("failed to read license cache: {e}")))?;

        Ok(row.and_then(|(response, millis)| {
            DateTime::from_timestamp_millis(millis).map(|fetched_at| CacheEntry {
                license_id,
                response,
                fetched_at,
            })
        }))
    }

    fn put(&self, entry: &CacheEntry) -> LicenseResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO license_verification (license_id, response, fetched_at) VALUES (?1, ?2, ?3)",
            params![
                entry.license_id,
                entry.response,
                entry.fetched_at.timestamp_millis()
            ],
        )
        .map_err(|e| LicenseError::Storage(format!("failed to write license cache: {e}")))?;
        Ok(())
    }
}

/// Checks licenses with the verification server, through the cache.
pub struct Revalidator {
    config: RevalidationConfig,
    client: Client,
    cache: Arc<dyn RevalidationCache>,
    /// One lock per license id so only one request per id is in flight.
    in_flight: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl Revalidator {
    /// Creates a revalidator using the given cache.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(config: RevalidationConfig, cache: Arc<dyn RevalidationCache>) -> LicenseResult<Self> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|e| {
            LicenseError::RemoteVerificationFailed(format!("failed to create HTTP client: {e}"))
        })?;

        Ok(Self {
            config,
            client,
            cache,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &RevalidationConfig {
        &self.config
    }

    /// Confirms with the server (or a fresh cached answer) that the license
    /// is still honored.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::RemoteVerificationFailed`] carrying the server's
    /// answer when it is anything other than `OK`, or the transport failure.
    pub async fn verify(&self, license_id: i64, raw: &[u8]) -> LicenseResult<()> {
        let message = self.check(license_id, raw).await?;
        if message != VERIFIED_RESPONSE {
            return Err(LicenseError::RemoteVerificationFailed(message));
        }
        Ok(())
    }

    /// Returns the trimmed server answer for a license, from the cache when
    /// a fresh entry exists.
    pub async fn check(&self, license_id: i64, raw: &[u8]) -> LicenseResult<String> {
        if let Some(message) = self.fresh_cached(license_id) {
            return Ok(message);
        }

        let lock = self.lock_for(license_id)?;
        let result = {
            let _guard = lock.lock().await;
            self.refresh(license_id, raw).await
        };
        self.release(license_id, &lock);
        result
    }

    async fn refresh(&self, license_id: i64, raw: &[u8]) -> LicenseResult<String> {
        // Another caller may have refreshed the entry while we waited.
        if let Some(message) = self.fresh_cached(license_id) {
            return Ok(message);
        }

        let message = self.fetch(license_id, raw).await?;

        let entry = CacheEntry {
            license_id,
            response: message.clone(),
            fetched_at: Utc::now(),
        };
        if let Err(e) = self.cache.put(&entry) {
            warn!(license_id, "failed to cache license verification: {e}");
        }

        Ok(message)
    }

    fn fresh_cached(&self, license_id: i64) -> Option<String> {
        match self.cache.get(license_id) {
            Ok(Some(entry)) if entry.is_fresh(Utc::now(), self.config.cache_window()) => {
                debug!(license_id, fetched_at = %entry.fetched_at, "using cached license verification");
                Some(entry.response)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(license_id, "failed to read license verification cache: {e}");
                None
            }
        }
    }

    fn lock_for(&self, license_id: i64) -> LicenseResult<Arc<tokio::sync::Mutex<()>>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|_| LicenseError::Storage("revalidation lock poisoned".to_string()))?;
        Ok(in_flight.entry(license_id).or_default().clone())
    }

    /// Drops the per-id lock once no other caller holds or waits on it.
    fn release(&self, license_id: i64, lock: &Arc<tokio::sync::Mutex<()>>) {
        let Ok(mut in_flight) = self.in_flight.lock() else {
            return;
        };
        // One reference in the map, one held by the caller.
        if Arc::strong_count(lock) == 2 {
            in_flight.remove(&license_id);
        }
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight.lock().map(|m| m.len()).unwrap_or(0)
    }

    async fn fetch(&self, license_id: i64, raw: &[u8]) -> LicenseResult<String> {
        let url = self.config.verify_url(license_id);
        info!(license_id, %url, "verifying license online");

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(raw.to_vec())
            .send()
            .await
            .map_err(|e| {
                LicenseError::RemoteVerificationFailed(format!(
                    "failed to connect to license server: {e}"
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LicenseError::RemoteVerificationFailed(format!(
                "license server returned {status}"
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            LicenseError::RemoteVerificationFailed(format!(
                "failed to read license server response: {e}"
            ))
        })?;

        Ok(String::from_utf8_lossy(&body).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_url_joins_base_and_id() {
        let mut config = RevalidationConfig::default();
        assert_eq!(config.verify_url(42), "https://license.lumen.app/verify/42");

        config.base_url = "http://127.0.0.1:8080/".to_string();
        assert_eq!(config.verify_url(7), "http://127.0.0.1:8080/verify/7");
    }

    #[test]
    fn entry_freshness_window() {
        let now = Utc::now();
        let window = RevalidationConfig::default().cache_window();
        let entry = |age_days: i64| CacheEntry {
            license_id: 1,
            response: "OK".to_string(),
            fetched_at: now - TimeDelta::days(age_days),
        };

        assert!(entry(0).is_fresh(now, window));
        assert!(entry(29).is_fresh(now, window));
        assert!(!entry(30).is_fresh(now, window));
        assert!(!entry(31).is_fresh(now, window));
    }

    #[test]
    fn entry_from_the_future_is_stale() {
        let now = Utc::now();
        let window = RevalidationConfig::default().cache_window();
        let entry = CacheEntry {
            license_id: 1,
            response: "OK".to_string(),
            fetched_at: now + TimeDelta::days(400),
        };
        assert!(!entry.is_fresh(now, window));
        assert!(!entry.is_fresh(now, TimeDelta::MAX));
    }

    #[tokio::test]
    async fn in_flight_locks_are_released() {
        let cache = Arc::new(MemoryCache::new());
        // Unreachable server: every fetch fails, nothing is cached.
        let config = RevalidationConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let revalidator = Revalidator::new(config, cache.clone()).unwrap();

        for id in 1..=3 {
            assert!(revalidator.check(id, b"license").await.is_err());
        }
        assert_eq!(revalidator.in_flight_len(), 0);

        let (a, b, c) = tokio::join!(
            revalidator.check(4, b"license"),
            revalidator.check(4, b"license"),
            revalidator.check(4, b"license"),
        );
        assert!(a.is_err() && b.is_err() && c.is_err());
        assert_eq!(revalidator.in_flight_len(), 0);
        assert_eq!(cache.get(4).unwrap(), None);
    }

    #[test]
    fn sqlite_cache_replaces_entries() {
        let cache = SqliteCache::open_in_memory().unwrap();
        assert_eq!(cache.get(5).unwrap(), None);

        let first = CacheEntry {
            license_id: 5,
            response: "OK".to_string(),
            fetched_at: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
        };
        cache.put(&first).unwrap();
        assert_eq!(cache.get(5).unwrap(), Some(first));

        let second = CacheEntry {
            license_id: 5,
            response: "REVOKED".to_string(),
            fetched_at: DateTime::from_timestamp_millis(1_700_000_100_000).unwrap(),
        };
        cache.put(&second).unwrap();
        assert_eq!(cache.get(5).unwrap(), Some(second));
    }

    #[test]
    fn memory_cache_is_keyed_by_id() {
        let cache = MemoryCache::new();
        let entry = CacheEntry {
            license_id: 9,
            response: "OK".to_string(),
            fetched_at: Utc::now(),
        };
        cache.put(&entry).unwrap();
        assert_eq!(cache.get(9).unwrap(), Some(entry));
        assert_eq!(cache.get(10).unwrap(), None);
    }
}
