//! OAuth Token Storage
//!
//! The installation holds at most one eBay token record. [`TokenStore`]
//! exposes exactly that: read the record, replace it as a whole, delete it.
//! There is no way to hold two records or to update a single field.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::{Error, Result};

/// Access tokens within this many seconds of expiry are refreshed before use
pub const REFRESH_BUFFER_SECS: i64 = 5 * 60;

/// The persisted eBay OAuth token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Short-lived bearer credential
    pub access_token: String,

    /// Long-lived credential used to mint new access tokens
    pub refresh_token: String,

    /// When the access token stops working
    pub access_expires_at: DateTime<Utc>,

    /// When the refresh token stops working
    pub refresh_expires_at: DateTime<Utc>,

    /// Granted scopes, in request order
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Last time the record was written
    pub updated_at: DateTime<Utc>,
}

/// Where a record sits in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No record stored
    Absent,
    /// Access token usable as-is
    Valid,
    /// Access token inside the refresh buffer; refresh before use
    AccessExpiring,
    /// Refresh token expired; only reauthorization helps
    RefreshExpired,
}

impl TokenRecord {
    /// Build a record from an issuing response received at `received_at`.
    ///
    /// Expiry timestamps are always `received_at + lifetime`.
    #[must_use]
    pub fn from_response(
        access_token: String,
        refresh_token: String,
        expires_in: u64,
        refresh_token_expires_in: u64,
        scopes: Vec<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            access_expires_at: received_at + seconds(expires_in),
            refresh_expires_at: received_at + seconds(refresh_token_expires_in),
            scopes,
            updated_at: received_at,
        }
    }

    /// Lifecycle state at `now`
    #[must_use]
    pub fn state_at(&self, now: DateTime<Utc>) -> TokenState {
        if self.refresh_expires_at <= now {
            TokenState::RefreshExpired
        } else if self.access_expires_at - TimeDelta::seconds(REFRESH_BUFFER_SECS) <= now {
            TokenState::AccessExpiring
        } else {
            TokenState::Valid
        }
    }

    /// Whether the refresh token has expired at `now`
    #[must_use]
    pub fn refresh_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.state_at(now) == TokenState::RefreshExpired
    }
}

impl TokenState {
    /// State of an optional record at `now`
    #[must_use]
    pub fn of(record: Option<&TokenRecord>, now: DateTime<Utc>) -> Self {
        record.map_or(Self::Absent, |r| r.state_at(now))
    }
}

fn seconds(secs: u64) -> TimeDelta {
    let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::from(u32::MAX));
    TimeDelta::seconds(secs)
}

/// Single-record token persistence
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read the record, if one exists
    async fn get(&self) -> Result<Option<TokenRecord>>;

    /// Store `record`, replacing any existing one wholesale
    async fn replace(&self, record: &TokenRecord) -> Result<()>;

    /// Remove the record. Removing an absent record is not an error.
    async fn delete(&self) -> Result<()>;
}

/// Token store backed by a single JSON file.
///
/// Each write goes to its own owner-only sibling temp file that is renamed
/// over the target, so a reader never observes half of one issuance and
/// half of another, and overlapping writers both succeed (last one wins).
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Create a store at `path`, creating the parent directory if needed
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Storage(format!("Failed to create token storage dir: {e}"))
                })?;
            }
        }
        Ok(Self { path })
    }

    /// Path of the token file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling temp path, unique per write so overlapping writers never
    /// rename each other's file
    fn temp_path(&self) -> PathBuf {
        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}.{seq}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }
}

static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Create `path` owner-only (0600 on unix) and write `content` to it
async fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(content).await?;
    file.sync_all().await
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self) -> Result<Option<TokenRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored token");
                return Ok(None);
            }
            Err(e) => return Err(Error::Storage(format!("Failed to retrieve tokens: {e}"))),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| Error::Storage(format!("Failed to parse stored tokens: {e}")))
    }

    async fn replace(&self, record: &TokenRecord) -> Result<()> {
        let content = serde_json::to_vec_pretty(record)
            .map_err(|e| Error::Storage(format!("Failed to serialize tokens: {e}")))?;

        let tmp = self.temp_path();
        if let Err(e) = write_private(&tmp, &content).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::Storage(format!("Failed to store tokens: {e}")));
        }

        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::Storage(format!("Failed to store tokens: {e}")));
        }

        info!(path = %self.path.display(), "Saved eBay token");
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Deleted eBay token");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("Failed to delete tokens: {e}"))),
        }
    }
}

/// In-process token store
#[derive(Default)]
pub struct MemoryTokenStore {
    record: RwLock<Option<TokenRecord>>,
}

impl MemoryTokenStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `record`
    #[must_use]
    pub fn with_record(record: TokenRecord) -> Self {
        Self {
            record: RwLock::new(Some(record)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self) -> Result<Option<TokenRecord>> {
        Ok(self.record.read().clone())
    }

    async fn replace(&self, record: &TokenRecord) -> Result<()> {
        *self.record.write() = Some(record.clone());
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        *self.record.write() = None;
        Ok(())
    }
}
