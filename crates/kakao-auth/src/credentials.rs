//! Durable storage for the Kakao token pair
//!
//! A single JSON record (`access_token`, `refresh_token`, `expires_at`) at a
//! fixed path. All writes use atomic temp-file + fsync + rename, so a reader
//! sees either the previous record or the new one, never a torn write.
//!
//! The store is owned by the token manager; nothing else mutates the record.
//! Placeholder values from configuration (`EMPTY`, `NONE`, ...) are collapsed
//! to `None` here, once, at load time.

use std::path::{Path, PathBuf};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Placeholder strings used in CI configuration to mean "no token".
const SENTINELS: &[&str] = &["EMPTY", "NONE", "NULL"];

/// The live token pair.
///
/// `expires_at` is a unix timestamp in milliseconds (absolute, not a delta),
/// computed from the token endpoint's `expires_in` when known.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CredentialSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<Secret<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<Secret<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

/// Partial update applied by [`CredentialStore::merge`]. `None` fields are
/// left untouched.
#[derive(Debug, Default)]
pub struct CredentialUpdate {
    pub access_token: Option<Secret<String>>,
    pub refresh_token: Option<Secret<String>>,
    pub expires_at: Option<u64>,
}

/// Which fields a merge actually changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Changes {
    pub access_token: bool,
    pub refresh_token: bool,
    pub expires_at: bool,
}

impl Changes {
    pub fn any(&self) -> bool {
        self.access_token || self.refresh_token || self.expires_at
    }
}

impl CredentialSet {
    /// Apply the present fields of `update`. A missing refresh token in the
    /// update never clears the stored one.
    pub fn apply(&mut self, update: CredentialUpdate) -> Changes {
        let mut changes = Changes::default();

        if let Some(access) = update.access_token
            && !matches!(&self.access_token, Some(current) if current.same_as(&access))
        {
            self.access_token = Some(access);
            changes.access_token = true;
        }

        if let Some(refresh) = update.refresh_token
            && !matches!(&self.refresh_token, Some(current) if current.same_as(&refresh))
        {
            self.refresh_token = Some(refresh);
            changes.refresh_token = true;
        }

        if let Some(expires_at) = update.expires_at
            && self.expires_at != Some(expires_at)
        {
            self.expires_at = Some(expires_at);
            changes.expires_at = true;
        }

        changes
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// On-disk shape. Older records stored `expires_at` as an ISO-8601 string;
/// those are read with the expiry dropped rather than rejected.
#[derive(Deserialize)]
struct StoredRecord {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<serde_json::Value>,
}

impl StoredRecord {
    fn normalize(self) -> CredentialSet {
        CredentialSet {
            access_token: normalize_secret(self.access_token.as_deref()),
            refresh_token: normalize_secret(self.refresh_token.as_deref()),
            expires_at: self.expires_at.and_then(|v| v.as_u64()),
        }
    }
}

/// Collapse configuration placeholders to `None`.
///
/// Trims whitespace; the empty string and `EMPTY`/`NONE`/`NULL` in any case
/// mean "absent".
pub fn normalize_token(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() || SENTINELS.iter().any(|s| trimmed.eq_ignore_ascii_case(s)) {
        return None;
    }
    Some(trimmed.to_owned())
}

/// [`normalize_token`] wrapped as a secret.
pub fn normalize_secret(raw: Option<&str>) -> Option<Secret<String>> {
    normalize_token(raw).map(Secret::new)
}

/// File-backed credential record with a single in-memory copy.
pub struct CredentialStore {
    path: PathBuf,
    current: CredentialSet,
}

impl CredentialStore {
    /// Load the record at `path`, or seed it.
    ///
    /// A missing or unparseable record is replaced by `seed`, which is
    /// persisted immediately so the next run finds a record. If the record
    /// has no refresh token and the seed does, the seed's refresh token is
    /// adopted. Other I/O failures are `StoreUnavailable`.
    pub async fn load(path: PathBuf, seed: CredentialSet) -> Result<Self> {
        let current = match read_record(&path).await? {
            Some(mut record) => {
                info!(
                    path = %path.display(),
                    has_access = record.access_token.is_some(),
                    has_refresh = record.refresh_token.is_some(),
                    "loaded credential record"
                );
                if record.refresh_token.is_none()
                    && let Some(refresh) = seed.refresh_token
                {
                    info!("credential record has no refresh token, adopting configured one");
                    record.refresh_token = Some(refresh);
                    write_atomic(&path, &record).await?;
                }
                record
            }
            None => {
                info!(path = %path.display(), "no usable credential record, seeding from configuration");
                write_atomic(&path, &seed).await?;
                seed
            }
        };

        Ok(Self { path, current })
    }

    /// Current in-memory credentials (always equal to the durable record).
    pub fn current(&self) -> &CredentialSet {
        &self.current
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replace the durable record. The in-memory copy changes only
    /// after the write commits.
    pub async fn save(&mut self, set: CredentialSet) -> Result<()> {
        write_atomic(&self.path, &set).await?;
        self.current = set;
        Ok(())
    }

    /// Apply a partial update and persist it if anything changed.
    pub async fn merge(&mut self, update: CredentialUpdate) -> Result<Changes> {
        let mut next = self.current.clone();
        let changes = next.apply(update);
        if changes.any() {
            self.save(next).await?;
            debug!(
                access = changes.access_token,
                refresh = changes.refresh_token,
                expiry = changes.expires_at,
                "merged credential update"
            );
        }
        Ok(changes)
    }
}

async fn read_record(path: &Path) -> Result<Option<CredentialSet>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::StoreUnavailable(format!(
                "reading credential record {}: {e}",
                path.display()
            )));
        }
    };

    match serde_json::from_slice::<StoredRecord>(&bytes) {
        Ok(record) => Ok(Some(record.normalize())),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "credential record is corrupt, treating as absent");
            Ok(None)
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "credentials".into());
    dir.join(format!(".{name}.tmp.{}", std::process::id()))
}

/// Write the record atomically.
///
/// Temp file in the same directory, fsync, 0600 permissions (unix), then
/// rename over the target. On failure the temp file is removed and the
/// previous record is untouched.
async fn write_atomic(path: &Path, set: &CredentialSet) -> Result<()> {
    let json = serde_json::to_vec_pretty(set)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;
    let tmp_path = temp_path(path);

    if let Err(e) = write_and_rename(&tmp_path, path, &json).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}

async fn write_and_rename(tmp_path: &Path, path: &Path, json: &[u8]) -> Result<()> {
    let unavailable = |what: &str, e: std::io::Error| {
        Error::StoreUnavailable(format!("{what} {}: {e}", tmp_path.display()))
    };

    let mut file = tokio::fs::File::create(tmp_path)
        .await
        .map_err(|e| unavailable("creating temp credential file", e))?;
    file.write_all(json)
        .await
        .map_err(|e| unavailable("writing temp credential file", e))?;
    file.sync_all()
        .await
        .map_err(|e| unavailable("syncing temp credential file", e))?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(tmp_path, perms)
            .await
            .map_err(|e| unavailable("setting permissions on", e))?;
    }

    tokio::fs::rename(tmp_path, path).await.map_err(|e| {
        Error::StoreUnavailable(format!(
            "replacing credential record {}: {e}",
            path.display()
        ))
    })
}
