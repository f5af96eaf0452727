/// Key-value persistence behind the token store.
///
/// `FileBackend` keeps one file per key, prefixed with a SHA-256 of the value,
/// so a torn or hand-edited record is reported instead of silently trusted.
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::error::{Result, TokenError};

pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

impl<T: KvBackend + ?Sized> KvBackend for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| TokenError::StoreUnavailable("memory backend poisoned".into()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| TokenError::StoreUnavailable("memory backend poisoned".into()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| {
            TokenError::StoreUnavailable(format!(
                "Failed to create store directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> Result<PathBuf> {
        let safe = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !safe {
            return Err(TokenError::StoreUnavailable(format!("Invalid record key: {}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }

    fn compute_checksum(value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"tcr_record_v1:");
        hasher.update(value.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl KvBackend for FileBackend {
    /// Records are `<sha256 hex>\n<value>`. A record without a valid header is
    /// treated like a checksum mismatch.
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.record_path(key)?;
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(&path).map_err(|e| {
            TokenError::StoreUnavailable(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let (stored, value) = match raw.split_once('\n') {
            Some((header, value)) if header.len() == 64 && hex::decode(header).is_ok() => {
                (header, value)
            }
            _ => {
                warn!("Record {} has no checksum header - refusing to trust it", key);
                return Err(TokenError::StoreUnavailable(format!(
                    "Missing checksum for record {}",
                    key
                )));
            }
        };

        if stored != Self::compute_checksum(value) {
            warn!("Checksum mismatch for record {} - data corrupted", key);
            return Err(TokenError::StoreUnavailable(format!(
                "Checksum mismatch for record {}",
                key
            )));
        }

        Ok(Some(value.to_string()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.record_path(key)?;
        let temp_path = path.with_extension("tmp");

        {
            let mut file = std::fs::File::create(&temp_path).map_err(|e| {
                TokenError::StoreUnavailable(format!("Failed to create temp record: {}", e))
            })?;
            writeln!(file, "{}", Self::compute_checksum(value))
                .and_then(|_| file.write_all(value.as_bytes()))
                .map_err(|e| {
                    TokenError::StoreUnavailable(format!("Failed to write record: {}", e))
                })?;
            file.sync_all().map_err(|e| {
                TokenError::StoreUnavailable(format!("Failed to sync record: {}", e))
            })?;
        }

        // Header and value land together; a crash before this leaves the old record intact.
        std::fs::rename(&temp_path, &path).map_err(|e| {
            TokenError::StoreUnavailable(format!("Failed to rename record: {}", e))
        })?;

        debug!("Persisted record {} ({} bytes)", key, value.len());
        Ok(())
    }
}

/// Backend whose writes to one chosen key fail, for exercising partial-write paths.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct FlakyBackend {
    inner: MemoryBackend,
    failing_key: RwLock<Option<String>>,
}

#[cfg(test)]
impl FlakyBackend {
    pub(crate) fn fail_writes_to(&self, key: Option<&str>) {
        if let Ok(mut failing) = self.failing_key.write() {
            *failing = key.map(str::to_string);
        }
    }
}

#[cfg(test)]
impl KvBackend for FlakyBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let failing = self.failing_key.read().ok().and_then(|k| k.clone());
        if failing.as_deref() == Some(key) {
            return Err(TokenError::StoreUnavailable(format!("write to {} failed", key)));
        }
        self.inner.set(key, value)
    }
}
