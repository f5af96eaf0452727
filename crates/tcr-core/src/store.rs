use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::backend::KvBackend;
use crate::error::{Result, TokenError};
use crate::token::{Token, UsageRecord};

pub const TOKENS_KEY: &str = "tcr_tokens_data";
pub const USAGE_LOG_KEY: &str = "tcr_used_tokens";
pub const LAST_GENERATION_KEY: &str = "tcr_last_generation";
pub const BALANCE_KEY: &str = "tcr_balance";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub active: usize,
    pub used: usize,
    pub total: usize,
}

/// Active token set, audit log and generation clock over one backend.
pub struct TokenStore<B: KvBackend> {
    backend: B,
}

impl<B: KvBackend> TokenStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.backend.get(key)? {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
                TokenError::StoreUnavailable(format!("Corrupt record {}: {}", key, e))
            }),
            None => Ok(None),
        }
    }

    fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json =
            serde_json::to_string(value).map_err(|e| TokenError::Serialization(e.to_string()))?;
        self.backend.set(key, &json)
    }

    /// Replaces the active set; the audit log is created only if missing.
    pub fn persist(&self, batch: &[Token]) -> Result<()> {
        self.write_json(TOKENS_KEY, batch)?;
        if self.backend.get(USAGE_LOG_KEY)?.is_none() {
            self.write_json::<[UsageRecord]>(USAGE_LOG_KEY, &[])?;
        }
        info!("Persisted {} tokens as the active set", batch.len());
        Ok(())
    }

    pub fn load_all(&self) -> Result<Vec<Token>> {
        Ok(self.read_json(TOKENS_KEY)?.unwrap_or_default())
    }

    pub fn load_active(&self) -> Result<Vec<Token>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|t| !t.used)
            .collect())
    }

    pub(crate) fn save_all(&self, tokens: &[Token]) -> Result<()> {
        self.write_json(TOKENS_KEY, tokens)
    }

    pub fn load_usage_log(&self) -> Result<Vec<UsageRecord>> {
        Ok(self.read_json(USAGE_LOG_KEY)?.unwrap_or_default())
    }

    pub(crate) fn save_usage_log(&self, log: &[UsageRecord]) -> Result<()> {
        self.write_json(USAGE_LOG_KEY, log)
    }

    pub fn append_usage(&self, record: UsageRecord) -> Result<()> {
        let mut log = self.load_usage_log()?;
        log.push(record);
        self.save_usage_log(&log)
    }

    pub fn last_generation(&self) -> Result<Option<DateTime<Utc>>> {
        let raw = match self.backend.get(LAST_GENERATION_KEY)? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let millis: i64 = match raw.trim().parse() {
            Ok(millis) => millis,
            Err(_) => {
                warn!("Unparseable last generation timestamp {:?}, treating as absent", raw);
                return Ok(None);
            }
        };
        Ok(Utc.timestamp_millis_opt(millis).single())
    }

    pub fn set_last_generation(&self, at: DateTime<Utc>) -> Result<()> {
        self.backend
            .set(LAST_GENERATION_KEY, &at.timestamp_millis().to_string())
    }

    pub fn balance(&self) -> Result<u32> {
        match self.backend.get(BALANCE_KEY)? {
            Some(raw) => raw.trim().parse().map_err(|_| {
                TokenError::StoreUnavailable(format!("Corrupt balance record: {:?}", raw))
            }),
            None => Ok(0),
        }
    }

    pub fn set_balance(&self, remaining: u32) -> Result<()> {
        self.backend.set(BALANCE_KEY, &remaining.to_string())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let active = self.load_active()?.len();
        let used = self.load_usage_log()?.len();
        Ok(StoreStats {
            active,
            used,
            total: active + used,
        })
    }
}
