use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::backend::KvBackend;
use crate::error::{Result, TokenError};
use crate::store::TokenStore;
use crate::token::{check_format, normalize_code, UsageRecord};

/// Marks tokens used and appends the matching audit record.
pub struct Consumer<'a, B: KvBackend> {
    store: &'a TokenStore<B>,
}

impl<'a, B: KvBackend> Consumer<'a, B> {
    pub fn new(store: &'a TokenStore<B>) -> Self {
        Self { store }
    }

    pub fn consume(&self, input: &str) -> Result<UsageRecord> {
        self.consume_at(input, Utc::now())
    }

    pub fn consume_at(&self, input: &str, now: DateTime<Utc>) -> Result<UsageRecord> {
        let code = normalize_code(input);
        check_format(&code)?;

        match self.redeem(&code, now) {
            Ok(record) => {
                info!("Redeemed {} for {} invocations", record.code, record.quota);
                Ok(record)
            }
            Err(TokenError::StoreUnavailable(e)) => {
                warn!("Denying redemption of {}: {}", code, e);
                Err(TokenError::NotFoundOrUsed(code))
            }
            Err(e) => Err(e),
        }
    }

    /// Undoes a redemption whose follow-up write failed: the token becomes
    /// unused again and its audit record is dropped.
    pub fn revert(&self, record: &UsageRecord) -> Result<()> {
        let mut tokens = self.store.load_all()?;
        let mut log = self.store.load_usage_log()?;

        if let Some(token) = tokens
            .iter_mut()
            .find(|t| t.code == record.code && t.used_at == Some(record.used_at))
        {
            token.used = false;
            token.used_at = None;
        }
        if let Some(pos) = log.iter().rposition(|r| r == record) {
            log.remove(pos);
        }

        self.store.save_usage_log(&log)?;
        self.store.save_all(&tokens)?;
        warn!("Reverted redemption of {}", record.code);
        Ok(())
    }

    fn redeem(&self, code: &str, now: DateTime<Utc>) -> Result<UsageRecord> {
        let original = self.store.load_all()?;
        let mut log = self.store.load_usage_log()?;
        let mut tokens = original.clone();
        let token = tokens
            .iter_mut()
            .find(|t| t.code == code && !t.used)
            .ok_or_else(|| TokenError::NotFoundOrUsed(code.to_string()))?;

        token.mark_used(now);
        let record = UsageRecord {
            code: token.code.clone(),
            quota: token.quota,
            used_at: now,
        };

        self.store.save_all(&tokens)?;
        log.push(record.clone());
        if let Err(e) = self.store.save_usage_log(&log) {
            if let Err(restore) = self.store.save_all(&original) {
                warn!("Could not restore tokens after failed audit write: {}", restore);
            }
            return Err(e);
        }
        Ok(record)
    }
}
