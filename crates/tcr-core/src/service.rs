use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::backend::KvBackend;
use crate::consumer::Consumer;
use crate::error::{Result, TokenError};
use crate::scheduler::{CheckOutcome, Scheduler};
use crate::store::{StoreStats, TokenStore};
use crate::token::{Redemption, Token, UsageRecord};
use crate::validator::Validator;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Constructed,
    Initializing,
    Ready,
    Failed(String),
}

/// Everything the client surface needs from the token core.
pub struct TokenService<B: KvBackend> {
    store: TokenStore<B>,
    scheduler: Mutex<Scheduler>,
    lifecycle: watch::Sender<Lifecycle>,
}

impl<B: KvBackend> TokenService<B> {
    pub fn new(store: TokenStore<B>, scheduler: Scheduler) -> Self {
        let (lifecycle, _) = watch::channel(Lifecycle::Constructed);
        Self {
            store,
            scheduler: Mutex::new(scheduler),
            lifecycle,
        }
    }

    pub fn store(&self) -> &TokenStore<B> {
        &self.store
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Lifecycle> {
        self.lifecycle.subscribe()
    }

    /// Runs the startup regeneration check; may wait on the generation service.
    pub async fn initialize(&self) -> Result<CheckOutcome> {
        self.initialize_at(Utc::now()).await
    }

    pub async fn initialize_at(&self, now: DateTime<Utc>) -> Result<CheckOutcome> {
        self.lifecycle.send_replace(Lifecycle::Initializing);
        let result = self.scheduler.lock().await.check_at(&self.store, now).await;
        match &result {
            Ok(outcome) => {
                debug!("Startup check finished: {:?}", outcome);
                self.lifecycle.send_replace(Lifecycle::Ready);
            }
            Err(e) => {
                self.lifecycle.send_replace(Lifecycle::Failed(e.to_string()));
            }
        }
        result
    }

    /// Resolves once `initialize` has finished, successfully or not.
    pub async fn wait_ready(&self) -> Result<()> {
        let mut rx = self.subscribe();
        let state = rx
            .wait_for(|s| matches!(s, Lifecycle::Ready | Lifecycle::Failed(_)))
            .await
            .map_err(|_| TokenError::StoreUnavailable("service dropped".into()))?
            .clone();
        match state {
            Lifecycle::Failed(reason) => Err(TokenError::StoreUnavailable(reason)),
            _ => Ok(()),
        }
    }

    pub async fn check_regeneration(&self) -> Result<CheckOutcome> {
        self.scheduler.lock().await.check(&self.store).await
    }

    pub async fn force_regenerate(&self) -> Result<CheckOutcome> {
        self.scheduler
            .lock()
            .await
            .regenerate_at(&self.store, Utc::now())
            .await
    }

    pub fn validate(&self, code: &str) -> Result<Redemption> {
        Validator::new(&self.store).validate(code)
    }

    pub fn consume(&self, code: &str) -> Result<UsageRecord> {
        Consumer::new(&self.store).consume(code)
    }

    /// Consumes `code` and makes its quota the remaining balance. If the
    /// balance cannot be written the redemption is undone.
    pub fn redeem(&self, code: &str) -> Result<UsageRecord> {
        let consumer = Consumer::new(&self.store);
        let record = consumer.consume(code)?;
        if let Err(e) = self.store.set_balance(record.quota) {
            if let Err(revert) = consumer.revert(&record) {
                warn!("Could not revert redemption of {}: {}", record.code, revert);
            }
            return Err(e);
        }
        info!("Balance set to {} after redeeming {}", record.quota, record.code);
        Ok(record)
    }

    pub fn balance(&self) -> Result<u32> {
        self.store.balance()
    }

    /// Spends one invocation and returns what is left.
    pub fn use_invocation(&self) -> Result<u32> {
        let remaining = self.store.balance()?;
        if remaining == 0 {
            return Err(TokenError::QuotaExhausted);
        }
        self.store.set_balance(remaining - 1)?;
        Ok(remaining - 1)
    }

    pub fn active_tokens(&self) -> Result<Vec<Token>> {
        self.store.load_active()
    }

    pub fn used_tokens(&self) -> Result<Vec<UsageRecord>> {
        self.store.load_usage_log()
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.store.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FlakyBackend, MemoryBackend};
    use crate::generator::TierConfig;
    use crate::store::BALANCE_KEY;
    use std::sync::Arc;

    fn service() -> TokenService<MemoryBackend> {
        TokenService::new(
            TokenStore::new(MemoryBackend::new()),
            Scheduler::local_only(TierConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_lifecycle_signals_ready() {
        let service = Arc::new(service());
        assert_eq!(service.lifecycle(), Lifecycle::Constructed);

        let waiter = {
            let service = service.clone();
            tokio::spawn(async move { service.wait_ready().await })
        };

        service.initialize().await.unwrap();
        waiter.await.unwrap().unwrap();
        assert_eq!(service.lifecycle(), Lifecycle::Ready);
        assert_eq!(service.active_tokens().unwrap().len(), 90);
    }

    #[tokio::test]
    async fn test_redeem_and_spend_balance() {
        let service = service();
        service.initialize().await.unwrap();

        let token = service
            .active_tokens()
            .unwrap()
            .into_iter()
            .find(|t| t.quota == 5)
            .unwrap();
        let record = service.redeem(&token.code).unwrap();
        assert_eq!(record.quota, 5);
        assert_eq!(service.balance().unwrap(), 5);

        for expected in (0..5).rev() {
            assert_eq!(service.use_invocation().unwrap(), expected);
        }
        assert_eq!(service.use_invocation(), Err(TokenError::QuotaExhausted));
        assert!(service.redeem(&token.code).is_err());
    }

    #[tokio::test]
    async fn test_stats_after_redemption() {
        let service = service();
        service.initialize().await.unwrap();
        let code = service.active_tokens().unwrap()[0].code.clone();
        service.consume(&code).unwrap();

        let stats = service.stats().unwrap();
        assert_eq!((stats.active, stats.used, stats.total), (89, 1, 90));
        assert_eq!(service.used_tokens().unwrap()[0].code, code);
    }

    #[tokio::test]
    async fn test_force_regenerate_retires_unused_tokens() {
        let service = service();
        service.initialize().await.unwrap();
        let old = service.active_tokens().unwrap();

        service.force_regenerate().await.unwrap();
        let fresh = service.active_tokens().unwrap();
        assert_eq!(fresh.len(), 90);
        assert_ne!(fresh, old);

        let retired = old
            .iter()
            .find(|t| fresh.iter().all(|f| f.code != t.code))
            .unwrap();
        assert!(matches!(
            service.validate(&retired.code),
            Err(TokenError::NotFoundOrUsed(_))
        ));
        assert!(matches!(
            service.consume(&retired.code),
            Err(TokenError::NotFoundOrUsed(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_balance_write_undoes_redemption() {
        let service = TokenService::new(
            TokenStore::new(FlakyBackend::default()),
            Scheduler::local_only(TierConfig::default()),
        );
        service.initialize().await.unwrap();
        let code = service.active_tokens().unwrap()[0].code.clone();

        service.store().backend().fail_writes_to(Some(BALANCE_KEY));
        assert!(matches!(
            service.redeem(&code),
            Err(TokenError::StoreUnavailable(_))
        ));
        assert!(service.validate(&code).is_ok());
        assert!(service.used_tokens().unwrap().is_empty());
        assert_eq!(service.balance().unwrap(), 0);

        service.store().backend().fail_writes_to(None);
        assert_eq!(service.redeem(&code).unwrap().code, code);
        assert_eq!(service.used_tokens().unwrap().len(), 1);
    }
}
