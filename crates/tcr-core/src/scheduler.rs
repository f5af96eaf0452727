/// Time-gated regeneration of the active token set.
///
/// Once the window has elapsed the scheduler asks the remote generation
/// service for a batch and falls back to local generation on any failure.
/// Either way the previous active set is overwritten, which retires every
/// unredeemed token of the prior cycle.
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::time::Duration;
use tcr_network::HttpClient;
use tracing::{info, warn};

use crate::backend::KvBackend;
use crate::error::{Result, TokenError};
use crate::generator::{generate_with, TierConfig};
use crate::store::TokenStore;
use crate::token::{is_canonical, Token};

pub const REGENERATION_WINDOW_HOURS: i64 = 24;
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait GenerationSource: Send + Sync {
    async fn fetch_batch(&self) -> Result<Vec<Token>>;
}

/// Either a bare array of tokens or the `{ success, tokens, generatedAt }` envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum GenerationResponse {
    Batch(Vec<Token>),
    Envelope(GenerationEnvelope),
}

#[derive(Deserialize)]
struct GenerationEnvelope {
    #[serde(default = "default_success")]
    success: bool,
    tokens: Vec<Token>,
}

fn default_success() -> bool {
    true
}

pub struct RemoteGenerator {
    client: HttpClient,
    url: String,
}

impl RemoteGenerator {
    pub fn new(client: HttpClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl GenerationSource for RemoteGenerator {
    async fn fetch_batch(&self) -> Result<Vec<Token>> {
        let response: GenerationResponse = self.client.get_json(&self.url).await?;
        match response {
            GenerationResponse::Batch(tokens) => Ok(tokens),
            GenerationResponse::Envelope(envelope) if envelope.success => Ok(envelope.tokens),
            GenerationResponse::Envelope(_) => Err(TokenError::RemoteGenerationFailure(
                "service reported success=false".into(),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    AwaitingWindow,
    Generating,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchSource {
    Remote,
    Local,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    Skipped { next_due: DateTime<Utc> },
    Regenerated { source: BatchSource, tokens: usize },
}

pub struct Scheduler {
    source: Option<Box<dyn GenerationSource>>,
    tiers: TierConfig,
    window: ChronoDuration,
    remote_timeout: Duration,
    state: SchedulerState,
}

impl Scheduler {
    pub fn new(source: Option<Box<dyn GenerationSource>>, tiers: TierConfig) -> Self {
        Self {
            source,
            tiers,
            window: ChronoDuration::hours(REGENERATION_WINDOW_HOURS),
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            state: SchedulerState::AwaitingWindow,
        }
    }

    pub fn local_only(tiers: TierConfig) -> Self {
        Self::new(None, tiers)
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn tiers(&self) -> &TierConfig {
        &self.tiers
    }

    pub fn is_due(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last {
            Some(last) => now - last > self.window,
            None => true,
        }
    }

    pub async fn check<B: KvBackend>(&mut self, store: &TokenStore<B>) -> Result<CheckOutcome> {
        self.check_at(store, Utc::now()).await
    }

    pub async fn check_at<B: KvBackend>(
        &mut self,
        store: &TokenStore<B>,
        now: DateTime<Utc>,
    ) -> Result<CheckOutcome> {
        let last = store.last_generation()?;
        if !self.is_due(last, now) {
            let next_due = last.map(|l| l + self.window).unwrap_or(now);
            return Ok(CheckOutcome::Skipped { next_due });
        }
        self.regenerate_at(store, now).await
    }

    /// Regenerates regardless of the window.
    pub async fn regenerate_at<B: KvBackend>(
        &mut self,
        store: &TokenStore<B>,
        now: DateTime<Utc>,
    ) -> Result<CheckOutcome> {
        self.state = SchedulerState::Generating;
        let result = self.run_cycle(store, now).await;
        self.state = SchedulerState::AwaitingWindow;
        result
    }

    async fn run_cycle<B: KvBackend>(
        &self,
        store: &TokenStore<B>,
        now: DateTime<Utc>,
    ) -> Result<CheckOutcome> {
        let (batch, source) = match self.fetch_remote().await {
            Ok(batch) => (batch, BatchSource::Remote),
            Err(e) => {
                if self.source.is_some() {
                    warn!("Remote generation failed, generating locally: {}", e);
                }
                (self.local_batch(now), BatchSource::Local)
            }
        };

        store.persist(&batch)?;
        store.set_last_generation(now)?;
        info!(
            "Regenerated {} tokens ({:?}), previous unredeemed tokens retired",
            batch.len(),
            source
        );

        Ok(CheckOutcome::Regenerated {
            source,
            tokens: batch.len(),
        })
    }

    fn local_batch(&self, now: DateTime<Utc>) -> Vec<Token> {
        generate_with(&self.tiers, now, &mut rand::thread_rng())
    }

    async fn fetch_remote(&self) -> Result<Vec<Token>> {
        let source = self.source.as_ref().ok_or_else(|| {
            TokenError::RemoteGenerationFailure("no generation service configured".into())
        })?;

        let batch = tokio::time::timeout(self.remote_timeout, source.fetch_batch())
            .await
            .map_err(|_| {
                TokenError::RemoteGenerationFailure(format!(
                    "no response within {:?}",
                    self.remote_timeout
                ))
            })??;

        self.check_batch(&batch)?;
        Ok(batch)
    }

    fn check_batch(&self, batch: &[Token]) -> Result<()> {
        if !self.tiers.matches(batch) {
            return Err(TokenError::RemoteGenerationFailure(format!(
                "batch of {} tokens does not match the tier configuration",
                batch.len()
            )));
        }
        if let Some(bad) = batch
            .iter()
            .find(|t| t.used || !is_canonical(&t.code, t.quota))
        {
            return Err(TokenError::RemoteGenerationFailure(format!(
                "malformed token {} in remote batch",
                bad.code
            )));
        }
        Ok(())
    }
}
