//! Lifecycle of TCR access tokens.
//!
//! A regeneration cycle produces a shuffled batch of 90 single-use codes
//! across four quota tiers. The client validates and redeems codes against a
//! local store; every 24 hours the active set is replaced, preferring a
//! batch from the generation service and falling back to local generation.
//!
//! ```rust,no_run
//! use tcr_core::{FileBackend, Scheduler, TierConfig, TokenService, TokenStore};
//!
//! #[tokio::main]
//! async fn main() -> tcr_core::Result<()> {
//!     let store = TokenStore::new(FileBackend::open("/tmp/tcr")?);
//!     let service = TokenService::new(store, Scheduler::local_only(TierConfig::default()));
//!     service.initialize().await?;
//!
//!     let code = service.active_tokens()?[0].code.clone();
//!     let record = service.redeem(&code)?;
//!     println!("{} grants {} invocations", record.code, record.quota);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod consumer;
pub mod error;
pub mod generator;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod token;
pub mod validator;

pub use backend::{FileBackend, KvBackend, MemoryBackend};
pub use consumer::Consumer;
pub use error::{Result, TokenError};
pub use generator::{generate, Tier, TierConfig, DEFAULT_TIERS};
pub use scheduler::{
    BatchSource, CheckOutcome, GenerationSource, RemoteGenerator, Scheduler, SchedulerState,
};
pub use service::{Lifecycle, TokenService};
pub use store::{StoreStats, TokenStore};
pub use token::{Redemption, Token, UsageRecord};
pub use validator::Validator;
