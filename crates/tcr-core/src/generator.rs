/// Local batch generation.
///
/// A batch is assembled tier by tier, then permuted with Fisher-Yates so the
/// position of a token says nothing about its quota.
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::token::{format_code, Token, CODE_ALPHABET, CODE_RANDOM_LEN};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub quota: u32,
    pub quantity: usize,
}

pub const DEFAULT_TIERS: [Tier; 4] = [
    Tier { quota: 5, quantity: 50 },
    Tier { quota: 30, quantity: 20 },
    Tier { quota: 80, quantity: 10 },
    Tier { quota: 150, quantity: 10 },
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TierConfig {
    tiers: Vec<Tier>,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            tiers: DEFAULT_TIERS.to_vec(),
        }
    }
}

impl TierConfig {
    pub fn new(tiers: Vec<Tier>) -> Self {
        Self { tiers }
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn batch_size(&self) -> usize {
        self.tiers.iter().map(|t| t.quantity).sum()
    }

    pub fn contains_quota(&self, quota: u32) -> bool {
        self.tiers.iter().any(|t| t.quota == quota)
    }

    /// Expected count for `quota`, or None if the quota is not a tier.
    pub fn quantity_for(&self, quota: u32) -> Option<usize> {
        self.tiers
            .iter()
            .filter(|t| t.quota == quota)
            .map(|t| t.quantity)
            .reduce(|a, b| a + b)
    }

    /// True when `batch` has exactly this configuration's per-tier counts.
    pub fn matches(&self, batch: &[Token]) -> bool {
        if batch.len() != self.batch_size() {
            return false;
        }
        self.tiers.iter().all(|tier| {
            let found = batch.iter().filter(|t| t.quota == tier.quota).count();
            Some(found) == self.quantity_for(tier.quota)
        })
    }
}

pub fn random_code<R: Rng + ?Sized>(quota: u32, rng: &mut R) -> String {
    let random_part: String = (0..CODE_RANDOM_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format_code(&random_part, quota)
}

pub fn shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

pub fn generate_with<R: Rng + ?Sized>(
    config: &TierConfig,
    created_at: DateTime<Utc>,
    rng: &mut R,
) -> Vec<Token> {
    let mut batch = Vec::with_capacity(config.batch_size());
    for tier in config.tiers() {
        for _ in 0..tier.quantity {
            batch.push(Token::new(random_code(tier.quota, rng), tier.quota, created_at));
        }
    }
    shuffle(&mut batch, rng);
    batch
}

pub fn generate(config: &TierConfig) -> Vec<Token> {
    generate_with(config, Utc::now(), &mut rand::thread_rng())
}
