use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TokenError};

pub const CODE_PREFIX: &str = "TCR";
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const CODE_RANDOM_LEN: usize = 5;

/// Quota suffix is at least two digits; 150 keeps its third digit.
static CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^TCR-[A-Z0-9]{5}-[0-9]{2,3}$").expect("Failed to compile token code regex")
});

/// A single-use credential granting `quota` feature invocations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub code: String,
    #[serde(alias = "count")]
    pub quota: u32,
    #[serde(default)]
    pub used: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_at: Option<DateTime<Utc>>,
}

impl Token {
    pub fn new(code: String, quota: u32, created_at: DateTime<Utc>) -> Self {
        Self {
            code,
            quota,
            used: false,
            created_at,
            used_at: None,
        }
    }

    pub fn mark_used(&mut self, at: DateTime<Utc>) {
        self.used = true;
        self.used_at = Some(at);
    }
}

/// Audit log entry written once per successful redemption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub code: String,
    #[serde(alias = "count")]
    pub quota: u32,
    pub used_at: DateTime<Utc>,
}

/// What a successful validation hands back to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Redemption {
    pub code: String,
    pub quota: u32,
}

impl From<&Token> for Redemption {
    fn from(token: &Token) -> Self {
        Self {
            code: token.code.clone(),
            quota: token.quota,
        }
    }
}

/// Trims and upper-cases user input the way the login form does.
pub fn normalize_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

pub fn is_valid_format(code: &str) -> bool {
    CODE_RE.is_match(code)
}

pub fn check_format(code: &str) -> Result<()> {
    if is_valid_format(code) {
        Ok(())
    } else {
        Err(TokenError::InvalidFormat(code.to_string()))
    }
}

pub fn format_code(random_part: &str, quota: u32) -> String {
    format!("{}-{}-{:02}", CODE_PREFIX, random_part, quota)
}

/// True when `code` is exactly what `format_code` renders for `quota`, so
/// `-005` or a suffix naming another tier is rejected.
pub fn is_canonical(code: &str, quota: u32) -> bool {
    is_valid_format(code)
        && code
            .get(4..9)
            .is_some_and(|random_part| format_code(random_part, quota) == code)
}

/// Decodes the quota suffix of a well-formed code.
pub fn quota_from_code(code: &str) -> Option<u32> {
    if !is_valid_format(code) {
        return None;
    }
    code.rsplit('-').next().and_then(|s| s.parse().ok())
}
