use std::path::PathBuf;
use tcr_network::{DEFAULT_GENERATION_URL, DEFAULT_TIMEOUT_SECS};

pub const DEFAULT_STORE_PATH: &str = "~/.local/share/tcr";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub store_path: PathBuf,
    /// None means local generation only.
    pub generation_url: Option<String>,
    pub remote_timeout_secs: u64,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let store_path = lookup("TCR_STORE_PATH").unwrap_or_else(|| DEFAULT_STORE_PATH.to_string());

        let generation_url = match lookup("TCR_GENERATION_URL") {
            Some(url) if url.trim().is_empty() || url.eq_ignore_ascii_case("none") => None,
            Some(url) => Some(url),
            None => Some(DEFAULT_GENERATION_URL.to_string()),
        };

        let remote_timeout_secs = lookup("TCR_REMOTE_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            store_path: expand(&store_path),
            generation_url,
            remote_timeout_secs,
        }
    }

    pub fn with_store_path(mut self, path: &str) -> Self {
        self.store_path = expand(path);
        self
    }

    pub fn with_generation_url(mut self, url: &str) -> Self {
        self.generation_url = Some(url.to_string());
        self
    }

    pub fn offline(mut self) -> Self {
        self.generation_url = None;
        self
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}
