pub const DEFAULT_GENERATION_URL: &str = "http://127.0.0.1:3000/api/tokens/generate";
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

#[derive(Clone, Debug)]
pub struct Config {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub verify_tls: bool,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: 2,
            verify_tls: true,
            user_agent: concat!("tcr/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_user_agent(mut self, agent: &str) -> Self {
        self.user_agent = agent.to_string();
        self
    }

    pub fn without_tls_verification(mut self) -> Self {
        self.verify_tls = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let config = Config::default()
            .with_timeout(9)
            .with_connect_timeout(1)
            .without_tls_verification();

        assert_eq!(config.timeout_secs, 9);
        assert_eq!(config.connect_timeout_secs, 1);
        assert!(!config.verify_tls);
        assert!(config.user_agent.starts_with("tcr/"));
    }
}
