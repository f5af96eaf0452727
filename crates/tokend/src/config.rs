#[derive(Clone, Debug)]
pub struct TokendConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

impl Default for TokendConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            rate_limit_per_second: 10,
            rate_limit_burst: 20,
        }
    }
}

impl TokendConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let host = lookup("HOST").unwrap_or(defaults.host);
        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid PORT {:?}: {}", raw, e))?,
            None => defaults.port,
        };

        let rate_limit_per_second = lookup("RATE_LIMIT_PER_SECOND")
            .and_then(|s| s.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.rate_limit_per_second);

        let rate_limit_burst = lookup("RATE_LIMIT_BURST")
            .and_then(|s| s.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.rate_limit_burst);

        Ok(Self {
            host,
            port,
            rate_limit_per_second,
            rate_limit_burst,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TokendConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
        assert_eq!(config.rate_limit_per_second, 10);
        assert_eq!(config.rate_limit_burst, 20);
    }

    #[test]
    fn test_overrides() {
        let config = TokendConfig::from_lookup(lookup_from(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8088"),
            ("RATE_LIMIT_PER_SECOND", "0"),
            ("RATE_LIMIT_BURST", "5"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:8088");
        assert_eq!(config.rate_limit_per_second, 10);
        assert_eq!(config.rate_limit_burst, 5);
    }

    #[test]
    fn test_bad_port_is_an_error() {
        assert!(TokendConfig::from_lookup(lookup_from(&[("PORT", "http")])).is_err());
    }
}
