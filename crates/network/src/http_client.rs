use std::time::Duration;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::error::{NetworkError, Result};

pub struct HttpClient {
    client: Client,
    config: Config,
}

impl HttpClient {
    pub fn new(config: Config) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone());

        if !config.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| NetworkError::Config(format!("Failed to build client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn map_send_error(&self, e: reqwest::Error) -> NetworkError {
        if e.is_timeout() {
            NetworkError::Timeout(self.config.timeout_secs)
        } else if e.is_connect() {
            NetworkError::Connection(e.to_string())
        } else {
            NetworkError::Http(format!("GET request failed: {}", e))
        }
    }

    /// Sends a GET and rejects any non-2xx response.
    pub async fn get(&self, url: &str) -> Result<Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("GET {} returned {}", url, status);
            return Err(NetworkError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.get(url).await?;
        response
            .json()
            .await
            .map_err(|e| NetworkError::Http(format!("JSON parse failed: {}", e)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
