//! Thin HTTP client with hard request timeouts, used to reach the token generation service.
//!
//! ```rust,no_run
//! use tcr_network::{Config, HttpClient};
//!
//! #[tokio::main]
//! async fn main() -> tcr_network::Result<()> {
//!     let client = HttpClient::new(Config::default().with_timeout(3))?;
//!     let batch: serde_json::Value = client
//!         .get_json("http://127.0.0.1:3000/api/tokens/generate")
//!         .await?;
//!     println!("{}", batch);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod http_client;

pub use config::{Config, DEFAULT_GENERATION_URL, DEFAULT_TIMEOUT_SECS};
pub use error::{NetworkError, Result};
pub use http_client::HttpClient;

pub fn http_client() -> Result<HttpClient> {
    HttpClient::new(Config::default())
}
