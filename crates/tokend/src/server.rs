use axum::{
    extract::State,
    http::Uri,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tcr_core::{generate, TierConfig, Token};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::TokendConfig;
use crate::error::TokendError;

pub struct AppState {
    pub config: TokendConfig,
    pub tiers: TierConfig,
}

impl AppState {
    pub fn new(config: TokendConfig) -> Self {
        Self {
            config,
            tiers: TierConfig::default(),
        }
    }
}

/// Routes without the rate limiter, which needs peer addresses from the listener.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/tokens/generate",
            get(generate_tokens).fallback(method_not_allowed),
        )
        .fallback(not_found)
        .with_state(state)
}

pub async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(state.config.rate_limit_per_second)
        .burst_size(state.config.rate_limit_burst)
        .key_extractor(tower_governor::key_extractor::SmartIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?;

    let app = router(state.clone())
        .layer(GovernorLayer {
            config: Arc::new(governor_conf),
        })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = state.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        "Token service ready on {} - GET /api/tokens/generate (rate limited: {} req/s per IP)",
        addr, state.config.rate_limit_per_second
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn generate_tokens(State(state): State<Arc<AppState>>) -> Json<Vec<Token>> {
    info!("Token generation requested");
    let batch = generate(&state.tiers);
    log_batch(&batch);
    Json(batch)
}

async fn method_not_allowed() -> TokendError {
    TokendError::MethodNotAllowed
}

async fn not_found(uri: Uri) -> TokendError {
    TokendError::NotFound(uri.path().to_string())
}

/// Codes grouped by quota, smallest tier first.
fn group_by_quota(batch: &[Token]) -> BTreeMap<u32, Vec<&str>> {
    let mut groups: BTreeMap<u32, Vec<&str>> = BTreeMap::new();
    for token in batch {
        groups.entry(token.quota).or_default().push(&token.code);
    }
    groups
}

fn log_batch(batch: &[Token]) {
    for (quota, codes) in group_by_quota(batch) {
        info!("{} tokens worth {} invocations", codes.len(), quota);
        for (i, code) in codes.iter().enumerate() {
            info!("  {}. {}", i + 1, code);
        }
    }
    info!("Total: {} active tokens, generated at {}", batch.len(), Utc::now().to_rfc3339());
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        router(Arc::new(AppState::new(TokendConfig::default())))
    }

    async fn send(method: Method, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_generate_returns_full_batch() {
        let (status, body) = send(Method::GET, "/api/tokens/generate").await;
        assert_eq!(status, StatusCode::OK);

        let tokens: Vec<Token> = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(tokens.len(), 90);
        assert!(TierConfig::default().matches(&tokens));
        assert!(tokens.iter().all(|t| !t.used));
        assert!(body[0].get("createdAt").is_some());
        assert!(body[0].get("usedAt").is_none());
    }

    #[tokio::test]
    async fn test_generate_rejects_other_methods() {
        let (status, body) = send(Method::POST, "/api/tokens/generate").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["error"], "Method not allowed");
    }

    #[tokio::test]
    async fn test_health_and_unknown_route() {
        let (status, body) = send(Method::GET, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(Method::GET, "/index.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[test]
    fn test_group_by_quota_counts() {
        let batch = generate(&TierConfig::default());
        let groups = group_by_quota(&batch);
        let counts: Vec<(u32, usize)> = groups.iter().map(|(q, c)| (*q, c.len())).collect();
        assert_eq!(counts, vec![(5, 50), (30, 20), (80, 10), (150, 10)]);
    }
}
