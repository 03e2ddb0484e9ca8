//! HTTP title source for the Jikan v4 API.

use async_trait::async_trait;
use reqwest::StatusCode;
use snafu::prelude::*;
use std::time::Duration;
use tracing::debug;

use super::TitleSource;
use crate::error::{
    ClientBuildSnafu, DecodeSnafu, FetchError, HttpStatusSnafu, NotFoundSnafu, RequestSnafu,
};
use crate::model::RawPayload;

/// Public Jikan endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.jikan.moe/v4";

/// Looks titles up with `GET {base_url}/anime/{id}/full`.
#[derive(Debug, Clone)]
pub struct JikanSource {
    http: reqwest::Client,
    base_url: String,
}

impl JikanSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("catalog-roi/", env!("CARGO_PKG_VERSION")))
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn title_url(&self, id: i64) -> String {
        format!("{}/anime/{}/full", self.base_url, id)
    }
}

#[async_trait]
impl TitleSource for JikanSource {
    async fn lookup(&self, id: i64) -> Result<RawPayload, FetchError> {
        let url = self.title_url(id);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context(RequestSnafu { id })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return NotFoundSnafu { id }.fail();
        }
        ensure!(
            status.is_success(),
            HttpStatusSnafu {
                id,
                status: status.as_u16()
            }
        );

        let body = response.json().await.context(DecodeSnafu { id })?;
        Ok(RawPayload::new(id, body))
    }

    fn name(&self) -> &str {
        "jikan_api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{RateLimitedFetchClient, RetryPolicy};
    use axum::Router;
    use axum::http::StatusCode as ServerStatus;
    use axum::routing::get;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serve fixed title routes on a local port. Unknown titles answer 404
    /// and are counted.
    async fn serve() -> (String, Arc<AtomicUsize>) {
        let misses = Arc::new(AtomicUsize::new(0));
        let counter = misses.clone();

        let app = Router::new()
            .route(
                "/anime/1/full",
                get(|| async {
                    axum::Json(json!({"data": {"mal_id": 1, "title": "Cowboy Bebop"}}))
                }),
            )
            .route(
                "/anime/503/full",
                get(|| async { ServerStatus::SERVICE_UNAVAILABLE }),
            )
            .route("/anime/7/full", get(|| async { "<html>maintenance</html>" }))
            .fallback(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    ServerStatus::NOT_FOUND
                }
            });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), misses)
    }

    fn source(base_url: &str) -> JikanSource {
        JikanSource::new(base_url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_success_returns_body() {
        let (base_url, _) = serve().await;
        let payload = source(&base_url).lookup(1).await.unwrap();
        assert_eq!(payload.requested_id, 1);
        assert_eq!(payload.body["data"]["title"], "Cowboy Bebop");
    }

    #[tokio::test]
    async fn test_404_is_permanent() {
        let (base_url, _) = serve().await;
        let err = source(&base_url).lookup(9999999).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let (base_url, _) = serve().await;
        let err = source(&base_url).lookup(503).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { id: 503, status: 503 }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_non_json_body_is_decode_error() {
        let (base_url, _) = serve().await;
        let err = source(&base_url).lookup(7).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode { id: 7, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_client_makes_one_call_for_missing_title() {
        let (base_url, misses) = serve().await;
        let mut client = RateLimitedFetchClient::new(
            Arc::new(source(&base_url)),
            Duration::ZERO,
            RetryPolicy::for_fetch(3, Duration::ZERO),
        );

        let err = client.fetch(9999999).await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(client.stats().calls_made, 1);
        assert_eq!(misses.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_title_url_trims_trailing_slash() {
        let source = JikanSource::new("https://api.jikan.moe/v4/", Duration::from_secs(10)).unwrap();
        assert_eq!(source.title_url(1), "https://api.jikan.moe/v4/anime/1/full");
        assert_eq!(source.name(), "jikan_api");
    }
}
