//! HTTP client abstraction for testability

use async_trait::async_trait;

/// Response head of an HTTP request. The body is never read.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
}

/// Abstraction over HTTP client for dependency injection
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient: Send + Sync {
    /// Send a GET request and return once the response head has arrived
    async fn get(&self, url: &str) -> crate::Result<HttpResponse>;
}

/// Production HTTP client using reqwest
///
/// Redirects are not followed so 3xx responses reach the probe's status check.
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("watchtower/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| crate::WatchtowerError::Http(format!("Building HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> crate::Result<HttpResponse> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| crate::WatchtowerError::Http(format!("GET {} failed: {}", url, e)))?;

        let status = response.status().as_u16();
        tracing::debug!("GET {} -> {}", url, status);
        Ok(HttpResponse { status })
    }
}
