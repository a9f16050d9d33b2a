//! HTTP client for the order store REST API
//!
//! | Method | Path | Used for |
//! |--------|------|----------|
//! | GET | `/orders/board` | initial load, fallback poll, conflict refetch |
//! | PUT | `/orders/{id}/status?status=` | status transition |
//! | POST | `/orders/{id}/complete` | `ready -> served` |
//!
//! No retries here; the caller decides.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use shared::models::{KitchenOrder, OrderStatus};

use crate::{ClientConfig, ClientError, ClientResult};

/// HTTP client for making network requests to the order store
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpClient {
    /// Create a new HTTP client from configuration
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(config.base_url.clone()));
        }

        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
        })
    }

    /// Set the authentication token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Get the current token
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Base URL joined with percent-encoded path segments
    fn url(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Handle the HTTP response
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return match status {
                StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                    Err(ClientError::Conflict(text))
                }
                StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
                StatusCode::NOT_FOUND => Err(ClientError::NotFound(text)),
                _ => Err(ClientError::Server {
                    status: status.as_u16(),
                    body: text,
                }),
            };
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    // ========== Order Store API ==========

    /// GET /orders/board
    pub async fn fetch_board(&self) -> ClientResult<Vec<KitchenOrder>> {
        let url = self.url(&["orders", "board"])?;
        let response = self.request(Method::GET, url).send().await?;
        Self::handle_response(response).await
    }

    /// PUT /orders/{id}/status?status={status}
    pub async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> ClientResult<KitchenOrder> {
        let url = self.url(&["orders", order_id, "status"])?;
        tracing::debug!(order_id = %order_id, status = %status, "Submitting status");
        let response = self
            .request(Method::PUT, url)
            .query(&[("status", status.as_str())])
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// POST /orders/{id}/complete
    pub async fn complete(&self, order_id: &str) -> ClientResult<KitchenOrder> {
        let url = self.url(&["orders", order_id, "complete"])?;
        tracing::debug!(order_id = %order_id, "Submitting completion");
        let response = self.request(Method::POST, url).send().await?;
        Self::handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_segments() {
        let client = HttpClient::new(&ClientConfig::new("http://store.local:8080/api/")).unwrap();
        let url = client.url(&["orders", "board"]).unwrap();
        assert_eq!(url.as_str(), "http://store.local:8080/api/orders/board");
    }

    #[test]
    fn test_url_encodes_order_id() {
        let client = HttpClient::new(&ClientConfig::new("http://store.local")).unwrap();
        let url = client.url(&["orders", "a/b c", "status"]).unwrap();
        assert_eq!(url.as_str(), "http://store.local/orders/a%2Fb%20c/status");
    }

    #[test]
    fn test_invalid_base_url() {
        let err = HttpClient::new(&ClientConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl(_)));
    }
}
