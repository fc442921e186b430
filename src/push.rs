use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::fmt;
use tracing::warn;

/// Delivery seam: send one notification to one device token.
///
/// `true` means the provider accepted the push; `false` is recorded as a
/// failed delivery and is not retried within the cycle.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, title: &str, message: &str, token: &str) -> bool;
}

/// HTTP client for the push gateway's single-device endpoint.
#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    pub fn new(endpoint: &str, api_key: String) -> Result<Self> {
        let base_url = Url::parse(endpoint).context("invalid push gateway endpoint")?;
        let http = Client::builder()
            .user_agent("push-courier/0.1")
            .no_proxy()
            .build()
            .context("reqwest client")?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    pub fn build_request(&self, title: &str, message: &str, token: &str) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("v1/push")
            .context("invalid push gateway URL")?;
        self.http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&build_push_body(title, message, token))
            .build()
            .context("failed to build push request")
    }
}

/// JSON payload for one device push.
pub fn build_push_body(title: &str, message: &str, token: &str) -> Value {
    json!({
        "to": token,
        "notification": {
            "title": title,
            "body": message,
        },
    })
}

#[async_trait]
impl PushSender for GatewayClient {
    async fn send(&self, title: &str, message: &str, token: &str) -> bool {
        let request = match self.build_request(title, message, token) {
            Ok(request) => request,
            Err(err) => {
                warn!(?err, "failed to build push request");
                return false;
            }
        };
        match self.http.execute(request).await {
            Ok(res) if res.status().is_success() => true,
            Ok(res) => {
                let status = res.status();
                let body = res.text().await.unwrap_or_default();
                warn!(%status, %body, "push gateway rejected delivery");
                false
            }
            Err(err) => {
                warn!(?err, "failed to reach push gateway");
                false
            }
        }
    }
}
