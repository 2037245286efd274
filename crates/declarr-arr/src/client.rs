// SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::{ArrError, Result};
use crate::models::{NewTag, SystemStatus, TagResource};
use declarr_domain::ServiceInfo;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

const USER_AGENT: &str = concat!("declarr/", env!("CARGO_PKG_VERSION"));

/// HTTP client for one *arr service instance.
///
/// Authenticates with the `X-Api-Key` header on every request. Performs
/// no retries; a failed call surfaces immediately.
#[derive(Debug, Clone)]
pub struct ArrClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ArrClient {
    pub fn builder() -> ArrClientBuilder {
        ArrClientBuilder::default()
    }

    /// Fetch the service identity; doubles as the connectivity check.
    pub async fn system_status(&self) -> Result<ServiceInfo> {
        let status: SystemStatus = self.get_json("system/status").await?;
        Ok(ServiceInfo {
            app_name: status
                .app_name
                .or(status.instance_name)
                .unwrap_or_else(|| "unknown".to_string()),
            version: status.version.unwrap_or_else(|| "unknown".to_string()),
        })
    }

    pub async fn tags(&self) -> Result<Vec<TagResource>> {
        self.get_json("tag").await
    }

    pub async fn create_tag(&self, label: &str) -> Result<TagResource> {
        let url = self.url("tag")?;
        let body = self
            .send(self.client.post(url).json(&NewTag { label }))
            .await?;
        parse_body(&body)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        let body = self.send(self.client.get(url)).await?;
        parse_body(&body)
    }

    pub async fn post_json(&self, path: &str, payload: &Value) -> Result<()> {
        let url = self.url(path)?;
        self.send(self.client.post(url).json(payload)).await?;
        Ok(())
    }

    pub async fn put_json(&self, path: &str, payload: &Value) -> Result<()> {
        let url = self.url(path)?;
        self.send(self.client.put(url).json(payload)).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path)?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}/api/v3/{}", self.base_url, path))
            .map_err(|e| ArrError::InvalidBaseUrl(e.to_string()))
    }

    /// Issue one request with the API key attached, mapping the status
    /// code to the error taxonomy and returning the body text.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String> {
        let response = request.header("X-Api-Key", &self.api_key).send().await?;

        let status = response.status();
        let url = response.url().to_string();
        trace!(target: "arr", %url, %status, "response");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ArrError::Unauthorized);
        }

        if status == StatusCode::NOT_FOUND {
            return Err(ArrError::NotFound(url));
        }

        let body = response.text().await?;
        if !status.is_success() {
            debug!(target: "arr", %url, %status, "request rejected");
            return Err(ArrError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(body)
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| ArrError::InvalidResponse(format!("failed to parse response: {e}")))
}

/// Builder for configuring a service client.
#[derive(Debug, Default)]
pub struct ArrClientBuilder {
    base_url: String,
    api_key: String,
    timeout: Option<Duration>,
    insecure_tls: bool,
}

impl ArrClientBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Accept invalid TLS certificates. Only for instances behind
    /// self-signed reverse proxies.
    pub fn insecure_tls(mut self, insecure: bool) -> Self {
        self.insecure_tls = insecure;
        self
    }

    pub fn build(self) -> Result<ArrClient> {
        if self.base_url.is_empty() {
            return Err(ArrError::InvalidBaseUrl("base url is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(30)))
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(self.insecure_tls)
            .build()?;

        Ok(ArrClient {
            client,
            base_url: self.base_url,
            api_key: self.api_key,
        })
    }
}
