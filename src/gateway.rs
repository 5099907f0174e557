//! Gateway device-queue API client
//!
//! This module provides an async client for the gateway's REST API that:
//! - Logs in once per gateway and keeps the session token (valid for 24h)
//! - Lists registered devices
//! - Reads, flushes and fills a device's downlink queue
//!
//! Every call returns an [`ApiResult`]; callers decide how to log failures.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::ClientConfig;
use crate::plan::{Address, Credentials, DownlinkSettings};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid payload: {0}")]
    Payload(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Body of `POST /devices/{devEUI}/queue`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueRequest {
    pub fport: u8,
    #[serde(rename = "devEUI")]
    pub dev_eui: String,
    /// Base64 of the raw payload bytes
    pub data: String,
    pub confirmed: bool,
    pub reference: String,
}

impl QueueRequest {
    /// Build a request from a hex payload
    pub fn new(dev_eui: &str, hex_payload: &str, settings: &DownlinkSettings, reference: String) -> ApiResult<Self> {
        let payload = hex_payload.trim().to_lowercase();
        let bytes = hex::decode(&payload)
            .map_err(|e| ApiError::Payload(format!("downlink '{}' is not valid hex: {}", payload, e)))?;

        Ok(Self {
            fport: settings.fport,
            dev_eui: dev_eui.to_string(),
            data: BASE64.encode(bytes),
            confirmed: settings.confirmed,
            reference,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    jwt: Option<String>,
}

/// One page of `GET /devices`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevicePage {
    /// Reported as a number or a numeric string depending on firmware
    #[serde(default, rename = "totalCount")]
    total_count: Option<serde_json::Value>,
    #[serde(default)]
    pub result: Vec<DeviceEntry>,
}

impl DevicePage {
    pub fn new(total_count: u64, result: Vec<DeviceEntry>) -> Self {
        Self {
            total_count: Some(total_count.into()),
            result,
        }
    }

    pub fn total_count(&self) -> Option<u64> {
        match self.total_count.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceEntry {
    #[serde(rename = "devEUI", alias = "devEui")]
    pub dev_eui: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Operations the transmitter needs from a gateway
#[async_trait]
pub trait DeviceQueueApi {
    /// Authenticate; later calls carry the session token
    async fn login(&mut self, credentials: &Credentials) -> ApiResult<()>;

    async fn list_devices(&self, limit: u32, offset: u32) -> ApiResult<DevicePage>;

    async fn get_queue(&self, dev_eui: &str) -> ApiResult<serde_json::Value>;

    async fn flush_queue(&self, dev_eui: &str) -> ApiResult<()>;

    async fn queue_downlink(&self, request: &QueueRequest) -> ApiResult<()>;
}

/// HTTP client for one gateway
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GatewayClient {
    /// Create a client for `https://{host}:{port}/api`
    ///
    /// # Arguments
    /// * `address` - Gateway host and port from the plan's server block
    /// * `config` - Request timeout and TLS verification setting
    pub fn new(address: &Address, config: &ClientConfig) -> anyhow::Result<Self> {
        let base_url = format!("https://{}:{}/api", address.host, address.port);
        info!(url = %base_url, "Creating gateway client");

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.insecure)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Turn non-2xx responses into `ApiError::Http`
    async fn check(response: Response) -> ApiResult<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::Http { status, body })
        }
    }
}

#[async_trait]
impl DeviceQueueApi for GatewayClient {
    async fn login(&mut self, credentials: &Credentials) -> ApiResult<()> {
        let body = serde_json::json!({
            "username": credentials.username.trim(),
            "password": credentials.password.trim(),
        });
        let response = self.client.post(self.url("/internal/login")).json(&body).send().await?;
        let login: LoginResponse = Self::check(response).await?.json().await?;

        let jwt = login
            .jwt
            .ok_or_else(|| ApiError::Payload("login response carries no jwt".to_string()))?;
        self.token = Some(jwt);
        Ok(())
    }

    async fn list_devices(&self, limit: u32, offset: u32) -> ApiResult<DevicePage> {
        let request = self
            .client
            .get(self.url("/devices"))
            .query(&[("limit", limit), ("offset", offset)]);
        let response = self.authorized(request).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn get_queue(&self, dev_eui: &str) -> ApiResult<serde_json::Value> {
        let request = self.client.get(self.url(&format!("/devices/{}/queue", dev_eui)));
        let response = self.authorized(request).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn flush_queue(&self, dev_eui: &str) -> ApiResult<()> {
        let request = self.client.delete(self.url(&format!("/devices/{}/queue", dev_eui)));
        let response = self.authorized(request).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn queue_downlink(&self, request: &QueueRequest) -> ApiResult<()> {
        let http_request = self
            .client
            .post(self.url(&format!("/devices/{}/queue", request.dev_eui)))
            .json(request);
        let response = self.authorized(http_request).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}
