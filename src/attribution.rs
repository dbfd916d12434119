/// Caller address attribution for audit entries
///
/// Resolution is best-effort and never fails: any error yields `"unknown"`.
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Value recorded when the caller address cannot be resolved
pub const UNKNOWN_ADDRESS: &str = "unknown";

#[async_trait]
pub trait Attribution: Send + Sync {
    async fn resolve_caller_address(&self) -> String;
}

/// Attribution configuration
#[derive(Debug, Clone)]
pub struct AttributionConfig {
    /// JSON endpoint answering `{"ip": "..."}`
    pub endpoint: String,
    pub timeout: Duration,
    /// User-Agent header for HTTP requests
    pub user_agent: String,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.ipify.org?format=json".to_string(),
            timeout: Duration::from_secs(3),
            user_agent: concat!("Roomwatch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AddressResponse {
    ip: String,
}

/// Resolves the public address through an HTTP lookup service
#[derive(Clone)]
pub struct HttpAttribution {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpAttribution {
    pub fn new(config: AttributionConfig) -> Self {
        // Builder failure only loses the timeout and user agent
        let http_client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http_client,
            endpoint: config.endpoint,
        }
    }

    async fn lookup(&self) -> Result<String, reqwest::Error> {
        let response = self
            .http_client
            .get(&self.endpoint)
            .send()
            .await?
            .error_for_status()?;
        let body: AddressResponse = response.json().await?;
        Ok(body.ip)
    }
}

#[async_trait]
impl Attribution for HttpAttribution {
    async fn resolve_caller_address(&self) -> String {
        match self.lookup().await {
            Ok(ip) if !ip.trim().is_empty() => ip,
            Ok(_) => UNKNOWN_ADDRESS.to_string(),
            Err(e) => {
                debug!("Caller address lookup failed: {}", e);
                UNKNOWN_ADDRESS.to_string()
            }
        }
    }
}

/// Fixed address, used when lookups are disabled and in tests
#[derive(Debug, Clone)]
pub struct StaticAttribution {
    address: String,
}

impl StaticAttribution {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN_ADDRESS)
    }
}

#[async_trait]
impl Attribution for StaticAttribution {
    async fn resolve_caller_address(&self) -> String {
        self.address.clone()
    }
}
