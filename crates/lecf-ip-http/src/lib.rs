// # HTTP IP Probe
//
// Determines the host's public address by asking plain-text echo services
// (ipify, ifconfig.me, icanhazip, ...).
//
// ## Behaviour
//
// - Services are tried in the configured order, one request each
// - The first HTTP 200 whose trimmed body parses as an IPv4 or IPv6 address
//   wins; later services are not contacted
// - Failures are logged per service and the next one is tried
// - `None` when every service failed
//
// No caching: the reconciliation engine owns the last-known address.

use async_trait::async_trait;
use lecf_core::config::DEFAULT_IP_SERVICES;
use lecf_core::traits::IpProbe;
use lecf_core::{Error, Result};

use std::net::IpAddr;
use std::time::Duration;

use tracing::{debug, warn};

/// Default HTTP timeout per service (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Public IP probe backed by HTTP echo services
#[derive(Debug, Clone)]
pub struct HttpIpProbe {
    /// Echo service URLs, in query order
    services: Vec<String>,

    client: reqwest::Client,
}

impl HttpIpProbe {
    /// Create a probe over an ordered list of services
    ///
    /// # Parameters
    ///
    /// - `services`: Echo service URLs, tried first to last
    ///
    /// # Returns
    ///
    /// - `Ok(HttpIpProbe)`: Ready to use
    /// - `Err(Error)`: Empty service list, or the HTTP client could not be built
    pub fn new(services: Vec<String>) -> Result<Self> {
        Self::with_timeout(services, DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a probe with a custom per-request timeout
    pub fn with_timeout(services: Vec<String>, timeout: Duration) -> Result<Self> {
        let services: Vec<String> = services
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if services.is_empty() {
            return Err(Error::config("At least one IP service is required"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { services, client })
    }

    /// Probe over [`DEFAULT_IP_SERVICES`]
    pub fn with_default_services() -> Result<Self> {
        Self::new(DEFAULT_IP_SERVICES.iter().map(|s| s.to_string()).collect())
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Ask one service for the address
    async fn fetch_ip(&self, url: &str) -> Result<IpAddr> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::http(format!("Request failed: {}", e)))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(Error::http(format!("HTTP error: {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read response: {}", e)))?;

        let text = body.trim();
        text.parse()
            .map_err(|_| Error::http(format!("Invalid IP address: {:?}", text)))
    }
}

#[async_trait]
impl IpProbe for HttpIpProbe {
    async fn current_ip(&self) -> Option<IpAddr> {
        for url in &self.services {
            match self.fetch_ip(url).await {
                Ok(ip) => {
                    debug!(service = %url, ip = %ip, "Public IP determined");
                    return Some(ip);
                }
                Err(e) => {
                    warn!(service = %url, error = %e, "IP service failed, trying next");
                }
            }
        }

        warn!(
            services = self.services.len(),
            "Could not determine public IP from any service"
        );
        None
    }
}
