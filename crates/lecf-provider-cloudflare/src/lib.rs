// # Cloudflare DNS Provider Client
//
// [`DnsProviderClient`] bound to the Cloudflare API v4.
//
// ## Behaviour
//
// - One HTTP request per trait call, against a fixed API version; record
//   listings follow `result_info` across pages
// - HTTP timeout of 30 seconds
// - Specific error messages for HTTP 401/403, 404, 409, 429 and 5xx
// - No retry, backoff or caching: a failed call is retried by the next
//   scheduled reconciliation
// - Errors are logged with operation and zone, then reported as the trait's
//   sentinel value (`None`, `false`, empty `Vec`)
//
// ## Security
//
// - The API token never appears in logs or `Debug` output
// - An empty token is rejected at construction
//
// ## API Reference
//
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...&page=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Overwrite DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use lecf_core::traits::{
    DnsProviderClient, DnsRecord, RecordData, RecordFilter, Zone, zone_candidate,
};
use lecf_core::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Records requested per page when listing
const RECORDS_PER_PAGE: u32 = 100;

/// Upper bound on pages fetched for one listing
const MAX_RECORD_PAGES: u32 = 50;

const PROVIDER: &str = "cloudflare";

/// Response envelope shared by every v4 endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

/// Paging metadata of list endpoints
#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    page: u32,
    #[serde(default)]
    total_pages: u32,
}

impl ResultInfo {
    fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ZoneResult {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct IdResult {
    id: String,
}

/// Map a non-success HTTP status to an error
fn status_error(status: reqwest::StatusCode, body: &str, operation: &str) -> Error {
    let message = match status.as_u16() {
        401 | 403 => format!(
            "Authentication failed: Invalid API token or insufficient permissions. Status: {}",
            status
        ),
        404 => format!("{}: not found. Status: {}", operation, status),
        409 => format!("{}: conflict with an existing record. Status: {}", operation, status),
        429 => format!("Rate limit exceeded. Please retry later. Status: {}", status),
        500..=599 => format!("Cloudflare server error (transient): {} - {}", status, body),
        _ => format!("{} failed: {} - {}", operation, status, body),
    };
    Error::provider(PROVIDER, message)
}

/// Cloudflare DNS provider client
///
/// The `Debug` implementation does not expose the API token.
pub struct CloudflareClient {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// API base URL, overridable for tests
    base_url: String,

    client: reqwest::Client,
}

impl std::fmt::Debug for CloudflareClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareClient")
            .field("api_token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl CloudflareClient {
    /// Create a client for the public Cloudflare API
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    ///
    /// # Returns
    ///
    /// - `Ok(CloudflareClient)`: Ready to use
    /// - `Err(Error)`: Empty token, or the HTTP client could not be built
    pub fn new(api_token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_token, CLOUDFLARE_API_BASE)
    }

    /// Create a client against another API base URL
    pub fn with_base_url(api_token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and unwrap the v4 envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<Option<T>> {
        Ok(self.send_envelope(request, operation).await?.result)
    }

    /// Send a request and return the checked envelope with its paging info
    async fn send_envelope<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<Envelope<T>> {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, &body, operation));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("Failed to parse response: {}", e)))?;

        if !envelope.success {
            let messages: Vec<String> = envelope
                .errors
                .iter()
                .map(|m| format!("{} ({})", m.message, m.code))
                .collect();
            return Err(Error::provider(
                PROVIDER,
                format!("{} rejected: {}", operation, messages.join("; ")),
            ));
        }

        Ok(envelope)
    }

    async fn find_zone(&self, fqdn: &str) -> Result<Option<Zone>> {
        let name = zone_candidate(fqdn)
            .ok_or_else(|| Error::invalid_input(format!("Invalid domain name: {}", fqdn)))?;

        debug!(zone = %name, "Looking up zone");

        let request = self
            .client
            .get(self.url("/zones"))
            .query(&[("name", name.as_str())]);
        let zones: Vec<ZoneResult> = self
            .send(request, "Zone lookup")
            .await?
            .unwrap_or_default();

        Ok(zones
            .into_iter()
            .find(|z| z.name == name)
            .map(|z| Zone::new(z.id, z.name)))
    }

    async fn fetch_records(&self, zone_id: &str, filter: &RecordFilter) -> Result<Vec<DnsRecord>> {
        let url = self.url(&format!("/zones/{}/dns_records", zone_id));
        let mut records: Vec<DnsRecord> = Vec::new();
        let mut page = 1;

        loop {
            let mut query = filter.query_pairs();
            query.push(("per_page", RECORDS_PER_PAGE.to_string()));
            query.push(("page", page.to_string()));

            let request = self.client.get(&url).query(&query);
            let envelope: Envelope<Vec<DnsRecord>> =
                self.send_envelope(request, "Record lookup").await?;
            records.extend(envelope.result.unwrap_or_default());

            match envelope.result_info {
                Some(info) if info.has_next() && page < MAX_RECORD_PAGES => {
                    debug!(zone_id, page, total_pages = info.total_pages, "Fetching next page of records");
                    page += 1;
                }
                _ => break,
            }
        }

        Ok(records.into_iter().filter(|r| filter.matches(r)).collect())
    }

    async fn post_record(&self, zone_id: &str, record: &RecordData) -> Result<String> {
        let request = self
            .client
            .post(self.url(&format!("/zones/{}/dns_records", zone_id)))
            .json(record);
        let created: Option<IdResult> = self.send(request, "Record create").await?;
        created
            .map(|r| r.id)
            .ok_or_else(|| Error::provider(PROVIDER, "Invalid response format: missing result.id"))
    }

    async fn put_record(&self, zone_id: &str, record_id: &str, record: &RecordData) -> Result<()> {
        let request = self
            .client
            .put(self.url(&format!("/zones/{}/dns_records/{}", zone_id, record_id)))
            .json(record);
        let _: Option<IdResult> = self.send(request, "Record update").await?;
        Ok(())
    }

    async fn remove_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        let request = self
            .client
            .delete(self.url(&format!("/zones/{}/dns_records/{}", zone_id, record_id)));
        let _: Option<IdResult> = self.send(request, "Record delete").await?;
        Ok(())
    }
}

#[async_trait]
impl DnsProviderClient for CloudflareClient {
    async fn resolve_zone(&self, fqdn: &str) -> Option<Zone> {
        match self.find_zone(fqdn).await {
            Ok(Some(zone)) => {
                debug!(domain = fqdn, zone_id = %zone.id, "Resolved zone");
                Some(zone)
            }
            Ok(None) => {
                error!(operation = "resolve_zone", domain = fqdn, "No matching zone found");
                None
            }
            Err(e) => {
                error!(operation = "resolve_zone", domain = fqdn, error = %e, "Zone lookup failed");
                None
            }
        }
    }

    async fn list_records(&self, zone_id: &str, filter: &RecordFilter) -> Vec<DnsRecord> {
        match self.fetch_records(zone_id, filter).await {
            Ok(records) => records,
            Err(e) => {
                error!(
                    operation = "list_records",
                    zone_id,
                    filter = ?filter,
                    error = %e,
                    "Listing DNS records failed"
                );
                Vec::new()
            }
        }
    }

    async fn create_record(&self, zone_id: &str, record: &RecordData) -> Option<String> {
        match self.post_record(zone_id, record).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(
                    operation = "create_record",
                    zone_id,
                    record = %record.name,
                    record_type = %record.record_type,
                    error = %e,
                    "Creating DNS record failed"
                );
                None
            }
        }
    }

    async fn update_record(&self, zone_id: &str, record_id: &str, record: &RecordData) -> bool {
        match self.put_record(zone_id, record_id, record).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    operation = "update_record",
                    zone_id,
                    record_id,
                    record = %record.name,
                    error = %e,
                    "Updating DNS record failed"
                );
                false
            }
        }
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> bool {
        match self.remove_record(zone_id, record_id).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    operation = "delete_record",
                    zone_id,
                    record_id,
                    error = %e,
                    "Deleting DNS record failed"
                );
                false
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_empty_token_is_rejected() {
        let err = CloudflareClient::new("  ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let client = CloudflareClient::new("secret_token_12345").unwrap();

        let debug_str = format!("{:?}", client);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareClient"));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = CloudflareClient::with_base_url("token", "http://localhost:1234/").unwrap();
        assert_eq!(client.url("/zones"), "http://localhost:1234/zones");
    }

    #[test]
    fn test_provider_name() {
        let client = CloudflareClient::new("token").unwrap();
        assert_eq!(client.provider_name(), "cloudflare");
    }

    #[test]
    fn test_result_info_has_next() {
        let info: ResultInfo = serde_json::from_str(r#"{"page": 1, "total_pages": 2}"#).unwrap();
        assert!(info.has_next());

        let info: ResultInfo = serde_json::from_str(r#"{"page": 2, "total_pages": 2}"#).unwrap();
        assert!(!info.has_next());

        let info: ResultInfo = serde_json::from_str(r#"{"count": 0}"#).unwrap();
        assert!(!info.has_next());
    }

    #[test]
    fn test_status_error_messages() {
        let auth = status_error(StatusCode::FORBIDDEN, "", "Zone lookup").to_string();
        assert!(auth.contains("Authentication failed"));

        let limited = status_error(StatusCode::TOO_MANY_REQUESTS, "", "Zone lookup").to_string();
        assert!(limited.contains("Rate limit"));

        let transient = status_error(StatusCode::BAD_GATEWAY, "upstream", "Zone lookup").to_string();
        assert!(transient.contains("transient"));
        assert!(transient.contains("upstream"));
    }
}
