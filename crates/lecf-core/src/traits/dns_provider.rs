// # DNS Provider Client
//
// Defines the boundary to the remote DNS authority.
//
// ## Implementations
//
// - Cloudflare: `lecf-provider-cloudflare` crate
//
// ## Failure Semantics
//
// Every call reports failure through a sentinel value (`None`, `false`, or an
// empty `Vec`). Implementations log the underlying error together with the
// operation and zone before returning the sentinel, so callers only ever do a
// success/failure check.
//
// ## Usage
//
// ```rust,ignore
// use lecf_core::traits::{DnsProviderClient, RecordFilter};
//
// let zone = client.resolve_zone("www.example.com").await?;
// let records = client
//     .list_records(&zone.id, &RecordFilter::by_name_and_type("www.example.com", "A"))
//     .await;
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A zone managed by the remote authority
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Zone {
    /// Provider-specific zone ID
    pub id: String,
    /// Zone name as reported by the provider (e.g. "example.com")
    pub name: String,
}

impl Zone {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Snapshot of a resource record owned by the remote authority
///
/// There is no concurrency token: a read-then-write against a record is last
/// writer wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Provider-specific record ID
    pub id: String,
    /// Record type ("A", "AAAA", ...)
    #[serde(rename = "type")]
    pub record_type: String,
    /// Fully-qualified record name
    pub name: String,
    /// Record content (the address for A/AAAA)
    pub content: String,
    /// Time-to-live in seconds (1 = automatic on Cloudflare)
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    /// Whether traffic is proxied through the provider
    #[serde(default)]
    pub proxied: bool,
}

fn default_ttl() -> u32 {
    1
}

/// Fields written on create or update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordData {
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
}

/// Exact-match conjunction over record fields
///
/// An empty filter matches every record in the zone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub name: Option<String>,
    pub record_type: Option<String>,
    pub content: Option<String>,
}

impl RecordFilter {
    /// Filter on exact name and type, the lookup used by reconciliation
    pub fn by_name_and_type(name: impl Into<String>, record_type: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            record_type: Some(record_type.into()),
            content: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.record_type.is_none() && self.content.is_none()
    }

    /// Check a record against every set field
    pub fn matches(&self, record: &DnsRecord) -> bool {
        self.name.as_deref().is_none_or(|n| n == record.name)
            && self
                .record_type
                .as_deref()
                .is_none_or(|t| t == record.record_type)
            && self.content.as_deref().is_none_or(|c| c == record.content)
    }

    /// Query parameters for providers that filter server-side
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(name) = &self.name {
            pairs.push(("name", name.clone()));
        }
        if let Some(record_type) = &self.record_type {
            pairs.push(("type", record_type.clone()));
        }
        if let Some(content) = &self.content {
            pairs.push(("content", content.clone()));
        }
        pairs
    }
}

/// Derive the candidate zone name from the last two labels of an FQDN
///
/// Returns `None` for input with fewer than two labels; such input is rejected
/// without contacting the provider.
pub fn zone_candidate(fqdn: &str) -> Option<String> {
    let fqdn = fqdn.trim().trim_end_matches('.');
    let labels: Vec<&str> = fqdn.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return None;
    }
    Some(format!(
        "{}.{}",
        labels[labels.len() - 2],
        labels[labels.len() - 1]
    ))
}

/// Client for the remote DNS authority
///
/// # Contract
///
/// No method returns an error to the caller. A failed call is logged by the
/// implementation with its operation and zone context, then reported as:
///
/// | method | failure value |
/// |---|---|
/// | `resolve_zone` | `None` |
/// | `list_records` | empty `Vec` |
/// | `create_record` | `None` |
/// | `update_record` | `false` |
/// | `delete_record` | `false` |
///
/// Implementations bind one request shape per operation against a fixed API
/// version and perform no retries: a failed write is re-attempted by the next
/// scheduled reconciliation.
#[async_trait]
pub trait DnsProviderClient: Send + Sync {
    /// Resolve an FQDN to the zone that manages it
    ///
    /// The candidate zone name is [`zone_candidate`] of `fqdn`; the first
    /// provider zone with exactly that name is returned.
    async fn resolve_zone(&self, fqdn: &str) -> Option<Zone>;

    /// List records in a zone matching `filter`
    async fn list_records(&self, zone_id: &str, filter: &RecordFilter) -> Vec<DnsRecord>;

    /// Create a record, returning its ID
    async fn create_record(&self, zone_id: &str, record: &RecordData) -> Option<String>;

    /// Overwrite a record's fields
    async fn update_record(&self, zone_id: &str, record_id: &str, record: &RecordData) -> bool;

    /// Delete a record
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> bool;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}
