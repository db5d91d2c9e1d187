//! Domain group parsing
//!
//! Turns flat configuration into:
//! - certificate [`DomainGroup`]s (SANs that share one certificate)
//! - DDNS [`DdnsTarget`]s (zone → subdomains → record types)
//!
//! Parsing never fails. Malformed entries are logged and skipped, so a bad
//! line in the configuration costs coverage of that entry only.
//!
//! ## Certificate grammar
//!
//! ```text
//! example.com,www.example.com;test.com
//! ```
//!
//! `;` separates certificates, `,` separates FQDNs within one certificate.
//!
//! ## DDNS grammar
//!
//! Structured entries, one per zone:
//!
//! ```toml
//! [[ddns.domains]]
//! domain = "example.com"
//! subdomains = "@,www"      # or ["@", "www"]; defaults to "@"
//! record_types = "A,AAAA"   # optional; default applied at use time
//! ```
//!
//! or the legacy string form `example.com:@,www;other.org:@`.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Subdomain label denoting the zone apex
pub const APEX: &str = "@";

/// A non-empty, ordered set of FQDNs issued as one certificate
///
/// The first FQDN is the primary and names the certificate lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainGroup {
    domains: Vec<String>,
}

impl DomainGroup {
    /// Build a group from FQDNs, trimming and dropping blanks and repeats
    ///
    /// Returns `None` if nothing is left.
    pub fn new<I, S>(domains: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let domains: Vec<String> = domains
            .into_iter()
            .map(|d| d.as_ref().trim().to_string())
            .filter(|d| !d.is_empty())
            .filter(|d| seen.insert(d.clone()))
            .collect();

        if domains.is_empty() {
            None
        } else {
            Some(Self { domains })
        }
    }

    /// The first FQDN inserted
    pub fn primary(&self) -> &str {
        &self.domains[0]
    }

    /// All FQDNs, primary first
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn contains(&self, fqdn: &str) -> bool {
        self.domains.iter().any(|d| d == fqdn)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Whether any member is a wildcard name
    pub fn is_wildcard(&self) -> bool {
        self.domains.iter().any(|d| d.starts_with('*'))
    }
}

/// Parse a certificate domain-group spec
///
/// Groups partition the input: an FQDN that already belongs to an earlier
/// group is dropped from later ones, and a group left empty is dropped with a
/// warning.
pub fn parse_certificate_groups(spec: &str) -> Vec<DomainGroup> {
    let mut claimed: HashSet<String> = HashSet::new();
    let mut groups = Vec::new();

    for raw_group in spec.split(';') {
        if raw_group.trim().is_empty() {
            continue;
        }

        let mut members = Vec::new();
        for fqdn in raw_group.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            if claimed.contains(fqdn) && !members.iter().any(|m: &&str| *m == fqdn) {
                warn!(
                    domain = fqdn,
                    group = raw_group.trim(),
                    "Domain already belongs to an earlier certificate group, ignoring"
                );
                continue;
            }
            members.push(fqdn);
        }

        match DomainGroup::new(&members) {
            Some(group) => {
                claimed.extend(group.domains().iter().cloned());
                debug!(
                    primary = group.primary(),
                    domains = ?group.domains(),
                    "Parsed certificate group"
                );
                groups.push(group);
            }
            None => {
                warn!(
                    group = raw_group,
                    reason = "empty_domains",
                    "Invalid certificate configuration"
                );
            }
        }
    }

    groups
}

/// DNS records kept in sync for one zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdnsTarget {
    /// Zone name (e.g. "example.com")
    pub zone: String,
    /// Non-empty subdomain labels; [`APEX`] is the zone itself
    pub subdomains: Vec<String>,
    /// Explicit record types, or `None` for the configured default
    pub record_types: Option<Vec<String>>,
}

impl DdnsTarget {
    /// Record types to manage, falling back to `default` when unset
    pub fn record_types_or<'a>(&'a self, default: &'a [String]) -> &'a [String] {
        self.record_types.as_deref().unwrap_or(default)
    }
}

/// Canonical record name for a subdomain of a zone
pub fn record_name(zone: &str, subdomain: &str) -> String {
    if subdomain == APEX {
        zone.to_string()
    } else {
        format!("{}.{}", subdomain, zone)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrList {
    Text(String),
    List(Vec<String>),
}

impl StringOrList {
    fn into_items(self) -> Vec<String> {
        let items = match self {
            StringOrList::Text(text) => text.split(',').map(str::to_string).collect(),
            StringOrList::List(list) => list,
        };
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct DdnsEntry {
    domain: Option<String>,
    subdomains: Option<StringOrList>,
    record_types: Option<StringOrList>,
}

/// Parse structured DDNS entries into targets keyed by zone
///
/// A later entry for the same zone replaces an earlier one.
pub fn parse_ddns_targets(entries: &[serde_json::Value]) -> BTreeMap<String, DdnsTarget> {
    let mut targets = BTreeMap::new();

    for (index, raw) in entries.iter().enumerate() {
        let entry: DdnsEntry = match serde_json::from_value(raw.clone()) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    entry = %raw,
                    index,
                    reason = "malformed_entry",
                    error = %e,
                    "Invalid DDNS domain configuration entry"
                );
                continue;
            }
        };

        let zone = match entry.domain.as_deref().map(str::trim) {
            Some(zone) if !zone.is_empty() => zone.to_string(),
            _ => {
                warn!(
                    entry = %raw,
                    index,
                    reason = "missing_domain",
                    "Invalid DDNS domain configuration entry"
                );
                continue;
            }
        };

        let subdomains = match entry.subdomains {
            None => vec![APEX.to_string()],
            Some(value) => value.into_items(),
        };
        if subdomains.is_empty() {
            warn!(
                domain = %zone,
                reason = "no_subdomains",
                "Invalid DDNS domain configuration entry"
            );
            continue;
        }

        let record_types = entry
            .record_types
            .map(|value| {
                value
                    .into_items()
                    .into_iter()
                    .map(|t| t.to_ascii_uppercase())
                    .collect::<Vec<_>>()
            })
            .filter(|types| !types.is_empty());

        debug!(
            domain = %zone,
            subdomains = ?subdomains,
            record_types = ?record_types,
            "Parsed DDNS target"
        );

        targets.insert(
            zone.clone(),
            DdnsTarget {
                zone,
                subdomains,
                record_types,
            },
        );
    }

    targets
}

/// Parse the legacy `zone:sub,sub;zone:sub` DDNS string
///
/// Targets parsed this way always use the default record types.
pub fn parse_ddns_spec(spec: &str) -> BTreeMap<String, DdnsTarget> {
    let mut targets = BTreeMap::new();

    for (index, group) in spec.split(';').enumerate() {
        if group.trim().is_empty() {
            continue;
        }

        let Some((zone, raw_subdomains)) = group.split_once(':') else {
            warn!(group, index, "Invalid zone group format (missing ':' separator)");
            continue;
        };
        if raw_subdomains.contains(':') {
            warn!(group, index, "Invalid zone group format (expected 1 ':' separator)");
            continue;
        }

        let zone = zone.trim();
        let subdomains: Vec<String> = raw_subdomains
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if zone.is_empty() || subdomains.is_empty() {
            warn!(
                zone,
                subdomains = ?subdomains,
                "Skipping invalid zone configuration"
            );
            continue;
        }

        targets.insert(
            zone.to_string(),
            DdnsTarget {
                zone: zone.to_string(),
                subdomains,
                record_types: None,
            },
        );
    }

    targets
}
