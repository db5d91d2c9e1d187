//! DNS Reconciliation Engine
//!
//! Keeps address records in line with the host's public IP.
//!
//! ## Cycle
//!
//! ```text
//! ┌─────────────┐   None    ┌────────────────────┐
//! │  IpProbe    │──────────▶│ IpUnavailable      │  (no writes)
//! └─────────────┘           └────────────────────┘
//!        │ ip == last_ip    ┌────────────────────┐
//!        ├─────────────────▶│ IpUnchanged        │  (probe only)
//!        │                  └────────────────────┘
//!        ▼
//! for each target:  resolve_zone (once)
//!     for each (subdomain, record type):
//!         family mismatch ─▶ skipped (no API call)
//!         list_records ─▶ unchanged │ update (keep proxied) │ create
//!        │
//!        ▼
//! zero errors, or failed_pass_limit passes for this ip ─▶ commit ip as last_ip
//! ```
//!
//! Triples are reconciled independently: one failure is counted and the pass
//! moves on. A pass with errors leaves the last-known IP alone so the next
//! cycle retries, up to `failed_pass_limit` consecutive passes for the same
//! address. After that the address is committed anyway and the engine falls
//! back to probe-only cycles until the IP changes again.

use crate::domains::{DdnsTarget, record_name};
use crate::traits::{DnsProviderClient, DnsRecord, IpProbe, RecordData, RecordFilter};
use std::collections::BTreeMap;
use std::net::IpAddr;
use tracing::{debug, error, info, warn};

/// TTL for records created or updated by the engine
pub const DEFAULT_RECORD_TTL: u32 = 60;

/// Consecutive erroring passes for one address before it is committed anyway
pub const DEFAULT_FAILED_PASS_LIMIT: u32 = 3;

/// Record types managed when a target does not name any
pub fn default_record_types() -> Vec<String> {
    vec!["A".to_string()]
}

/// Outcome of reconciling one (zone, subdomain, record type) triple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Created,
    Updated,
    Unchanged,
    /// Record type does not carry the address family of the current IP
    Skipped,
    Error,
}

/// Aggregate counts of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl CycleReport {
    pub fn record(&mut self, status: RecordStatus) {
        match status {
            RecordStatus::Created => self.created += 1,
            RecordStatus::Updated => self.updated += 1,
            RecordStatus::Unchanged => self.unchanged += 1,
            RecordStatus::Skipped => self.skipped += 1,
            RecordStatus::Error => self.errors += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.unchanged + self.skipped + self.errors
    }

    pub fn writes(&self) -> usize {
        self.created + self.updated
    }
}

/// What a call to [`DdnsEngine::run_cycle`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No probe service answered; nothing was written
    IpUnavailable,
    /// Same address as the last committed pass; nothing was looked up
    IpUnchanged(IpAddr),
    /// A full pass ran
    Reconciled(CycleReport),
}

/// Engine-wide record settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdnsSettings {
    /// TTL written on create and update
    pub record_ttl: u32,
    /// Applied to targets without explicit record types
    pub default_record_types: Vec<String>,
    /// Erroring passes for one address before it is committed anyway
    pub failed_pass_limit: u32,
}

impl Default for DdnsSettings {
    fn default() -> Self {
        Self {
            record_ttl: DEFAULT_RECORD_TTL,
            default_record_types: default_record_types(),
            failed_pass_limit: DEFAULT_FAILED_PASS_LIMIT,
        }
    }
}

/// Whether a record of `record_type` can hold `ip`
///
/// `A` takes IPv4 and `AAAA` takes IPv6. Other types never hold an address.
pub fn record_type_accepts(record_type: &str, ip: IpAddr) -> bool {
    match record_type {
        "A" => ip.is_ipv4(),
        "AAAA" => ip.is_ipv6(),
        _ => false,
    }
}

/// Whether `content` already holds `ip`
///
/// Compared as addresses when `content` parses, so `::1` and `0:0::1` are
/// equal; otherwise as trimmed text.
pub fn content_matches(content: &str, ip: IpAddr) -> bool {
    let content = content.trim();
    match content.parse::<IpAddr>() {
        Ok(existing) => existing == ip,
        Err(_) => content == ip.to_string(),
    }
}

/// DNS reconciliation engine
///
/// Owns the last-known IP exclusively; a cycle takes `&mut self`, so two
/// cycles of the same engine can never overlap.
pub struct DdnsEngine {
    provider: Box<dyn DnsProviderClient>,
    probe: Box<dyn IpProbe>,
    targets: BTreeMap<String, DdnsTarget>,
    settings: DdnsSettings,
    last_ip: Option<IpAddr>,
    /// Address of the current run of erroring passes and how many there were
    failed_passes: Option<(IpAddr, u32)>,
}

impl DdnsEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `provider`: DNS provider client
    /// - `probe`: Public IP probe
    /// - `targets`: Parsed DDNS targets keyed by zone
    /// - `settings`: TTL and default record types
    pub fn new(
        provider: Box<dyn DnsProviderClient>,
        probe: Box<dyn IpProbe>,
        targets: BTreeMap<String, DdnsTarget>,
        settings: DdnsSettings,
    ) -> Self {
        Self {
            provider,
            probe,
            targets,
            settings,
            last_ip: None,
            failed_passes: None,
        }
    }

    /// Address committed by the last completed pass
    pub fn last_ip(&self) -> Option<IpAddr> {
        self.last_ip
    }

    pub fn targets(&self) -> &BTreeMap<String, DdnsTarget> {
        &self.targets
    }

    /// Run one probe-and-reconcile cycle
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let Some(ip) = self.probe.current_ip().await else {
            warn!("Could not determine public IP, skipping DNS updates");
            return CycleOutcome::IpUnavailable;
        };

        if self.last_ip == Some(ip) {
            debug!(ip = %ip, "IP unchanged, no DNS updates needed");
            return CycleOutcome::IpUnchanged(ip);
        }

        info!(
            previous = ?self.last_ip,
            current = %ip,
            "Public IP changed, reconciling DNS records"
        );

        let report = self.reconcile(ip).await;

        info!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped = report.skipped,
            errors = report.errors,
            "DNS reconciliation complete"
        );

        self.settle(ip, &report);

        CycleOutcome::Reconciled(report)
    }

    /// Decide whether `ip` becomes the last-known IP after a pass
    fn settle(&mut self, ip: IpAddr, report: &CycleReport) {
        if report.errors == 0 {
            self.last_ip = Some(ip);
            self.failed_passes = None;
            return;
        }

        let passes = match self.failed_passes {
            Some((failed_ip, count)) if failed_ip == ip => count + 1,
            _ => 1,
        };

        if passes >= self.settings.failed_pass_limit {
            warn!(
                errors = report.errors,
                ip = %ip,
                passes,
                "Reconciliation keeps failing, committing IP until it changes again"
            );
            self.last_ip = Some(ip);
            self.failed_passes = None;
        } else {
            warn!(
                errors = report.errors,
                ip = %ip,
                passes,
                limit = self.settings.failed_pass_limit,
                "Reconciliation had errors, keeping previous IP so the next cycle retries"
            );
            self.failed_passes = Some((ip, passes));
        }
    }

    /// Reconcile every configured triple against `ip`
    ///
    /// Does not touch the last-known IP.
    pub async fn reconcile(&self, ip: IpAddr) -> CycleReport {
        let mut report = CycleReport::default();

        for target in self.targets.values() {
            let record_types = target.record_types_or(&self.settings.default_record_types);
            let triples = target.subdomains.len() * record_types.len();

            let Some(zone) = self.provider.resolve_zone(&target.zone).await else {
                error!(
                    zone = %target.zone,
                    records = triples,
                    "Could not find zone, skipping its records"
                );
                for record_type in record_types {
                    let status = if record_type_accepts(record_type, ip) {
                        RecordStatus::Error
                    } else {
                        RecordStatus::Skipped
                    };
                    for _ in &target.subdomains {
                        report.record(status);
                    }
                }
                continue;
            };

            for subdomain in &target.subdomains {
                for record_type in record_types {
                    let status = self
                        .reconcile_record(&zone.id, &target.zone, subdomain, record_type, ip)
                        .await;
                    report.record(status);
                }
            }
        }

        report
    }

    /// Bring one record in line with `ip`
    ///
    /// # Parameters
    ///
    /// - `zone_id`: Resolved provider zone ID
    /// - `domain`: Configured zone name used to build the record name
    /// - `subdomain`: Subdomain label, `@` for the apex
    /// - `record_type`: Record type ("A", "AAAA")
    /// - `ip`: Address the record should hold
    ///
    /// A record type of the other address family is skipped without any
    /// provider call.
    pub async fn reconcile_record(
        &self,
        zone_id: &str,
        domain: &str,
        subdomain: &str,
        record_type: &str,
        ip: IpAddr,
    ) -> RecordStatus {
        let name = record_name(domain, subdomain);
        if !record_type_accepts(record_type, ip) {
            debug!(
                record = %name,
                record_type,
                ip = %ip,
                "Record type does not match the address family, skipping"
            );
            return RecordStatus::Skipped;
        }

        let filter = RecordFilter::by_name_and_type(name.as_str(), record_type);
        let records = self.provider.list_records(zone_id, &filter).await;

        if records.iter().any(|r| content_matches(&r.content, ip)) {
            debug!(
                record = %name,
                record_type,
                ip = %ip,
                "Record already up to date"
            );
            return RecordStatus::Unchanged;
        }

        match records.first() {
            Some(existing) => self.update(zone_id, existing, &name, record_type, ip).await,
            None => self.create(zone_id, &name, record_type, ip).await,
        }
    }

    async fn update(
        &self,
        zone_id: &str,
        existing: &DnsRecord,
        name: &str,
        record_type: &str,
        ip: IpAddr,
    ) -> RecordStatus {
        let data = RecordData {
            record_type: record_type.to_string(),
            name: name.to_string(),
            content: ip.to_string(),
            ttl: self.settings.record_ttl,
            proxied: existing.proxied,
        };

        if self.provider.update_record(zone_id, &existing.id, &data).await {
            info!(
                record = %name,
                record_type,
                old = %existing.content,
                new = %ip,
                proxied = existing.proxied,
                "Updated DNS record"
            );
            RecordStatus::Updated
        } else {
            error!(record = %name, record_type, "Failed to update DNS record");
            RecordStatus::Error
        }
    }

    async fn create(&self, zone_id: &str, name: &str, record_type: &str, ip: IpAddr) -> RecordStatus {
        let data = RecordData {
            record_type: record_type.to_string(),
            name: name.to_string(),
            content: ip.to_string(),
            ttl: self.settings.record_ttl,
            proxied: false,
        };

        match self.provider.create_record(zone_id, &data).await {
            Some(id) => {
                info!(
                    record = %name,
                    record_type,
                    ip = %ip,
                    id = %id,
                    "Created DNS record"
                );
                RecordStatus::Created
            }
            None => {
                error!(record = %name, record_type, "Failed to create DNS record");
                RecordStatus::Error
            }
        }
    }
}

#[async_trait::async_trait]
impl crate::scheduler::CycleJob for DdnsEngine {
    fn name(&self) -> &str {
        "ddns"
    }

    async fn run(&mut self) {
        self.run_cycle().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_matches_compares_addresses() {
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        assert!(content_matches("2001:0db8:0000::0001", v6));
        assert!(content_matches(" 203.0.113.5\n", "203.0.113.5".parse().unwrap()));
        assert!(!content_matches("203.0.113.6", "203.0.113.5".parse().unwrap()));
        assert!(!content_matches("not-an-ip", "203.0.113.5".parse().unwrap()));
    }

    #[test]
    fn test_report_counts() {
        let mut report = CycleReport::default();
        for status in [
            RecordStatus::Created,
            RecordStatus::Updated,
            RecordStatus::Updated,
            RecordStatus::Unchanged,
            RecordStatus::Skipped,
            RecordStatus::Error,
        ] {
            report.record(status);
        }
        assert_eq!(report.total(), 6);
        assert_eq!(report.writes(), 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.errors, 1);
    }

    #[test]
    fn test_record_type_accepts_matching_family() {
        let v4: IpAddr = "198.51.100.7".parse().unwrap();
        let v6: IpAddr = "2001:db8::7".parse().unwrap();
        assert!(record_type_accepts("A", v4));
        assert!(!record_type_accepts("AAAA", v4));
        assert!(record_type_accepts("AAAA", v6));
        assert!(!record_type_accepts("A", v6));
        assert!(!record_type_accepts("CNAME", v4));
    }

    #[test]
    fn test_default_settings() {
        let settings = DdnsSettings::default();
        assert_eq!(settings.record_ttl, 60);
        assert_eq!(settings.default_record_types, vec!["A"]);
        assert_eq!(settings.failed_pass_limit, 3);
    }
}
