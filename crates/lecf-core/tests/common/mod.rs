//! Test doubles and common utilities for contract tests
//!
//! The doubles keep their state behind `Arc`s so a test can hand one copy to
//! an engine and inspect another through `sharing_counters_with`.

#![allow(dead_code)]

use lecf_core::domains::{DdnsTarget, parse_ddns_targets};
use lecf_core::error::Result;
use lecf_core::traits::{
    CaClient, CaOutput, ChallengeRequest, DnsProviderClient, DnsRecord, IpProbe, RecordData,
    RecordFilter, Zone, zone_candidate,
};
use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// An IP probe whose answer the test controls
pub struct ScriptedIpProbe {
    ip: Arc<Mutex<Option<IpAddr>>>,
    call_count: Arc<AtomicUsize>,
}

impl ScriptedIpProbe {
    pub fn new(ip: Option<IpAddr>) -> Self {
        Self {
            ip: Arc::new(Mutex::new(ip)),
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Change the address returned by the next probe
    pub fn set_ip(&self, ip: Option<IpAddr>) {
        *self.ip.lock().unwrap() = ip;
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            ip: Arc::clone(&other.ip),
            call_count: Arc::clone(&other.call_count),
        }
    }
}

#[async_trait::async_trait]
impl IpProbe for ScriptedIpProbe {
    async fn current_ip(&self) -> Option<IpAddr> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        *self.ip.lock().unwrap()
    }
}

/// Calls observed by [`MockDnsProvider`]
#[derive(Default)]
pub struct ProviderCalls {
    pub resolve: AtomicUsize,
    pub list: AtomicUsize,
    pub create: AtomicUsize,
    pub update: AtomicUsize,
    pub delete: AtomicUsize,
}

/// In-memory DNS authority
pub struct MockDnsProvider {
    zones: Arc<Mutex<Vec<Zone>>>,
    failing_zones: Arc<Mutex<HashSet<String>>>,
    failing_writes: Arc<Mutex<HashSet<String>>>,
    records: Arc<Mutex<Vec<(String, DnsRecord)>>>,
    creates: Arc<Mutex<Vec<RecordData>>>,
    updates: Arc<Mutex<Vec<(String, RecordData)>>>,
    calls: Arc<ProviderCalls>,
    next_id: Arc<AtomicUsize>,
}

impl MockDnsProvider {
    /// A provider hosting `zones`, with zone IDs `zone-<name>`
    pub fn with_zones(zones: &[&str]) -> Self {
        Self {
            zones: Arc::new(Mutex::new(
                zones
                    .iter()
                    .map(|z| Zone::new(format!("zone-{}", z), *z))
                    .collect(),
            )),
            failing_zones: Arc::new(Mutex::new(HashSet::new())),
            failing_writes: Arc::new(Mutex::new(HashSet::new())),
            records: Arc::new(Mutex::new(Vec::new())),
            creates: Arc::new(Mutex::new(Vec::new())),
            updates: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(ProviderCalls::default()),
            next_id: Arc::new(AtomicUsize::new(1)),
        }
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            zones: Arc::clone(&other.zones),
            failing_zones: Arc::clone(&other.failing_zones),
            failing_writes: Arc::clone(&other.failing_writes),
            records: Arc::clone(&other.records),
            creates: Arc::clone(&other.creates),
            updates: Arc::clone(&other.updates),
            calls: Arc::clone(&other.calls),
            next_id: Arc::clone(&other.next_id),
        }
    }

    /// Make zone lookups for `zone` fail
    pub fn fail_zone(&self, zone: &str) {
        self.failing_zones.lock().unwrap().insert(zone.to_string());
    }

    pub fn restore_zone(&self, zone: &str) {
        self.failing_zones.lock().unwrap().remove(zone);
    }

    /// Make creates and updates of record `name` fail
    pub fn fail_writes_for(&self, name: &str) {
        self.failing_writes.lock().unwrap().insert(name.to_string());
    }

    /// Seed an existing record
    pub fn insert_record(&self, zone: &str, record_type: &str, name: &str, content: &str, proxied: bool) {
        let id = format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.records.lock().unwrap().push((
            format!("zone-{}", zone),
            DnsRecord {
                id,
                record_type: record_type.to_string(),
                name: name.to_string(),
                content: content.to_string(),
                ttl: 300,
                proxied,
            },
        ));
    }

    pub fn records(&self) -> Vec<DnsRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn created(&self) -> Vec<RecordData> {
        self.creates.lock().unwrap().clone()
    }

    pub fn updated(&self) -> Vec<(String, RecordData)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn resolve_count(&self) -> usize {
        self.calls.resolve.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> usize {
        self.calls.list.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> usize {
        self.calls.create.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.calls.update.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.create_count() + self.update_count() + self.calls.delete.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DnsProviderClient for MockDnsProvider {
    async fn resolve_zone(&self, fqdn: &str) -> Option<Zone> {
        self.calls.resolve.fetch_add(1, Ordering::SeqCst);
        let candidate = zone_candidate(fqdn)?;
        if self.failing_zones.lock().unwrap().contains(&candidate) {
            return None;
        }
        self.zones
            .lock()
            .unwrap()
            .iter()
            .find(|z| z.name == candidate)
            .cloned()
    }

    async fn list_records(&self, zone_id: &str, filter: &RecordFilter) -> Vec<DnsRecord> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(zone, record)| zone == zone_id && filter.matches(record))
            .map(|(_, record)| record.clone())
            .collect()
    }

    async fn create_record(&self, zone_id: &str, record: &RecordData) -> Option<String> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        self.creates.lock().unwrap().push(record.clone());
        if self.failing_writes.lock().unwrap().contains(&record.name) {
            return None;
        }

        let id = format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.records.lock().unwrap().push((
            zone_id.to_string(),
            DnsRecord {
                id: id.clone(),
                record_type: record.record_type.clone(),
                name: record.name.clone(),
                content: record.content.clone(),
                ttl: record.ttl,
                proxied: record.proxied,
            },
        ));
        Some(id)
    }

    async fn update_record(&self, _zone_id: &str, record_id: &str, record: &RecordData) -> bool {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        self.updates
            .lock()
            .unwrap()
            .push((record_id.to_string(), record.clone()));
        if self.failing_writes.lock().unwrap().contains(&record.name) {
            return false;
        }

        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|(_, r)| r.id == record_id) {
            Some((_, existing)) => {
                existing.content = record.content.clone();
                existing.ttl = record.ttl;
                existing.proxied = record.proxied;
                true
            }
            None => false,
        }
    }

    async fn delete_record(&self, _zone_id: &str, record_id: &str) -> bool {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|(_, r)| r.id != record_id);
        records.len() != before
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// A CA client with canned status output per certificate name
pub struct ScriptedCaClient {
    status: Arc<Mutex<BTreeMap<String, CaOutput>>>,
    failing_obtains: Arc<Mutex<HashSet<String>>>,
    requests: Arc<Mutex<Vec<ChallengeRequest>>>,
    status_calls: Arc<AtomicUsize>,
}

impl ScriptedCaClient {
    pub fn new() -> Self {
        Self {
            status: Arc::new(Mutex::new(BTreeMap::new())),
            failing_obtains: Arc::new(Mutex::new(HashSet::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            status_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            status: Arc::clone(&other.status),
            failing_obtains: Arc::clone(&other.failing_obtains),
            requests: Arc::clone(&other.requests),
            status_calls: Arc::clone(&other.status_calls),
        }
    }

    /// Status stdout reported for `cert_name` (exit status zero)
    pub fn set_status(&self, cert_name: &str, stdout: &str) {
        self.status.lock().unwrap().insert(
            cert_name.to_string(),
            CaOutput {
                exit_code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
    }

    /// Make issuance for `cert_name` exit non-zero
    pub fn fail_obtain(&self, cert_name: &str) {
        self.failing_obtains
            .lock()
            .unwrap()
            .insert(cert_name.to_string());
    }

    pub fn requests(&self) -> Vec<ChallengeRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CaClient for ScriptedCaClient {
    async fn status(&self, cert_name: &str) -> Result<CaOutput> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .status
            .lock()
            .unwrap()
            .get(cert_name)
            .cloned()
            .unwrap_or_else(|| CaOutput {
                exit_code: Some(0),
                stdout: "No certificates found.\n".to_string(),
                stderr: String::new(),
            }))
    }

    async fn obtain(&self, request: &ChallengeRequest) -> Result<CaOutput> {
        self.requests.lock().unwrap().push(request.clone());
        let failing = self
            .failing_obtains
            .lock()
            .unwrap()
            .contains(&request.cert_name);
        Ok(CaOutput {
            exit_code: Some(if failing { 1 } else { 0 }),
            stdout: String::new(),
            stderr: if failing {
                "Some challenges have failed.".to_string()
            } else {
                String::new()
            },
        })
    }
}

/// certbot-style status block for one certificate
pub fn certbot_status(name: &str, domains: &[&str], days: i64) -> String {
    format!(
        "Found the following certs:\n  Certificate Name: {}\n    Serial Number: 1a2b\n    Key Type: ECDSA\n    Domains: {}\n    Expiry Date: 2099-01-01 00:00:00+00:00 (VALID: {} days)\n    Certificate Path: /etc/letsencrypt/live/{}/fullchain.pem\n",
        name,
        domains.join(" "),
        days,
        name
    )
}

/// Parse DDNS targets from `(zone, subdomains)` pairs
pub fn targets(entries: &[(&str, &str)]) -> BTreeMap<String, DdnsTarget> {
    let values: Vec<serde_json::Value> = entries
        .iter()
        .map(|(zone, subdomains)| serde_json::json!({"domain": zone, "subdomains": subdomains}))
        .collect();
    parse_ddns_targets(&values)
}

pub fn ip(text: &str) -> IpAddr {
    text.parse().unwrap()
}
