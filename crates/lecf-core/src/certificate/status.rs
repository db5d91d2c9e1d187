//! Certificate status evaluation
//!
//! Recomputes the lifecycle state of a [`DomainGroup`] from the CA client's
//! status output on every evaluation. Nothing is persisted between runs.
//!
//! Two expiry shapes are understood:
//!
//! ```text
//! Expiry Date: 2025-03-01 12:00:00+00:00 (VALID: 42 days)
//! Expiry Date: 2025-03-01 12:00:00+00:00
//! ```
//!
//! The relative phrase wins when present. Output that matches neither is
//! unparsable, which always leads to acquisition.

use crate::domains::DomainGroup;
use crate::error::{Error, Result};
use crate::traits::CaOutput;
use chrono::NaiveDate;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static RELATIVE_DAYS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bVALID:\s*(\d+)\s+days?").expect("relative days pattern is valid")
});

static EXPIRY_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Expiry Date:\s*(\d{4}-\d{2}-\d{2})").expect("expiry date pattern is valid")
});

const NO_CERTIFICATES: &str = "No certificates found";
const NAME_PREFIX: &str = "Certificate Name:";
const DOMAINS_PREFIX: &str = "Domains:";

/// Lifecycle state of one domain group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateState {
    /// No certificate exists for the group
    Absent,
    /// A certificate exists but does not cover these FQDNs
    MissingDomains(BTreeSet<String>),
    /// Remaining days are at or below the renewal threshold
    ExpiringWithin(i64),
    /// Status output could not be interpreted
    Unparsable(String),
    /// Nothing to do
    Valid(i64),
}

impl CertificateState {
    /// Every state other than [`CertificateState::Valid`] requires a full issuance
    pub fn needs_acquisition(&self) -> bool {
        !matches!(self, CertificateState::Valid(_))
    }

    /// Short label for structured logs
    pub fn label(&self) -> &'static str {
        match self {
            CertificateState::Absent => "absent",
            CertificateState::MissingDomains(_) => "missing_domains",
            CertificateState::ExpiringWithin(_) => "expiring",
            CertificateState::Unparsable(_) => "unparsable",
            CertificateState::Valid(_) => "valid",
        }
    }
}

/// Facts extracted from one certificate block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub name: String,
    pub domains: BTreeSet<String>,
    pub days_remaining: i64,
}

struct Block<'a> {
    name: &'a str,
    lines: Vec<&'a str>,
}

fn split_blocks(stdout: &str) -> Vec<Block<'_>> {
    let mut blocks: Vec<Block<'_>> = Vec::new();
    for line in stdout.lines() {
        let trimmed = line.trim();
        if let Some(name) = trimmed.strip_prefix(NAME_PREFIX) {
            blocks.push(Block {
                name: name.trim(),
                lines: Vec::new(),
            });
        } else if let Some(block) = blocks.last_mut() {
            block.lines.push(trimmed);
        }
    }
    blocks
}

/// Days until expiry found in `text`
///
/// # Returns
///
/// - `Some(days)`: From the relative phrase, else from the expiry date
/// - `None`: Neither shape matched (or the date is not a calendar date)
pub fn days_remaining(text: &str, today: NaiveDate) -> Option<i64> {
    let relative = RELATIVE_DAYS
        .captures(text)
        .and_then(|c| c[1].parse::<i64>().ok());
    if relative.is_some() {
        return relative;
    }

    let captures = EXPIRY_DATE.captures(text)?;
    let expiry = NaiveDate::parse_from_str(&captures[1], "%Y-%m-%d").ok()?;
    Some((expiry - today).num_days())
}

/// Decide whether status output calls for renewal
///
/// Fails safe: anything other than a recognised expiry above `threshold_days`
/// returns `true`.
pub fn check_certificate_expiry(stdout: &str, threshold_days: i64, today: NaiveDate) -> bool {
    match days_remaining(stdout, today) {
        Some(days) => days <= threshold_days,
        None => true,
    }
}

/// Extract the certificate for `primary` from status output
///
/// # Returns
///
/// - `Ok(Some(info))`: A certificate was found and fully parsed
/// - `Ok(None)`: The CA client reports no certificate, or none named `primary`
/// - `Err(Error)`: Output is in an unexpected shape
pub fn parse_certificate_info(
    stdout: &str,
    primary: &str,
    today: NaiveDate,
) -> Result<Option<CertificateInfo>> {
    if stdout.contains(NO_CERTIFICATES) {
        return Ok(None);
    }

    let blocks = split_blocks(stdout);
    if blocks.is_empty() {
        return Err(Error::ca_client("status output contains no certificate block"));
    }
    let Some(block) = blocks.iter().find(|b| b.name == primary) else {
        return Ok(None);
    };

    let domains: BTreeSet<String> = block
        .lines
        .iter()
        .find_map(|line| line.strip_prefix(DOMAINS_PREFIX))
        .map(|list| list.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    if domains.is_empty() {
        return Err(Error::ca_client(format!(
            "certificate {} has no Domains line",
            block.name
        )));
    }

    let text = block.lines.join("\n");
    let days_remaining = days_remaining(&text, today).ok_or_else(|| {
        Error::ca_client(format!("certificate {} has no recognisable expiry", block.name))
    })?;

    Ok(Some(CertificateInfo {
        name: block.name.to_string(),
        domains,
        days_remaining,
    }))
}

/// Compute the lifecycle state of `group`
///
/// # Parameters
///
/// - `group`: The domain group being evaluated
/// - `output`: Captured status invocation
/// - `threshold_days`: Renew at or below this many remaining days
/// - `today`: Reference date for absolute expiry dates
pub fn evaluate(
    group: &DomainGroup,
    output: &CaOutput,
    threshold_days: i64,
    today: NaiveDate,
) -> CertificateState {
    if !output.success() {
        return CertificateState::Absent;
    }

    let info = match parse_certificate_info(&output.stdout, group.primary(), today) {
        Ok(Some(info)) => info,
        Ok(None) => return CertificateState::Absent,
        Err(e) => return CertificateState::Unparsable(e.to_string()),
    };

    let missing: BTreeSet<String> = group
        .domains()
        .iter()
        .filter(|d| !info.domains.contains(*d))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return CertificateState::MissingDomains(missing);
    }

    if info.days_remaining <= threshold_days {
        CertificateState::ExpiringWithin(info.days_remaining)
    } else {
        CertificateState::Valid(info.days_remaining)
    }
}
