//! Configuration types for LECF
//!
//! Configuration is read once at startup from a TOML file and handed to each
//! component as an explicit value. Values missing from the file are filled
//! from environment variables, then from built-in defaults. A value present
//! in the file always wins.
//!
//! ```toml
//! [cloudflare]
//! api_token = "..."
//!
//! [certificate]
//! email = "ops@example.com"
//! domains = ["example.com,www.example.com", "*.example.org"]
//!
//! [ddns]
//! check_interval_minutes = 15
//!
//! [[ddns.domains]]
//! domain = "example.com"
//! subdomains = "@,www"
//! ```
//!
//! Environment lookup is passed in as a closure (`Fn(&str) -> Option<String>`)
//! so loading can be tested without touching the process environment.

use crate::certificate::CertificateSettings;
use crate::certificate::certbot::{
    DEFAULT_CERTBOT_PATH, DEFAULT_CREDENTIALS_PATH, DEFAULT_PROPAGATION_SECONDS,
    DEFAULT_WILDCARD_SERVER,
};
use crate::ddns::{DEFAULT_FAILED_PASS_LIMIT, DEFAULT_RECORD_TTL, DdnsSettings, default_record_types};
use crate::domains::{DdnsTarget, DomainGroup, parse_certificate_groups, parse_ddns_spec, parse_ddns_targets};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "LECF_CONFIG";

/// IP-echo services probed in order
pub const DEFAULT_IP_SERVICES: &[&str] = &[
    "https://api.ipify.org",
    "https://ifconfig.me/ip",
    "https://icanhazip.com",
    "https://checkip.amazonaws.com",
];

/// Main LECF configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LecfConfig {
    pub cloudflare: CloudflareConfig,
    pub certificate: CertificateConfig,
    pub ddns: DdnsConfig,
    pub logging: LoggingConfig,
}

/// Cloudflare credentials
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudflareConfig {
    /// API token with Zone:DNS:Edit permission
    pub api_token: String,
    /// Account email, written to the credentials file when set
    pub email: Option<String>,
}

impl fmt::Debug for CloudflareConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareConfig")
            .field("api_token", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}

/// Certificate service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    /// Domain-group strings (`a.com,www.a.com`); `;` may also separate groups
    pub domains: Vec<String>,
    /// Contact email registered with the CA
    pub email: String,
    /// Use the CA's staging environment
    pub staging: bool,
    pub renewal_threshold_days: i64,
    pub check_interval_hours: u64,
    /// Credentials file read by the DNS plugin
    pub credentials_path: PathBuf,
    pub certbot_path: String,
    pub wildcard_propagation_seconds: u64,
    pub wildcard_server: String,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            email: String::new(),
            staging: false,
            renewal_threshold_days: crate::certificate::DEFAULT_RENEWAL_THRESHOLD_DAYS,
            check_interval_hours: 12,
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
            certbot_path: DEFAULT_CERTBOT_PATH.to_string(),
            wildcard_propagation_seconds: DEFAULT_PROPAGATION_SECONDS,
            wildcard_server: DEFAULT_WILDCARD_SERVER.to_string(),
        }
    }
}

/// DDNS service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DdnsConfig {
    pub check_interval_minutes: u64,
    pub record_ttl: u32,
    pub default_record_types: Vec<String>,
    /// Erroring passes for one address before it is committed anyway
    pub failed_pass_limit: u32,
    pub ip_services: Vec<String>,
    /// Raw per-zone entries, validated one by one when targets are built
    pub domains: Vec<serde_json::Value>,
}

impl Default for DdnsConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: 15,
            record_ttl: DEFAULT_RECORD_TTL,
            default_record_types: default_record_types(),
            failed_pass_limit: DEFAULT_FAILED_PASS_LIMIT,
            ip_services: DEFAULT_IP_SERVICES.iter().map(|s| s.to_string()).collect(),
            domains: Vec::new(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level or `tracing` filter directive
    pub level: String,
    /// `json` or `text`
    pub format: LogFormat,
    /// Also write log lines to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            file: None,
        }
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

fn env_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "0" | "no" | "n" | "off" | "" => Some(false),
        _ => None,
    }
}

fn section<'a>(root: &'a mut toml::Table, name: &str) -> Option<&'a mut toml::Table> {
    root.entry(name)
        .or_insert_with(|| toml::Value::Table(toml::Table::new()))
        .as_table_mut()
}

struct EnvFallback<'a, F> {
    env: &'a F,
}

impl<F> EnvFallback<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, table: &mut toml::Table, key: &str, var: &str) {
        if table.contains_key(key) {
            return;
        }
        if let Some(value) = (self.env)(var).filter(|v| !v.trim().is_empty()) {
            debug!(key, var, "Using environment fallback");
            table.insert(key.to_string(), toml::Value::String(value.trim().to_string()));
        }
    }

    fn integer(&self, table: &mut toml::Table, key: &str, var: &str) {
        if table.contains_key(key) {
            return;
        }
        if let Some(value) = (self.env)(var) {
            match value.trim().parse::<i64>() {
                Ok(n) => {
                    table.insert(key.to_string(), toml::Value::Integer(n));
                }
                Err(_) => warn!(var, value = %value, "Ignoring non-integer environment value"),
            }
        }
    }

    fn boolean(&self, table: &mut toml::Table, key: &str, var: &str) {
        if table.contains_key(key) {
            return;
        }
        if let Some(value) = (self.env)(var) {
            match env_bool(&value) {
                Some(b) => {
                    table.insert(key.to_string(), toml::Value::Boolean(b));
                }
                None => warn!(var, value = %value, "Ignoring non-boolean environment value"),
            }
        }
    }
}

fn legacy_ddns_entries(spec: &str) -> toml::Value {
    let entries = parse_ddns_spec(spec)
        .into_values()
        .map(|target| {
            let mut entry = toml::Table::new();
            entry.insert("domain".to_string(), toml::Value::String(target.zone));
            entry.insert(
                "subdomains".to_string(),
                toml::Value::Array(
                    target
                        .subdomains
                        .into_iter()
                        .map(toml::Value::String)
                        .collect(),
                ),
            );
            toml::Value::Table(entry)
        })
        .collect();
    toml::Value::Array(entries)
}

fn apply_env_fallbacks<F>(root: &mut toml::Table, env: &F)
where
    F: Fn(&str) -> Option<String>,
{
    let fallback = EnvFallback { env };

    if let Some(table) = section(root, "cloudflare") {
        fallback.string(table, "api_token", "CLOUDFLARE_API_TOKEN");
        fallback.string(table, "email", "CLOUDFLARE_EMAIL");
        fallback.string(table, "email", "CERTBOT_EMAIL");
    }

    if let Some(table) = section(root, "certificate") {
        fallback.string(table, "email", "CERTBOT_EMAIL");
        fallback.boolean(table, "staging", "CERTBOT_STAGING");
        fallback.integer(table, "renewal_threshold_days", "CERT_RENEWAL_THRESHOLD_DAYS");
        fallback.integer(table, "check_interval_hours", "CERT_CHECK_INTERVAL_HOURS");
        if !table.contains_key("domains") {
            if let Some(domains) = env("DOMAINS").filter(|d| !d.trim().is_empty()) {
                table.insert(
                    "domains".to_string(),
                    toml::Value::Array(vec![toml::Value::String(domains)]),
                );
            }
        }
    }

    if let Some(table) = section(root, "ddns") {
        fallback.integer(table, "check_interval_minutes", "DDNS_CHECK_INTERVAL_MINUTES");
        fallback.integer(table, "failed_pass_limit", "DDNS_FAILED_PASS_LIMIT");
        if !table.contains_key("domains") {
            if let Some(spec) = env("DDNS_DOMAINS").filter(|d| !d.trim().is_empty()) {
                table.insert("domains".to_string(), legacy_ddns_entries(&spec));
            }
        }
    }

    if let Some(table) = section(root, "logging") {
        fallback.string(table, "level", "LOG_LEVEL");
        fallback.string(table, "file", "LOG_FILE");
        if !table.contains_key("format") {
            if let Some(format) = env("LOG_FORMAT").filter(|f| !f.trim().is_empty()) {
                table.insert(
                    "format".to_string(),
                    toml::Value::String(format.trim().to_ascii_lowercase()),
                );
            }
        }
    }
}

impl LecfConfig {
    /// Parse TOML text, filling gaps from `env`
    pub fn from_toml_str<F>(text: &str, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut root: toml::Table = toml::from_str(text)?;
        apply_env_fallbacks(&mut root, &env);
        let config: LecfConfig = toml::Value::Table(root).try_into()?;
        Ok(config)
    }

    /// Build a configuration from `env` and defaults only
    pub fn from_env<F>(env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_toml_str("", env)
    }

    /// Candidate config file locations, in search order
    pub fn search_paths<F>(env: &F) -> Vec<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut paths = vec![PathBuf::from("config.toml"), PathBuf::from("/app/config.toml")];
        if let Some(home) = env("HOME") {
            paths.push(Path::new(&home).join(".config").join("lecf").join("config.toml"));
        }
        paths
    }

    /// Load configuration, taking an explicit file from `LECF_CONFIG`
    pub fn load<F>(env: F) -> Result<(Self, Option<PathBuf>)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let explicit = env(CONFIG_PATH_ENV)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(explicit.as_deref(), env)
    }

    /// Load configuration
    ///
    /// # Parameters
    ///
    /// - `explicit`: File that must exist (from `--config` or `LECF_CONFIG`).
    ///   Without it, the first existing file from [`LecfConfig::search_paths`]
    ///   is used, or none.
    /// - `env`: Environment lookup for fallbacks
    ///
    /// # Returns
    ///
    /// The configuration and the file it came from, if any
    pub fn load_from<F>(explicit: Option<&Path>, env: F) -> Result<(Self, Option<PathBuf>)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = match explicit {
            Some(explicit) => {
                let path = explicit.to_path_buf();
                if !path.is_file() {
                    return Err(Error::config(format!(
                        "Config file {} does not exist",
                        path.display()
                    )));
                }
                Some(path)
            }
            None => Self::search_paths(&env).into_iter().find(|p| p.is_file()),
        };

        let text = match &path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                Error::config(format!("Failed to read {}: {}", path.display(), e))
            })?,
            None => String::new(),
        };

        let config = Self::from_toml_str(&text, env)?;
        Ok((config, path))
    }

    /// Validate settings shared by every service
    pub fn validate(&self) -> Result<()> {
        if self.cloudflare.api_token.trim().is_empty() {
            return Err(Error::config(
                "Cloudflare API token is required (cloudflare.api_token or CLOUDFLARE_API_TOKEN)",
            ));
        }
        if self.certificate.check_interval_hours == 0 {
            return Err(Error::config("certificate.check_interval_hours must be > 0"));
        }
        if self.ddns.check_interval_minutes == 0 {
            return Err(Error::config("ddns.check_interval_minutes must be > 0"));
        }
        if self.ddns.failed_pass_limit == 0 {
            return Err(Error::config("ddns.failed_pass_limit must be > 0"));
        }
        if self.ddns.ip_services.is_empty() {
            return Err(Error::config("ddns.ip_services cannot be empty"));
        }
        Ok(())
    }

    /// Validate what the certificate service needs beyond [`LecfConfig::validate`]
    pub fn validate_certificate(&self) -> Result<()> {
        if self.certificate.email.trim().is_empty() {
            return Err(Error::config(
                "Certificate email is required (certificate.email or CERTBOT_EMAIL)",
            ));
        }
        if self.certificate_groups().is_empty() {
            return Err(Error::config("No certificate domains configured"));
        }
        Ok(())
    }

    /// Parsed certificate domain groups across every configured entry
    pub fn certificate_groups(&self) -> Vec<DomainGroup> {
        parse_certificate_groups(&self.certificate.domains.join(";"))
    }

    /// Parsed DDNS targets keyed by zone
    pub fn ddns_targets(&self) -> BTreeMap<String, DdnsTarget> {
        parse_ddns_targets(&self.ddns.domains)
    }

    pub fn certificate_settings(&self) -> CertificateSettings {
        CertificateSettings {
            email: self.certificate.email.trim().to_string(),
            staging: self.certificate.staging,
            renewal_threshold_days: self.certificate.renewal_threshold_days,
        }
    }

    pub fn ddns_settings(&self) -> DdnsSettings {
        let types = self
            .ddns
            .default_record_types
            .iter()
            .map(|t| t.trim().to_ascii_uppercase())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>();

        DdnsSettings {
            record_ttl: self.ddns.record_ttl,
            default_record_types: if types.is_empty() {
                default_record_types()
            } else {
                types
            },
            failed_pass_limit: self.ddns.failed_pass_limit,
        }
    }

    pub fn certificate_interval(&self) -> Duration {
        Duration::from_secs(self.certificate.check_interval_hours * 3600)
    }

    pub fn ddns_interval(&self) -> Duration {
        Duration::from_secs(self.ddns.check_interval_minutes * 60)
    }
}
