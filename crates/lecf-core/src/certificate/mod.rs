//! Certificate Lifecycle Engine
//!
//! Re-evaluates every [`DomainGroup`] on each run and acquires a certificate
//! for any group that is not [`CertificateState::Valid`].
//!
//! ## Flow
//!
//! ```text
//! for each group (sequentially):
//!     CaClient::status(primary) ─▶ evaluate ─▶ Valid ─▶ done
//!                                      │
//!                                      └─▶ Absent / MissingDomains /
//!                                          ExpiringWithin / Unparsable
//!                                              │
//!                                              ▼
//!                                   CaClient::obtain(full group)
//! ```
//!
//! A failed acquisition is reported and left for the next run. There is no
//! retry inside a run.

pub mod certbot;
pub mod status;

pub use certbot::CertbotClient;
pub use status::{CertificateInfo, CertificateState, check_certificate_expiry, evaluate};

use crate::domains::DomainGroup;
use crate::traits::{CaClient, CaOutput, ChallengeRequest};
use chrono::{NaiveDate, Utc};
use tracing::{debug, error, info, warn};

/// Default renewal threshold in days
pub const DEFAULT_RENEWAL_THRESHOLD_DAYS: i64 = 30;

/// Settings shared by every group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSettings {
    /// Contact email registered with the CA
    pub email: String,
    /// Use the CA's staging environment
    pub staging: bool,
    /// Renew at or below this many remaining days
    pub renewal_threshold_days: i64,
}

/// Per-run counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CertificateReport {
    pub checked: usize,
    pub valid: usize,
    pub renewed: usize,
    pub failed: usize,
}

/// Certificate lifecycle engine
pub struct CertificateEngine {
    client: Box<dyn CaClient>,
    groups: Vec<DomainGroup>,
    settings: CertificateSettings,
}

impl CertificateEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `client`: CA client implementation
    /// - `groups`: Parsed domain groups, evaluated in this order
    /// - `settings`: Email, staging flag and renewal threshold
    pub fn new(
        client: Box<dyn CaClient>,
        groups: Vec<DomainGroup>,
        settings: CertificateSettings,
    ) -> Self {
        Self {
            client,
            groups,
            settings,
        }
    }

    pub fn groups(&self) -> &[DomainGroup] {
        &self.groups
    }

    /// Current lifecycle state of `group`
    ///
    /// A status invocation that cannot run is treated as unparsable output.
    pub async fn check_group(&self, group: &DomainGroup, today: NaiveDate) -> CertificateState {
        match self.client.status(group.primary()).await {
            Ok(output) => {
                debug!(
                    primary = group.primary(),
                    exit_code = ?output.exit_code,
                    "Certificate status retrieved"
                );
                evaluate(group, &output, self.settings.renewal_threshold_days, today)
            }
            Err(e) => {
                warn!(
                    primary = group.primary(),
                    error = %e,
                    "Certificate status check failed"
                );
                CertificateState::Unparsable(e.to_string())
            }
        }
    }

    /// Request a certificate for the full domain set of `group`
    ///
    /// # Returns
    ///
    /// `true` only when the CA client exits with status zero
    pub async fn obtain_certificate(&self, group: &DomainGroup) -> bool {
        let request = ChallengeRequest {
            cert_name: group.primary().to_string(),
            domains: group.domains().to_vec(),
            email: self.settings.email.clone(),
            staging: self.settings.staging,
            wildcard: group.is_wildcard(),
        };

        info!(
            primary = group.primary(),
            domains = ?request.domains,
            staging = request.staging,
            wildcard = request.wildcard,
            "Requesting certificate"
        );

        match self.client.obtain(&request).await {
            Ok(output) if output.success() => {
                info!(primary = group.primary(), "Certificate obtained");
                true
            }
            Ok(CaOutput {
                exit_code, stderr, ..
            }) => {
                error!(
                    primary = group.primary(),
                    exit_code = ?exit_code,
                    stderr = %stderr.trim(),
                    "Certificate acquisition failed"
                );
                false
            }
            Err(e) => {
                error!(
                    primary = group.primary(),
                    error = %e,
                    "Certificate acquisition failed"
                );
                false
            }
        }
    }

    /// Evaluate every group against today's date (UTC)
    pub async fn run_cycle(&self) -> CertificateReport {
        self.run_cycle_at(Utc::now().date_naive()).await
    }

    /// Evaluate every group against `today`
    pub async fn run_cycle_at(&self, today: NaiveDate) -> CertificateReport {
        let mut report = CertificateReport::default();

        for group in &self.groups {
            report.checked += 1;
            let state = self.check_group(group, today).await;

            match &state {
                CertificateState::Valid(days) => {
                    info!(
                        primary = group.primary(),
                        days_remaining = days,
                        "Certificate is valid"
                    );
                    report.valid += 1;
                    continue;
                }
                CertificateState::Absent => {
                    info!(primary = group.primary(), "No certificate found");
                }
                CertificateState::MissingDomains(missing) => {
                    info!(
                        primary = group.primary(),
                        missing = ?missing,
                        "Certificate does not cover all domains"
                    );
                }
                CertificateState::ExpiringWithin(days) => {
                    info!(
                        primary = group.primary(),
                        days_remaining = days,
                        threshold = self.settings.renewal_threshold_days,
                        "Certificate due for renewal"
                    );
                }
                CertificateState::Unparsable(reason) => {
                    warn!(
                        primary = group.primary(),
                        reason = %reason,
                        "Could not determine certificate status, renewing"
                    );
                }
            }

            if self.obtain_certificate(group).await {
                report.renewed += 1;
            } else {
                report.failed += 1;
            }
        }

        info!(
            checked = report.checked,
            valid = report.valid,
            renewed = report.renewed,
            failed = report.failed,
            "Certificate check complete"
        );

        report
    }
}

#[async_trait::async_trait]
impl crate::scheduler::CycleJob for CertificateEngine {
    fn name(&self) -> &str {
        "certificate"
    }

    async fn run(&mut self) {
        self.run_cycle().await;
    }
}
