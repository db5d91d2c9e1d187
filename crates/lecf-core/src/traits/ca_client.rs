// # CA Client Trait
//
// Defines the interface to the external certificate-authority client.
//
// ## Implementations
//
// - certbot with the Cloudflare DNS plugin: [`crate::certificate::CertbotClient`]
//
// ## Success
//
// Success of an acquisition is exit status zero, nothing else. Standard output
// is only parsed on the status path; standard error is kept for diagnostics.

use async_trait::async_trait;

/// Captured result of one CA client invocation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaOutput {
    /// Process exit code (`None` when terminated by a signal)
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CaOutput {
    /// Exit status zero
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A DNS-01 certificate request for a full domain group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRequest {
    /// Certificate lineage name (the group's primary FQDN)
    pub cert_name: String,
    /// Every FQDN of the group, primary first
    pub domains: Vec<String>,
    /// Contact email registered with the CA
    pub email: String,
    /// Use the CA's staging environment
    pub staging: bool,
    /// Any member starts with `*`
    pub wildcard: bool,
}

/// Trait for certificate-authority clients
///
/// Implementations run one external invocation per call and never retry; a
/// failed acquisition is retried by the next scheduled evaluation.
#[async_trait]
pub trait CaClient: Send + Sync {
    /// Report the status of the certificate named `cert_name`
    ///
    /// # Returns
    ///
    /// - `Ok(CaOutput)`: The client ran (whatever its exit status)
    /// - `Err(Error)`: The client could not be started
    async fn status(&self, cert_name: &str) -> Result<CaOutput, crate::Error>;

    /// Request issuance of a certificate covering `request.domains`
    ///
    /// # Returns
    ///
    /// - `Ok(CaOutput)`: The client ran; check [`CaOutput::success`]
    /// - `Err(Error)`: The client could not be started
    async fn obtain(&self, request: &ChallengeRequest) -> Result<CaOutput, crate::Error>;
}
