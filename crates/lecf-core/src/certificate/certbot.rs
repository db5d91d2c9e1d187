//! certbot CA client
//!
//! Runs certbot with the Cloudflare DNS plugin as a subprocess. Each call is a
//! single invocation with no retry; output is captured whole.

use crate::error::{Error, Result};
use crate::traits::{CaClient, CaOutput, ChallengeRequest};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// certbot executable looked up on `PATH`
pub const DEFAULT_CERTBOT_PATH: &str = "certbot";

/// Where the Cloudflare DNS plugin reads its API token
pub const DEFAULT_CREDENTIALS_PATH: &str = "/root/.secrets/cloudflare.ini";

/// ACME v2 directory used for wildcard requests
pub const DEFAULT_WILDCARD_SERVER: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Fixed wait before the CA validates a wildcard challenge
pub const DEFAULT_PROPAGATION_SECONDS: u64 = 60;

/// [`CaClient`] backed by the certbot CLI
#[derive(Debug, Clone)]
pub struct CertbotClient {
    program: PathBuf,
    credentials_path: PathBuf,
    wildcard_server: String,
    propagation_seconds: u64,
}

impl CertbotClient {
    /// Create a client that passes `credentials_path` to the DNS plugin
    pub fn new(credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from(DEFAULT_CERTBOT_PATH),
            credentials_path: credentials_path.into(),
            wildcard_server: DEFAULT_WILDCARD_SERVER.to_string(),
            propagation_seconds: DEFAULT_PROPAGATION_SECONDS,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_wildcard_server(mut self, server: impl Into<String>) -> Self {
        self.wildcard_server = server.into();
        self
    }

    pub fn with_propagation_seconds(mut self, seconds: u64) -> Self {
        self.propagation_seconds = seconds;
        self
    }

    /// Arguments for the status invocation
    pub fn status_args(&self, cert_name: &str) -> Vec<String> {
        vec![
            "certificates".to_string(),
            "--cert-name".to_string(),
            cert_name.to_string(),
        ]
    }

    /// Arguments for an issuance covering every domain in `request`
    ///
    /// Wildcard requests add the explicit ACME server (production only, as
    /// certbot rejects `--server` together with `--staging`) and the fixed
    /// DNS propagation wait.
    pub fn obtain_args(&self, request: &ChallengeRequest) -> Vec<String> {
        let mut args = vec![
            "certonly".to_string(),
            "--dns-cloudflare".to_string(),
            "--dns-cloudflare-credentials".to_string(),
            self.credentials_path.display().to_string(),
            "--email".to_string(),
            request.email.clone(),
            "--agree-tos".to_string(),
            "--non-interactive".to_string(),
        ];

        if request.staging {
            args.push("--staging".to_string());
        }

        args.push("--cert-name".to_string());
        args.push(request.cert_name.clone());

        if request.wildcard {
            if !request.staging {
                args.push("--server".to_string());
                args.push(self.wildcard_server.clone());
            }
            args.push("--dns-cloudflare-propagation-seconds".to_string());
            args.push(self.propagation_seconds.to_string());
        }

        for domain in &request.domains {
            args.push("-d".to_string());
            args.push(domain.clone());
        }

        args
    }

    async fn run(&self, args: &[String]) -> Result<CaOutput> {
        debug!(program = %self.program.display(), args = ?args, "Running CA client");

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                Error::ca_client(format!(
                    "failed to execute {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        Ok(CaOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[async_trait]
impl CaClient for CertbotClient {
    async fn status(&self, cert_name: &str) -> Result<CaOutput> {
        self.run(&self.status_args(cert_name)).await
    }

    async fn obtain(&self, request: &ChallengeRequest) -> Result<CaOutput> {
        self.run(&self.obtain_args(request)).await
    }
}
