// # lecfd - LECF Daemon
//
// Thin integration layer: all certificate and DNS logic lives in lecf-core.
//
// The daemon is responsible for:
// 1. Loading configuration (TOML file plus environment fallbacks)
// 2. Initializing logging
// 3. Writing the CA client's Cloudflare credentials file
// 4. Wiring the engines to their clients
// 5. Running the scheduler until SIGTERM or SIGINT
//
// ## Options
//
// - `-c, --config <PATH>` (`LECF_CONFIG`): TOML configuration file
// - `-s, --service <all|certificate|ddns>` (`LECF_SERVICE`): Services to run
// - `-d, --debug` (`LECF_DEBUG`): Force debug logging
//
// Any fallback understood by `LecfConfig` (`CLOUDFLARE_API_TOKEN`,
// `CERTBOT_EMAIL`, `DOMAINS`, `DDNS_DOMAINS`, `LOG_LEVEL`, `LOG_FILE`, ...)
// is read from the environment.
//
// ## Example
//
// ```bash
// export CLOUDFLARE_API_TOKEN=your_token
// export CERTBOT_EMAIL=ops@example.com
// export DOMAINS="example.com,www.example.com;*.example.org"
// export DDNS_DOMAINS="example.com:@,www"
//
// lecfd --service ddns
// ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use lecf_core::certificate::CertbotClient;
use lecf_core::credentials::write_credentials_file;
use lecf_core::{CertificateEngine, DdnsEngine, LecfConfig, LogFormat, Scheduler};
use lecf_ip_http::HttpIpProbe;
use lecf_provider_cloudflare::CloudflareClient;
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LecfExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<LecfExitCode> for ExitCode {
    fn from(code: LecfExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

// ============================================================
// CLI Definition
// ============================================================

#[derive(Parser, Debug)]
#[command(name = "lecfd")]
#[command(about = "Certificate renewal and DDNS daemon for Cloudflare zones", long_about = None)]
#[command(version)]
struct Cli {
    /// Services to run
    #[arg(
        short,
        long,
        env = "LECF_SERVICE",
        value_enum,
        default_value = "all",
        ignore_case = true
    )]
    service: ServiceSelection,

    /// Force debug logging
    #[arg(
        short,
        long,
        env = "LECF_DEBUG",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    debug: bool,

    /// TOML configuration file; must exist when given
    #[arg(short, long, env = "LECF_CONFIG")]
    config: Option<PathBuf>,
}

/// Services selected with `--service`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ServiceSelection {
    All,
    #[value(alias = "cert")]
    Certificate,
    Ddns,
}

impl ServiceSelection {
    fn certificate(self) -> bool {
        matches!(self, Self::All | Self::Certificate)
    }

    fn ddns(self) -> bool {
        matches!(self, Self::All | Self::Ddns)
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi);
    match format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Text => layer.boxed(),
    }
}

/// Open `path` for appending log lines, creating its directory first
fn file_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path {} has no file name", path.display()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(dir)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    Ok(tracing_appender::non_blocking(appender))
}

/// Install the global tracing subscriber
///
/// Log lines go to stdout and, when `logging.file` is set, to that file as
/// well. A log file that cannot be opened is reported and skipped.
///
/// # Returns
///
/// The file writer's guard, which must live until shutdown
fn init_logging(config: &LecfConfig, force_debug: bool) -> Result<Option<WorkerGuard>> {
    let level = if force_debug {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_new(level)
        .with_context(|| format!("Invalid log level '{}'", level))?;

    let format = config.logging.format;
    let mut layers: Vec<BoxedLayer> = vec![format_layer(format, std::io::stdout, true)];

    let mut guard = None;
    let mut file_failure = None;
    if let Some(path) = &config.logging.file {
        match file_writer(path) {
            Ok((writer, file_guard)) => {
                layers.push(format_layer(format, writer, false));
                guard = Some(file_guard);
            }
            Err(e) => file_failure = Some(e),
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))?;

    if let Some(e) = file_failure {
        error!(error = %format!("{:#}", e), "Logging to stdout only");
    }
    Ok(guard)
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                LecfExitCode::ConfigError.into()
            } else {
                LecfExitCode::CleanShutdown.into()
            };
        }
    };

    let lookup = |key: &str| env::var(key).ok();

    let (config, config_path) = match LecfConfig::load_from(cli.config.as_deref(), lookup) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return LecfExitCode::ConfigError.into();
        }
    };

    let _log_guard = match init_logging(&config, cli.debug) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{:#}", e);
            return LecfExitCode::ConfigError.into();
        }
    };

    match &config_path {
        Some(path) => info!(path = %path.display(), "Loaded configuration file"),
        None => info!("No configuration file found, using environment"),
    }

    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration validation failed");
        return LecfExitCode::ConfigError.into();
    }

    let services = cli.service;
    info!(services = ?services, "Selected services");

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create tokio runtime");
            return LecfExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        let scheduler = match build_scheduler(&config, services).await {
            Ok(scheduler) => scheduler,
            Err(e) => {
                error!(error = %format!("{:#}", e), "Startup failed");
                return LecfExitCode::ConfigError;
            }
        };

        match run_daemon(scheduler).await {
            Ok(()) => LecfExitCode::CleanShutdown,
            Err(e) => {
                error!(error = %format!("{:#}", e), "Daemon error");
                LecfExitCode::RuntimeError
            }
        }
    });

    code.into()
}

/// Build the scheduler with every service that initialises
///
/// A service that fails to initialise is logged and left out; having none
/// left is a startup error. A credentials file that cannot be written is
/// always a startup error.
async fn build_scheduler(config: &LecfConfig, services: ServiceSelection) -> Result<Scheduler> {
    let mut scheduler = Scheduler::new();

    if services.certificate() {
        match config.validate_certificate() {
            Ok(()) => {
                let cert = &config.certificate;
                write_credentials_file(
                    &cert.credentials_path,
                    &config.cloudflare.api_token,
                    config.cloudflare.email.as_deref(),
                )
                .await
                .context("Cannot write CA client credentials")?;
                scheduler.add(
                    Box::new(certificate_engine(config)),
                    config.certificate_interval(),
                );
            }
            Err(e) => error!(
                service = "certificate",
                error = %e,
                "Service failed to initialise"
            ),
        }
    }

    if services.ddns() {
        match ddns_engine(config) {
            Ok(engine) => scheduler.add(Box::new(engine), config.ddns_interval()),
            Err(e) => error!(
                service = "ddns",
                error = %format!("{:#}", e),
                "Service failed to initialise"
            ),
        }
    }

    if scheduler.is_empty() {
        anyhow::bail!("No service could be started");
    }
    Ok(scheduler)
}

fn certificate_engine(config: &LecfConfig) -> CertificateEngine {
    let cert = &config.certificate;
    let client = CertbotClient::new(&cert.credentials_path)
        .with_program(&cert.certbot_path)
        .with_wildcard_server(&cert.wildcard_server)
        .with_propagation_seconds(cert.wildcard_propagation_seconds);

    let groups = config.certificate_groups();
    info!(
        groups = groups.len(),
        staging = cert.staging,
        threshold_days = cert.renewal_threshold_days,
        "Certificate service ready"
    );

    CertificateEngine::new(Box::new(client), groups, config.certificate_settings())
}

fn ddns_engine(config: &LecfConfig) -> Result<DdnsEngine> {
    let targets = config.ddns_targets();
    if targets.is_empty() {
        anyhow::bail!("No DDNS domains configured");
    }

    let provider = CloudflareClient::new(config.cloudflare.api_token.clone())?;
    let probe = HttpIpProbe::new(config.ddns.ip_services.clone())?;

    for (zone, target) in &targets {
        info!(zone = %zone, subdomains = ?target.subdomains, "Managing DDNS zone");
    }

    Ok(DdnsEngine::new(
        Box::new(provider),
        Box::new(probe),
        targets,
        config.ddns_settings(),
    ))
}

/// Run the scheduler until a shutdown signal arrives
async fn run_daemon(scheduler: Scheduler) -> Result<()> {
    let shutdown = shutdown_signal()?;

    info!(jobs = scheduler.len(), "Starting lecfd");
    scheduler.run_until(shutdown).await;
    info!("Shutting down lecfd");

    Ok(())
}

/// Register SIGTERM and SIGINT handlers and return a future that resolves on
/// either
#[cfg(unix)]
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()>> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    Ok(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!(signal = name, "Received shutdown signal");
    })
}

/// SIGINT only on non-Unix platforms
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to wait for CTRL-C");
            std::future::pending::<()>().await;
        }
        info!(signal = "SIGINT", "Received shutdown signal");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> LecfConfig {
        let owned: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LecfConfig::from_env(move |key: &str| {
            owned
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_options() {
        let cli = Cli::try_parse_from(["lecfd", "-s", "DDNS", "-d", "-c", "/etc/lecf/config.toml"])
            .unwrap();
        assert_eq!(cli.service, ServiceSelection::Ddns);
        assert!(cli.debug);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/lecf/config.toml")));

        let cli = Cli::try_parse_from(["lecfd", "--service", "cert"]).unwrap();
        assert_eq!(cli.service, ServiceSelection::Certificate);

        assert!(Cli::try_parse_from(["lecfd", "--service", "dns"]).is_err());
    }

    #[test]
    fn test_service_selection() {
        assert!(ServiceSelection::All.certificate() && ServiceSelection::All.ddns());
        assert!(!ServiceSelection::Ddns.certificate());
        assert!(!ServiceSelection::Certificate.ddns());
    }

    #[test]
    fn test_file_writer_creates_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("logs").join("lecf.log");

        let (_writer, _guard) = file_writer(&path).unwrap();

        assert!(path.parent().unwrap().is_dir());
        assert!(path.is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_writer_reports_unusable_directory() {
        assert!(file_writer(Path::new("/dev/null/lecf/lecf.log")).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(LecfExitCode::CleanShutdown as u8, 0);
        assert_eq!(LecfExitCode::ConfigError as u8, 1);
        assert_eq!(LecfExitCode::RuntimeError as u8, 2);
    }

    #[tokio::test]
    async fn test_ddns_only_starts_one_job() {
        let config = config_from(&[
            ("CLOUDFLARE_API_TOKEN", "token-123"),
            ("DDNS_DOMAINS", "example.com:@,www"),
        ]);

        let scheduler = build_scheduler(&config, ServiceSelection::Ddns).await.unwrap();
        assert_eq!(scheduler.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_service_is_left_out() {
        // No certificate email or domains, so only DDNS starts
        let config = config_from(&[
            ("CLOUDFLARE_API_TOKEN", "token-123"),
            ("DDNS_DOMAINS", "example.com:@"),
        ]);

        let scheduler = build_scheduler(&config, ServiceSelection::All).await.unwrap();
        assert_eq!(scheduler.len(), 1);
    }

    #[tokio::test]
    async fn test_no_service_is_an_error() {
        let config = config_from(&[("CLOUDFLARE_API_TOKEN", "token-123")]);

        assert!(build_scheduler(&config, ServiceSelection::All).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unwritable_credentials_file_is_fatal() {
        let config = LecfConfig::from_toml_str(
            r#"
[cloudflare]
api_token = "token-123"

[certificate]
email = "ops@example.com"
domains = ["example.com"]
credentials_path = "/dev/null/lecf/cloudflare.ini"

[ddns]
domains = [{ domain = "example.com", subdomains = "@" }]
"#,
            |_: &str| None,
        )
        .unwrap();

        assert!(build_scheduler(&config, ServiceSelection::All).await.is_err());
    }
}
