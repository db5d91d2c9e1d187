// # lecf-core
//
// Core library for LECF: TLS certificates over DNS-01 plus dynamic DNS on
// Cloudflare.
//
// ## Architecture Overview
//
// - **domains**: Parses the flat configuration into certificate domain groups
//   and DDNS targets
// - **certificate**: Certificate Lifecycle Engine (status → acquire) and the
//   certbot-backed CA client
// - **ddns**: DNS Reconciliation Engine (probe → create / update / skip)
// - **traits**: `DnsProviderClient`, `IpProbe` and `CaClient` boundaries to
//   the outside world
// - **scheduler**: Runs the engines sequentially on their intervals
// - **config** / **credentials**: Startup configuration and the DNS plugin's
//   credentials file
//
// ## Design Principles
//
// 1. **Library-First**: The daemon only wires these pieces together
// 2. **Fail-Safe**: Unclear certificate status renews; an unknown IP writes nothing
// 3. **Idempotency**: Unchanged records and an unchanged IP cause no writes
// 4. **Isolation**: One failing group or record never stops the rest

pub mod certificate;
pub mod config;
pub mod credentials;
pub mod ddns;
pub mod domains;
pub mod error;
pub mod scheduler;
pub mod traits;

// Re-export core types for convenience
pub use certificate::{CertificateEngine, CertificateReport, CertificateSettings, CertificateState};
pub use config::{LecfConfig, LogFormat};
pub use ddns::{CycleOutcome, CycleReport, DdnsEngine, DdnsSettings, RecordStatus};
pub use domains::{DdnsTarget, DomainGroup};
pub use error::{Error, Result};
pub use scheduler::{CycleJob, Scheduler};
pub use traits::{CaClient, DnsProviderClient, IpProbe};
