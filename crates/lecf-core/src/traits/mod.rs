//! Core traits for LECF
//!
//! This module defines the abstract interfaces to external collaborators.
//!
//! - [`DnsProviderClient`]: Zone lookup and record CRUD on the DNS authority
//! - [`IpProbe`]: Current public IP address
//! - [`CaClient`]: External certificate-authority client

pub mod ca_client;
pub mod dns_provider;
pub mod ip_probe;

pub use ca_client::{CaClient, CaOutput, ChallengeRequest};
pub use dns_provider::{DnsProviderClient, DnsRecord, RecordData, RecordFilter, Zone, zone_candidate};
pub use ip_probe::IpProbe;
