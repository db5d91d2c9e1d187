// # IP Probe Trait
//
// Defines the interface for determining the host's current public address.
//
// ## Implementations
//
// - HTTP echo services: `lecf-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use lecf_core::traits::IpProbe;
//
// match probe.current_ip().await {
//     Some(ip) => println!("public address: {}", ip),
//     None => println!("no service answered"),
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

/// Trait for public IP probes
///
/// A probe is asked once per reconciliation cycle. It owns no cache: the
/// last-known address belongs to the reconciliation engine, which only
/// replaces it after a successful pass.
///
/// # Failure
///
/// `None` means no address could be determined. The engine treats this as
/// fail-closed and performs no DNS writes for the cycle.
#[async_trait]
pub trait IpProbe: Send + Sync {
    /// Determine the current public IP address
    async fn current_ip(&self) -> Option<IpAddr>;
}
