//! Contract Test: Certificate Lifecycle
//!
//! Constraints verified:
//! - Ambiguous status output leads to renewal, never to a silent skip
//! - A certificate missing any group member is reissued for the whole group
//! - Only exit status zero counts as a successful acquisition
//! - One failing group does not stop the others

mod common;

use chrono::NaiveDate;
use common::*;
use lecf_core::certificate::{
    CertificateEngine, CertificateSettings, CertificateState, check_certificate_expiry,
};
use lecf_core::domains::parse_certificate_groups;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
}

fn engine_with(client: &ScriptedCaClient, spec: &str) -> CertificateEngine {
    CertificateEngine::new(
        Box::new(ScriptedCaClient::sharing_counters_with(client)),
        parse_certificate_groups(spec),
        CertificateSettings {
            email: "ops@example.com".to_string(),
            staging: false,
            renewal_threshold_days: 30,
        },
    )
}

#[test]
fn unrecognised_expiry_format_needs_renewal() {
    let outputs = [
        "Expiry Date: next Tuesday",
        "Certificate Name: example.com\n  Domains: example.com\n",
        "VALID: many days",
        "Expiry Date: 01/02/2025",
    ];
    for output in outputs {
        assert!(
            check_certificate_expiry(output, 30, today()),
            "expected renewal for {:?}",
            output
        );
    }
}

#[tokio::test]
async fn groups_from_spec_are_requested_separately() {
    let client = ScriptedCaClient::new();
    let engine = engine_with(&client, "example.com,www.example.com;test.com");

    let report = engine.run_cycle_at(today()).await;

    assert_eq!(report.checked, 2);
    assert_eq!(report.renewed, 2);
    let requests = client.requests();
    assert_eq!(requests[0].domains, vec!["example.com", "www.example.com"]);
    assert_eq!(requests[1].domains, vec!["test.com"]);
    assert!(!requests[0].wildcard);
}

#[tokio::test]
async fn missing_san_triggers_full_reissue() {
    let client = ScriptedCaClient::new();
    client.set_status("example.com", &certbot_status("example.com", &["example.com"], 80));
    let engine = engine_with(&client, "example.com,www.example.com");

    let state = engine
        .check_group(&engine.groups()[0], today())
        .await;
    assert!(matches!(state, CertificateState::MissingDomains(ref m) if m.contains("www.example.com")));

    let report = engine.run_cycle_at(today()).await;
    assert_eq!(report.renewed, 1);
    assert_eq!(
        client.requests()[0].domains,
        vec!["example.com", "www.example.com"]
    );
}

#[tokio::test]
async fn valid_certificate_is_not_renewed() {
    let client = ScriptedCaClient::new();
    client.set_status(
        "example.com",
        &certbot_status("example.com", &["example.com", "www.example.com"], 75),
    );
    let engine = engine_with(&client, "example.com,www.example.com;www.example.com");

    let report = engine.run_cycle_at(today()).await;

    assert_eq!(report.checked, 1, "the repeated group is dropped");
    assert_eq!(report.valid, 1);
    assert_eq!(report.renewed, 0);
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn expiring_certificate_is_renewed_at_threshold() {
    let client = ScriptedCaClient::new();
    client.set_status("example.com", &certbot_status("example.com", &["example.com"], 30));
    client.set_status("test.com", &certbot_status("test.com", &["test.com"], 31));
    let engine = engine_with(&client, "example.com;test.com");

    let report = engine.run_cycle_at(today()).await;

    assert_eq!(report.renewed, 1);
    assert_eq!(report.valid, 1);
    assert_eq!(client.requests()[0].cert_name, "example.com");
}

#[tokio::test]
async fn failed_acquisition_does_not_stop_other_groups() {
    let client = ScriptedCaClient::new();
    client.fail_obtain("example.com");
    let engine = engine_with(&client, "example.com;test.com;*.wild.org");

    let report = engine.run_cycle_at(today()).await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.renewed, 2);
    let requests = client.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[2].wildcard);
    assert_eq!(client.status_calls(), 3);
}

#[tokio::test]
async fn state_is_recomputed_every_cycle() {
    let client = ScriptedCaClient::new();
    let engine = engine_with(&client, "example.com");

    let first = engine.run_cycle_at(today()).await;
    assert_eq!(first.renewed, 1);

    client.set_status("example.com", &certbot_status("example.com", &["example.com"], 89));
    let second = engine.run_cycle_at(today()).await;

    assert_eq!(second.valid, 1);
    assert_eq!(client.requests().len(), 1);
}
