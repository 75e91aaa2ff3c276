//! Integration tests for telemetry initialization and span helpers.

use incident_dedup::model::{Decision, IncidentKey};
use incident_dedup::telemetry::claim::{record_decision, start_claim_span};
use incident_dedup::telemetry::{TelemetryConfig, init_telemetry, metrics};

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be set once per process; a second
    // init returns Err, which is acceptable here.
    let config = TelemetryConfig {
        endpoint: None,
        service_name: "incident-dedup-test".to_string(),
        log_level: "debug".to_string(),
        region: Some("local".to_string()),
    };
    if let Ok(guard) = init_telemetry(config) {
        guard.force_flush();
    }
}

#[test]
fn claim_span_records_decision() {
    let key = IncidentKey::new("ISD-12345:create-channel").unwrap();
    let span = start_claim_span(&key, "create-channel", "inv-1");
    record_decision(&span, "store", Decision::Proceed);
}

#[test]
fn instruments_are_usable_without_a_provider() {
    metrics::claims().add(1, &[]);
    metrics::store_attempts().add(1, &[]);
    metrics::cache_evictions().add(1, &[]);
    metrics::degraded().add(1, &[]);
    metrics::operation_duration_ms().record(1.5, &[]);
}
