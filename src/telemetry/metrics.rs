//! Metric instrument factories.
//!
//! Instruments come from the `"incident-dedup"` meter on the globally
//! registered `MeterProvider`; without one they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("incident-dedup")
}

/// Counter: claim decisions handed to callers.
/// Labels: `event_type`, `decision` ("proceed" | "skip" | "proceed_degraded").
pub fn claims() -> Counter<u64> {
    meter()
        .u64_counter("incident_dedup.claims")
        .with_description("Claim decisions returned to callers")
        .build()
}

/// Counter: individual store call attempts.
/// Labels: `operation`, `result` ("ok" | "retry" | "error").
pub fn store_attempts() -> Counter<u64> {
    meter()
        .u64_counter("incident_dedup.store.attempts")
        .with_description("Lock store call attempts")
        .build()
}

/// Counter: keys pushed out of a local cache by its capacity bound.
pub fn cache_evictions() -> Counter<u64> {
    meter()
        .u64_counter("incident_dedup.cache.evictions")
        .with_description("Local cache FIFO evictions")
        .build()
}

/// Counter: decisions taken while the lock store was unreachable.
/// Labels: `decision`.
pub fn degraded() -> Counter<u64> {
    meter()
        .u64_counter("incident_dedup.degraded")
        .with_description("Decisions made without the lock store")
        .build()
}

/// Histogram: successful store call duration in milliseconds, retries included.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("incident_dedup.operation.duration_ms")
        .with_description("Store operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
