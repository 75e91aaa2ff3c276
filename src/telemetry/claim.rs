//! Span helpers for claim decisions.

use tracing::Span;

use crate::model::{Decision, IncidentKey};

/// Start a span covering one `claim_once` call.
///
/// `claim.decision` and `claim.tier` are declared empty and filled by
/// [`record_decision`].
pub fn start_claim_span(key: &IncidentKey, event_type: &str, owner: &str) -> Span {
    tracing::info_span!(
        "claim.decide",
        "claim.key" = %key,
        "claim.event_type" = event_type,
        "claim.owner" = owner,
        "claim.decision" = tracing::field::Empty,
        "claim.tier" = tracing::field::Empty,
    )
}

/// Record which tier answered and what it decided.
pub fn record_decision(span: &Span, tier: &'static str, decision: Decision) {
    span.record("claim.tier", tier);
    span.record("claim.decision", tracing::field::display(decision));
    span.in_scope(|| {
        tracing::info!(tier, decision = %decision, "claim decided");
    });
}
